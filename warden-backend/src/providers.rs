//! HTTPS identity providers: the Mojang account service and the Geyser
//! bridge API.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::debug;
use uuid::Uuid;
use warden_store::{PlayerIdentity, parse_uuid};

use crate::config::{Config, EngineConfig};
use crate::identity::{BridgeProvider, IdentityProvider, LookupError};

/// Retry policy shared by both providers.
#[derive(Debug, Clone, Copy)]
struct Retry {
    retries: u32,
    backoff: Duration,
}

impl Retry {
    fn from_engine(engine: &EngineConfig) -> Self {
        Self {
            retries: engine.lookup_retries,
            backoff: engine.lookup_backoff,
        }
    }
}

fn build_client(app_name: &str, timeout: Duration) -> reqwest::Result<Client> {
    Client::builder()
        .timeout(timeout)
        .user_agent(format!("Player Warden @ {app_name}"))
        .build()
}

/// `base` with `segments` appended, each one percent-encoded as a single
/// path segment.
fn endpoint(base: &str, segments: &[&str]) -> Result<Url, LookupError> {
    let mut url = Url::parse(base).map_err(|err| LookupError::Malformed(format!("{base}: {err}")))?;
    url.path_segments_mut()
        .map_err(|_| LookupError::Malformed(format!("{base} cannot take a path")))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

/// GET `url` and decode the JSON body, retrying transport failures and
/// server-side errors. "No such player" answers are never retried.
async fn get_json<T: DeserializeOwned>(
    client: &Client,
    url: Url,
    query: &[(&str, &str)],
    retry: Retry,
) -> Result<T, LookupError> {
    let mut attempt = 0;
    loop {
        let result = match client.get(url.clone()).query(query).send().await {
            Ok(response) => match response.status() {
                StatusCode::NO_CONTENT | StatusCode::NOT_FOUND => return Err(LookupError::NotFound),
                status if status.is_success() => return Ok(response.json::<T>().await?),
                status if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS => {
                    Err(LookupError::Rejected(status.as_u16()))
                }
                status => return Err(LookupError::Rejected(status.as_u16())),
            },
            Err(err) => Err(LookupError::Http(err)),
        };

        if attempt >= retry.retries {
            return result;
        }
        attempt += 1;
        if let Err(err) = &result {
            debug!(%url, attempt, error = %err, "retrying identity lookup");
        }
        tokio::time::sleep(retry.backoff).await;
    }
}

#[derive(Deserialize)]
struct MojangProfile {
    id: String,
    name: String,
}

impl TryFrom<MojangProfile> for PlayerIdentity {
    type Error = LookupError;

    fn try_from(profile: MojangProfile) -> Result<Self, Self::Error> {
        let uuid = parse_uuid(&profile.id).ok_or(LookupError::Malformed(profile.id))?;
        Ok(PlayerIdentity::new(uuid, profile.name))
    }
}

/// Standard account service.
#[derive(Clone)]
pub struct MojangApi {
    client: Client,
    api_url: String,
    session_url: String,
    retry: Retry,
}

impl MojangApi {
    pub fn new(config: &Config) -> Result<Self, LookupError> {
        Ok(Self {
            client: build_client(&config.app_name, config.engine.lookup_timeout)?,
            api_url: config.mojang_api_url.trim_end_matches('/').to_string(),
            session_url: config.mojang_session_url.trim_end_matches('/').to_string(),
            retry: Retry::from_engine(&config.engine),
        })
    }
}

#[async_trait]
impl IdentityProvider for MojangApi {
    async fn profile_by_uuid(&self, uuid: &Uuid) -> Result<PlayerIdentity, LookupError> {
        let simple = uuid.simple().to_string();
        let url = endpoint(&self.session_url, &["session", "minecraft", "profile", &simple])?;
        let profile: MojangProfile = get_json(&self.client, url, &[], self.retry).await?;
        profile.try_into()
    }

    async fn profile_by_name(&self, name: &str) -> Result<PlayerIdentity, LookupError> {
        let url = endpoint(&self.api_url, &["users", "profiles", "minecraft", name])?;
        let profile: MojangProfile = get_json(&self.client, url, &[], self.retry).await?;
        profile.try_into()
    }
}

#[derive(Deserialize)]
struct Gamertag {
    gamertag: String,
}

#[derive(Deserialize)]
struct BridgeProfile {
    #[serde(alias = "id")]
    uuid: String,
    name: Option<String>,
}

/// Geyser bridge API for secondary-platform accounts.
#[derive(Clone)]
pub struct GeyserApi {
    client: Client,
    base_url: String,
    retry: Retry,
}

impl GeyserApi {
    pub fn new(config: &Config) -> Result<Self, LookupError> {
        Ok(Self {
            client: build_client(&config.app_name, config.engine.lookup_timeout)?,
            base_url: config.geyser_api_url.trim_end_matches('/').to_string(),
            retry: Retry::from_engine(&config.engine),
        })
    }
}

#[async_trait]
impl BridgeProvider for GeyserApi {
    async fn gamertag(&self, xuid: u64) -> Result<String, LookupError> {
        let xuid = xuid.to_string();
        let url = endpoint(&self.base_url, &["v2", "xbox", "gamertag", &xuid])?;
        let body: Gamertag = get_json(&self.client, url, &[], self.retry).await?;
        Ok(body.gamertag)
    }

    async fn profile_by_name(&self, name: &str, prefix: &str) -> Result<PlayerIdentity, LookupError> {
        let url = endpoint(&self.base_url, &["v2", "utils", "uuid", "bedrock_or_java", name])?;
        let body: BridgeProfile =
            get_json(&self.client, url, &[("prefix", prefix)], self.retry).await?;
        let uuid = parse_uuid(&body.uuid).ok_or(LookupError::Malformed(body.uuid))?;
        Ok(PlayerIdentity::new(uuid, body.name.unwrap_or_else(|| name.to_string())))
    }
}
