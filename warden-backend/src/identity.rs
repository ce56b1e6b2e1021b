//! Identity Cache: name <-> UUID resolution.
//!
//! Lookups try the server's own `usercache.json` first, then the bridge
//! provider for prefixed names or bridge-namespace UUIDs, then offline-mode
//! synthesis, then the standard provider. Every identity learned from a
//! provider is appended to `usercache.json`.
//!
//! The cache file is rewritten whole on each append with no locking, so two
//! concurrent appends can lose one entry.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;
use warden_store::{FileRepository, PlayerIdentity, ServerRef, UserCacheEntry, parse_uuid};

use crate::cache::TtlCache;
use crate::config::CacheTtls;
use crate::facts::FactExtractor;
use crate::helpers::offline_uuid;

const USER_CACHE: &str = "/usercache.json";

#[derive(Debug, Error)]
pub enum LookupError {
    #[error("identity provider request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("identity provider answered with status {0}")]
    Rejected(u16),

    #[error("no such player")]
    NotFound,

    #[error("identity provider returned an unusable profile: {0}")]
    Malformed(String),
}

/// Standard account service (forward and reverse lookups).
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn profile_by_uuid(&self, uuid: &Uuid) -> Result<PlayerIdentity, LookupError>;
    async fn profile_by_name(&self, name: &str) -> Result<PlayerIdentity, LookupError>;
}

/// Bridge service for players joining from the secondary platform.
#[async_trait]
pub trait BridgeProvider: Send + Sync {
    /// Gamertag of the account with this xuid.
    async fn gamertag(&self, xuid: u64) -> Result<String, LookupError>;

    /// Identity of a (possibly prefixed) player name.
    async fn profile_by_name(&self, name: &str, prefix: &str) -> Result<PlayerIdentity, LookupError>;
}

/// The xuid carried by a bridge-namespace UUID (upper 64 bits all zero).
pub fn bridge_xuid(uuid: &Uuid) -> Option<u64> {
    match uuid.as_u64_pair() {
        (0, xuid) if xuid != 0 => Some(xuid),
        _ => None,
    }
}

pub struct IdentityResolver {
    files: Arc<dyn FileRepository>,
    facts: Arc<FactExtractor>,
    standard: Arc<dyn IdentityProvider>,
    bridge: Arc<dyn BridgeProvider>,
    user_cache: TtlCache<Vec<UserCacheEntry>>,
    lookups: TtlCache<PlayerIdentity>,
    ttls: CacheTtls,
}

impl IdentityResolver {
    pub fn new(
        files: Arc<dyn FileRepository>,
        facts: Arc<FactExtractor>,
        standard: Arc<dyn IdentityProvider>,
        bridge: Arc<dyn BridgeProvider>,
        ttls: CacheTtls,
    ) -> Self {
        Self {
            files,
            facts,
            standard,
            bridge,
            user_cache: TtlCache::new(),
            lookups: TtlCache::new(),
            ttls,
        }
    }

    async fn cached_entries(&self, server: &ServerRef) -> Vec<UserCacheEntry> {
        let key = format!("usercache:{}", server.id);
        self.user_cache
            .get_or_insert(&key, self.ttls.user_cache, || async {
                let content = match self.files.get_content(server, USER_CACHE).await {
                    Ok(content) => content,
                    Err(err) => {
                        debug!(server = %server.id, error = %err, "user cache not readable");
                        return Vec::new();
                    }
                };
                serde_json::from_str(&content).unwrap_or_else(|err| {
                    debug!(server = %server.id, error = %err, "user cache malformed");
                    Vec::new()
                })
            })
            .await
    }

    /// Append an identity to the server's cache file.
    async fn remember(&self, server: &ServerRef, identity: &PlayerIdentity) {
        let mut entries = self.cached_entries(server).await;
        entries.push(UserCacheEntry::from_identity(identity));

        match serde_json::to_string(&entries) {
            Ok(content) => {
                if let Err(err) = self.files.put_content(server, USER_CACHE, &content).await {
                    warn!(server = %server.id, name = %identity.name, error = %err, "failed to persist user cache");
                }
            }
            Err(err) => warn!(server = %server.id, error = %err, "failed to encode user cache"),
        }

        let key = format!("usercache:{}", server.id);
        self.user_cache.put(&key, entries, self.ttls.user_cache).await;
    }

    pub async fn resolve_by_uuid(&self, server: &ServerRef, uuid: &Uuid) -> Option<PlayerIdentity> {
        let hit = self
            .cached_entries(server)
            .await
            .into_iter()
            .find(|entry| parse_uuid(&entry.uuid).as_ref() == Some(uuid));
        if let Some(entry) = hit {
            return Some(PlayerIdentity::new(*uuid, entry.name));
        }

        if let Some(xuid) = bridge_xuid(uuid) {
            let key = format!("bridge-uuid:{}:{}", server.id, uuid.simple());
            let found = self
                .lookups
                .get_or_try_insert(&key, self.ttls.lookups, || async {
                    let gamertag = self.bridge.gamertag(xuid).await?;
                    let prefix = self.facts.floodgate_prefix(server).await.unwrap_or_default();
                    Ok::<_, LookupError>(PlayerIdentity::new(*uuid, format!("{prefix}{gamertag}")))
                })
                .await;
            match found {
                Ok(identity) => {
                    self.remember(server, &identity).await;
                    return Some(identity);
                }
                Err(err) => debug!(server = %server.id, %uuid, error = %err, "bridge lookup failed"),
            }
        }

        let key = format!("uuid:{}", uuid.simple());
        let found = self
            .lookups
            .get_or_try_insert(&key, self.ttls.lookups, || self.standard.profile_by_uuid(uuid))
            .await;
        match found {
            Ok(identity) => {
                self.remember(server, &identity).await;
                Some(identity)
            }
            Err(err) => {
                debug!(server = %server.id, %uuid, error = %err, "uuid lookup failed");
                None
            }
        }
    }

    pub async fn resolve_by_name(&self, server: &ServerRef, name: &str) -> Option<PlayerIdentity> {
        let hit = self
            .cached_entries(server)
            .await
            .into_iter()
            .filter(|entry| entry.name == name)
            .find_map(|entry| parse_uuid(&entry.uuid).map(|uuid| PlayerIdentity::new(uuid, entry.name)));
        if hit.is_some() {
            return hit;
        }

        if let Some(prefix) = self.facts.floodgate_prefix(server).await {
            if !prefix.is_empty() && name.starts_with(&prefix) {
                let key = format!("bridge-name:{prefix}:{name}");
                let found = self
                    .lookups
                    .get_or_try_insert(&key, self.ttls.lookups, || {
                        self.bridge.profile_by_name(name, &prefix)
                    })
                    .await;
                match found {
                    Ok(identity) => {
                        self.remember(server, &identity).await;
                        return Some(identity);
                    }
                    Err(err) => debug!(server = %server.id, name, error = %err, "bridge lookup failed"),
                }
            }
        }

        if self.facts.is_offline_mode(server).await {
            let identity = PlayerIdentity::new(offline_uuid(name), name);
            self.remember(server, &identity).await;
            return Some(identity);
        }

        let key = format!("name:{name}");
        let found = self
            .lookups
            .get_or_try_insert(&key, self.ttls.lookups, || self.standard.profile_by_name(name))
            .await;
        match found {
            Ok(identity) => {
                self.remember(server, &identity).await;
                Some(identity)
            }
            Err(err) => {
                debug!(server = %server.id, name, error = %err, "name lookup failed");
                None
            }
        }
    }
}
