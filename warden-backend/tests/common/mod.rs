#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;
use uuid::Uuid;
use warden_backend::config::{Config, EngineConfig};
use warden_backend::helpers::hash_api_key;
use warden_backend::identity::{BridgeProvider, IdentityProvider, LookupError};
use warden_backend::presence::{
    PingProtocol, PingSample, PingStatus, ProbeError, QueryProtocol, QueryStatus,
};
use warden_backend::protocol::{FullStatQuery, ServerListPing};
use warden_backend::{AppState, Collaborators, PlayerManager, RateLimitConfig, create_app};
use warden_store::{AuditLog, MemoryDaemon, PlayerIdentity, parse_uuid};

pub const TOKEN: &str = "test-token";
pub const SERVER: &str = "srv";
pub const NOTCH: &str = "069a79f4-44e9-4726-a5be-fca90e38aaf5";
pub const JEB: &str = "853c80ef-3c37-49fd-aa49-938b674adae6";

/// Identity provider that knows Notch and jeb_.
pub struct KnownPlayers;

fn known() -> Vec<PlayerIdentity> {
    vec![
        PlayerIdentity::new(parse_uuid(NOTCH).unwrap(), "Notch"),
        PlayerIdentity::new(parse_uuid(JEB).unwrap(), "jeb_"),
    ]
}

#[async_trait]
impl IdentityProvider for KnownPlayers {
    async fn profile_by_uuid(&self, uuid: &Uuid) -> Result<PlayerIdentity, LookupError> {
        known()
            .into_iter()
            .find(|p| p.uuid == *uuid)
            .ok_or(LookupError::NotFound)
    }

    async fn profile_by_name(&self, name: &str) -> Result<PlayerIdentity, LookupError> {
        known()
            .into_iter()
            .find(|p| p.name == name)
            .ok_or(LookupError::NotFound)
    }
}

#[async_trait]
impl BridgeProvider for KnownPlayers {
    async fn gamertag(&self, _xuid: u64) -> Result<String, LookupError> {
        Err(LookupError::NotFound)
    }

    async fn profile_by_name(&self, _name: &str, _prefix: &str) -> Result<PlayerIdentity, LookupError> {
        Err(LookupError::NotFound)
    }
}

/// Status ping answering with whoever is set online; `None` means the
/// server does not answer at all.
#[derive(Default)]
pub struct ScriptedPing {
    online: Mutex<Option<Vec<(String, String)>>>,
}

impl ScriptedPing {
    pub fn set_online(&self, players: &[(&str, &str)]) {
        *self.online.lock().unwrap() = Some(
            players
                .iter()
                .map(|(id, name)| (id.to_string(), name.to_string()))
                .collect(),
        );
    }
}

#[async_trait]
impl QueryProtocol for ScriptedPing {
    async fn query(&self, _host: &str, _port: u16, _timeout: Duration) -> Result<QueryStatus, ProbeError> {
        Err(ProbeError::Query("query disabled".into()))
    }
}

#[async_trait]
impl PingProtocol for ScriptedPing {
    async fn ping(&self, _host: &str, _port: u16, _timeout: Duration) -> Result<PingStatus, ProbeError> {
        let online = self.online.lock().unwrap().clone();
        let players = online.ok_or_else(|| ProbeError::Ping("connection refused".into()))?;
        Ok(PingStatus {
            online: players.len() as u32,
            max: 20,
            sample: players
                .into_iter()
                .map(|(id, name)| PingSample { id, name })
                .collect(),
        })
    }
}

pub struct TestApp {
    pub daemon: Arc<MemoryDaemon>,
    pub ping: Arc<ScriptedPing>,
    pub audit: AuditLog,
    pub router: axum::Router,
}

async fn build(
    port: u16,
    query: Arc<dyn QueryProtocol>,
    ping: Arc<dyn PingProtocol>,
) -> (Arc<MemoryDaemon>, AuditLog, axum::Router) {
    let daemon = Arc::new(MemoryDaemon::new());
    daemon.add_server(SERVER, "127.0.0.1", port);
    let audit = AuditLog::open_in_memory()
        .await
        .expect("Failed to create in-memory audit log");

    let engine = EngineConfig {
        settle_delay: Duration::ZERO,
        ..EngineConfig::default()
    };
    let manager = PlayerManager::new(
        Collaborators {
            files: daemon.clone(),
            commands: daemon.clone(),
            standard: Arc::new(KnownPlayers),
            bridge: Arc::new(KnownPlayers),
            query,
            ping,
            audit: Arc::new(audit.clone()),
        },
        &engine,
    );

    let config = Config::default();
    let router = create_app(
        AppState {
            manager,
            servers: daemon.clone(),
            audit: audit.clone(),
            api_token_hash: hash_api_key(TOKEN),
        },
        config.request_body_limit,
        config.request_timeout,
        RateLimitConfig::default(),
    );
    (daemon, audit, router)
}

/// Helper to create app with an in-memory daemon hosting one server
pub async fn setup() -> TestApp {
    let ping = Arc::new(ScriptedPing::default());
    let (daemon, audit, router) = build(25565, ping.clone(), ping.clone()).await;
    TestApp {
        daemon,
        ping,
        audit,
        router,
    }
}

/// Like [`setup`], but presence goes over the real wire clients to
/// whatever listens on `port`.
pub async fn setup_wired(port: u16) -> TestApp {
    let (daemon, audit, router) =
        build(port, Arc::new(FullStatQuery), Arc::new(ServerListPing)).await;
    TestApp {
        daemon,
        ping: Arc::new(ScriptedPing::default()),
        audit,
        router,
    }
}

/// Helper to send a request and get response
pub async fn send_request(
    app: &TestApp,
    method: &str,
    uri: &str,
    body: Option<Value>,
    auth_token: Option<&str>,
) -> (StatusCode, Value) {
    let mut request_builder = Request::builder()
        .uri(uri)
        .method(method)
        .header("X-Forwarded-For", "127.0.0.1");

    if let Some(token) = auth_token {
        request_builder = request_builder.header("Authorization", format!("Bearer {}", token));
    }

    let request = if let Some(json_body) = body {
        request_builder
            .header("Content-Type", "application/json")
            .body(Body::from(serde_json::to_vec(&json_body).unwrap()))
            .unwrap()
    } else {
        request_builder.body(Body::empty()).unwrap()
    };

    let response = app.router.clone().oneshot(request).await.unwrap();
    let status = response.status();

    let body_bytes = response
        .into_body()
        .collect()
        .await
        .unwrap()
        .to_bytes();

    let json = if body_bytes.is_empty() {
        json!({})
    } else {
        serde_json::from_slice(&body_bytes).unwrap_or(json!({}))
    };

    (status, json)
}

/// Authorized request against the test server
pub async fn call(app: &TestApp, method: &str, path: &str, body: Option<Value>) -> (StatusCode, Value) {
    let uri = format!("/servers/{SERVER}{path}");
    send_request(app, method, &uri, body, Some(TOKEN)).await
}

pub fn read_json(app: &TestApp, path: &str) -> Value {
    let raw = app
        .daemon
        .file(SERVER, path)
        .unwrap_or_else(|| panic!("{path} should exist"));
    serde_json::from_str(&raw).unwrap()
}
