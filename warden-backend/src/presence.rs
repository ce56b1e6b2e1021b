//! Live Presence Probe.
//!
//! Asks the running game server who is online, first over the query
//! protocol (when the server has it enabled) and then over the status ping.
//! The wire protocols themselves are behind [`QueryProtocol`] and
//! [`PingProtocol`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;
use warden_store::{ServerRef, parse_uuid};

use crate::cache::TtlCache;
use crate::facts::FactExtractor;
use crate::identity::IdentityResolver;

#[derive(Debug, Clone, Error)]
pub enum ProbeError {
    #[error("query failed: {0}")]
    Query(String),

    #[error("ping failed: {0}")]
    Ping(String),

    #[error("probe timed out")]
    Timeout,

    #[error("no {0} client configured")]
    Unavailable(&'static str),
}

/// Answer to a full-stat query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryStatus {
    pub online: u32,
    pub max: u32,
    /// Raw names of everyone online.
    pub players: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PingSample {
    pub id: String,
    pub name: String,
}

/// Answer to a status ping. `sample` is whatever subset the server chose
/// to include, possibly empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PingStatus {
    pub online: u32,
    pub max: u32,
    pub sample: Vec<PingSample>,
}

/// Query (GameSpy-style) protocol client. One connection per call.
#[async_trait]
pub trait QueryProtocol: Send + Sync {
    async fn query(&self, host: &str, port: u16, timeout: Duration) -> Result<QueryStatus, ProbeError>;
}

/// Server list ping client. One connection per call.
#[async_trait]
pub trait PingProtocol: Send + Sync {
    async fn ping(&self, host: &str, port: u16, timeout: Duration) -> Result<PingStatus, ProbeError>;
}

/// Protocol client used when no real one is wired in. Every probe fails,
/// so presence always degrades to offline.
#[derive(Debug, Clone, Copy, Default)]
pub struct Unavailable;

#[async_trait]
impl QueryProtocol for Unavailable {
    async fn query(&self, _host: &str, _port: u16, _timeout: Duration) -> Result<QueryStatus, ProbeError> {
        Err(ProbeError::Unavailable("query"))
    }
}

#[async_trait]
impl PingProtocol for Unavailable {
    async fn ping(&self, _host: &str, _port: u16, _timeout: Duration) -> Result<PingStatus, ProbeError> {
        Err(ProbeError::Unavailable("ping"))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OnlinePlayer {
    /// Missing only when a ping sample carried an unparseable id.
    pub uuid: Option<Uuid>,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresenceSnapshot {
    pub online_count: u32,
    pub max_count: u32,
    pub players: Vec<OnlinePlayer>,
}

impl PresenceSnapshot {
    pub fn find(&self, uuid: &Uuid) -> Option<&OnlinePlayer> {
        self.players.iter().find(|p| p.uuid.as_ref() == Some(uuid))
    }
}

pub struct PresenceProbe {
    facts: Arc<FactExtractor>,
    identities: Arc<IdentityResolver>,
    query: Arc<dyn QueryProtocol>,
    ping: Arc<dyn PingProtocol>,
    snapshots: TtlCache<PresenceSnapshot>,
    ttl: Duration,
    timeout: Duration,
}

impl PresenceProbe {
    pub fn new(
        facts: Arc<FactExtractor>,
        identities: Arc<IdentityResolver>,
        query: Arc<dyn QueryProtocol>,
        ping: Arc<dyn PingProtocol>,
        ttl: Duration,
        timeout: Duration,
    ) -> Self {
        Self {
            facts,
            identities,
            query,
            ping,
            snapshots: TtlCache::new(),
            ttl,
            timeout,
        }
    }

    /// Current presence, cached briefly. Fails only when both protocols fail.
    pub async fn probe(&self, server: &ServerRef) -> Result<PresenceSnapshot, ProbeError> {
        let key = format!("presence:{}", server.id);
        self.snapshots
            .get_or_try_insert(&key, self.ttl, || async {
                if self.facts.is_query_enabled(server).await {
                    match self.via_query(server).await {
                        Ok(snapshot) => return Ok(snapshot),
                        Err(err) => debug!(server = %server.id, error = %err, "query failed, falling back to ping"),
                    }
                }
                self.via_ping(server).await
            })
            .await
    }

    async fn via_query(&self, server: &ServerRef) -> Result<PresenceSnapshot, ProbeError> {
        let status = tokio::time::timeout(
            self.timeout,
            self.query.query(&server.host, server.port, self.timeout),
        )
        .await
        .map_err(|_| ProbeError::Timeout)??;

        let mut players = Vec::with_capacity(status.players.len());
        for name in status.players {
            match self.identities.resolve_by_name(server, &name).await {
                Some(identity) => players.push(OnlinePlayer {
                    uuid: Some(identity.uuid),
                    name,
                }),
                None => debug!(server = %server.id, %name, "skipping unresolved online player"),
            }
        }

        Ok(PresenceSnapshot {
            online_count: status.online,
            max_count: status.max,
            players,
        })
    }

    async fn via_ping(&self, server: &ServerRef) -> Result<PresenceSnapshot, ProbeError> {
        let status = tokio::time::timeout(
            self.timeout,
            self.ping.ping(&server.host, server.port, self.timeout),
        )
        .await
        .map_err(|_| ProbeError::Timeout)??;

        Ok(PresenceSnapshot {
            online_count: status.online,
            max_count: status.max,
            players: status
                .sample
                .into_iter()
                .map(|sample| OnlinePlayer {
                    uuid: parse_uuid(&sample.id),
                    name: sample.name,
                })
                .collect(),
        })
    }
}
