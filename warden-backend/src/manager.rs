//! Reconciliation Engine.
//!
//! Every mutation follows one of two shapes. Authority mutations read the
//! list, check for a conflict, resolve the player, write the list back and
//! then mirror the change on the console; the console command is a
//! convenience and its failure is only logged. Live-only actions need the
//! player online and fail with [`ManagerError::ServerOffline`] when the
//! server cannot be reached.

use std::net::IpAddr;
use std::sync::Arc;

use serde::Serialize;
use serde_json::{Value, json};
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;
use warden_store::{
    AuditSink, AuthorityStore, BanRecord, CommandDispatcher, FileRepository, IpBanRecord,
    OpRecord, PlayerIdentity, PlayerRecord, ServerRef, StoreError, WhitelistRecord, sort_list,
};

use crate::config::EngineConfig;
use crate::facts::FactExtractor;
use crate::helpers::{avatar_url, now, render_url};
use crate::identity::{BridgeProvider, IdentityProvider, IdentityResolver};
use crate::presence::{OnlinePlayer, PingProtocol, PresenceProbe, QueryProtocol};

const SERVER_PROPERTIES: &str = "/server.properties";

/// Target is already in (or not in) the requested state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Conflict {
    #[error("Player is already an operator")]
    AlreadyOperator,
    #[error("Player is not an operator")]
    NotOperator,
    #[error("Player is already whitelisted")]
    AlreadyWhitelisted,
    #[error("Player is not whitelisted")]
    NotWhitelisted,
    #[error("Player is already banned")]
    AlreadyBanned,
    #[error("Player is not banned")]
    NotBanned,
    #[error("IP is already banned")]
    IpAlreadyBanned,
    #[error("IP is not banned")]
    IpNotBanned,
}

#[derive(Debug, Error)]
pub enum ManagerError {
    #[error("{0}")]
    Conflict(#[from] Conflict),

    #[error("Failed to lookup player")]
    IdentityNotFound,

    #[error("Player is not online")]
    PlayerNotOnline,

    #[error("Server is offline")]
    ServerOffline,

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type Result<T> = std::result::Result<T, ManagerError>;

/// Everything the engine talks to.
pub struct Collaborators {
    pub files: Arc<dyn FileRepository>,
    pub commands: Arc<dyn CommandDispatcher>,
    pub standard: Arc<dyn IdentityProvider>,
    pub bridge: Arc<dyn BridgeProvider>,
    pub query: Arc<dyn QueryProtocol>,
    pub ping: Arc<dyn PingProtocol>,
    pub audit: Arc<dyn AuditSink>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlayerView {
    pub uuid: String,
    pub name: String,
    pub avatar: String,
    pub render: String,
}

impl PlayerView {
    fn new(uuid: &str, name: &str) -> Self {
        Self {
            uuid: uuid.to_string(),
            name: name.to_string(),
            avatar: avatar_url(uuid),
            render: render_url(uuid),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OpView {
    #[serde(flatten)]
    pub player: PlayerView,
    pub level: u8,
    #[serde(rename = "bypassesPlayerLimit")]
    pub bypasses_player_limit: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BanView {
    #[serde(flatten)]
    pub player: PlayerView,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IpBanView {
    pub ip: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BannedView {
    pub players: Vec<BanView>,
    pub ips: Vec<IpBanView>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WhitelistView {
    pub enabled: bool,
    pub list: Vec<PlayerView>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlayersView {
    pub online: u32,
    pub max: u32,
    pub list: Vec<PlayerView>,
}

/// Merged read of every source. `players` is absent when the probe failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Overview {
    pub online: bool,
    pub online_mode: bool,
    pub opped: Vec<OpView>,
    pub banned: BannedView,
    pub whitelist: WhitelistView,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub players: Option<PlayersView>,
}

fn same_ip(stored: &str, ip: &IpAddr) -> bool {
    stored.parse::<IpAddr>().is_ok_and(|parsed| parsed == *ip)
}

/// `server.properties` with its `white-list=` line set to `enabled`.
fn with_whitelist(properties: &str, enabled: bool) -> String {
    let line = format!("white-list={enabled}");
    let mut lines: Vec<String> = if properties.is_empty() {
        Vec::new()
    } else {
        properties.split('\n').map(str::to_string).collect()
    };

    let mut found = false;
    for existing in lines.iter_mut() {
        if existing.starts_with("white-list=") {
            *existing = line.clone();
            found = true;
        }
    }
    if !found {
        lines.push(line);
    }
    lines.join("\n")
}

fn properties(value: Value) -> serde_json::Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => serde_json::Map::new(),
    }
}

pub struct PlayerManager {
    facts: Arc<FactExtractor>,
    identities: Arc<IdentityResolver>,
    presence: PresenceProbe,
    store: AuthorityStore,
    files: Arc<dyn FileRepository>,
    commands: Arc<dyn CommandDispatcher>,
    audit: Arc<dyn AuditSink>,
}

impl PlayerManager {
    pub fn new(collaborators: Collaborators, engine: &EngineConfig) -> Self {
        let Collaborators {
            files,
            commands,
            standard,
            bridge,
            query,
            ping,
            audit,
        } = collaborators;

        let facts = Arc::new(FactExtractor::new(files.clone(), engine.ttls.clone()));
        let identities = Arc::new(IdentityResolver::new(
            files.clone(),
            facts.clone(),
            standard,
            bridge,
            engine.ttls.clone(),
        ));
        let presence = PresenceProbe::new(
            facts.clone(),
            identities.clone(),
            query,
            ping,
            engine.ttls.presence,
            engine.probe_timeout,
        );

        Self {
            facts,
            identities,
            presence,
            store: AuthorityStore::new(files.clone(), engine.settle_delay),
            files,
            commands,
            audit,
        }
    }

    /// Console command with the vanilla namespace when plugins may shadow it.
    async fn command(&self, server: &ServerRef, command: &str) -> String {
        if self.facts.is_bukkit_based(server).await {
            format!("minecraft:{command}")
        } else {
            command.to_string()
        }
    }

    async fn dispatch_best_effort(&self, server: &ServerRef, command: &str) {
        let command = self.command(server, command).await;
        if let Err(err) = self.commands.send(server, &command).await {
            warn!(server = %server.id, %command, error = %err, "console sync failed, authority file already updated");
        }
    }

    async fn dispatch(&self, server: &ServerRef, command: &str) -> Result<()> {
        let command = self.command(server, command).await;
        self.commands.send(server, &command).await.map_err(|err| {
            warn!(server = %server.id, %command, error = %err, "console command failed");
            ManagerError::ServerOffline
        })
    }

    async fn record(&self, server: &ServerRef, event: &str, props: Value) {
        if let Err(err) = self.audit.record(&server.id, event, properties(props), now()).await {
            warn!(server = %server.id, event, error = %err, "failed to record activity");
        }
    }

    async fn add_by_name<T, F>(
        &self,
        server: &ServerRef,
        name: &str,
        conflict: Conflict,
        make: F,
    ) -> Result<PlayerIdentity>
    where
        T: PlayerRecord,
        F: FnOnce(&PlayerIdentity) -> T,
    {
        let mut list: Vec<T> = self.store.read(server).await;
        if list.iter().any(|record| record.name() == name) {
            return Err(conflict.into());
        }

        let identity = self
            .identities
            .resolve_by_name(server, name)
            .await
            .ok_or(ManagerError::IdentityNotFound)?;

        list.push(make(&identity));
        self.store.write(server, &list).await?;
        Ok(identity)
    }

    async fn remove_by_uuid<T: PlayerRecord>(
        &self,
        server: &ServerRef,
        uuid: &Uuid,
        conflict: Conflict,
    ) -> Result<PlayerIdentity> {
        let mut list: Vec<T> = self.store.read(server).await;
        if !list.iter().any(|record| record.has_uuid(uuid)) {
            return Err(conflict.into());
        }

        let identity = self
            .identities
            .resolve_by_uuid(server, uuid)
            .await
            .ok_or(ManagerError::IdentityNotFound)?;

        list.retain(|record| !record.has_uuid(uuid));
        self.store.write(server, &list).await?;
        Ok(identity)
    }

    pub async fn op(&self, server: &ServerRef, name: &str) -> Result<PlayerIdentity> {
        let player = self
            .add_by_name(server, name, Conflict::AlreadyOperator, OpRecord::grant)
            .await?;
        self.dispatch_best_effort(server, &format!("op {}", player.name)).await;
        self.record(server, "server:player.op", json!({ "uuid": player.uuid_string(), "name": player.name }))
            .await;
        info!(server = %server.id, name = %player.name, "granted operator");
        Ok(player)
    }

    pub async fn deop(&self, server: &ServerRef, uuid: &Uuid) -> Result<PlayerIdentity> {
        let player = self
            .remove_by_uuid::<OpRecord>(server, uuid, Conflict::NotOperator)
            .await?;
        self.dispatch_best_effort(server, &format!("deop {}", player.name)).await;
        self.record(server, "server:player.deop", json!({ "uuid": player.uuid_string(), "name": player.name }))
            .await;
        info!(server = %server.id, name = %player.name, "revoked operator");
        Ok(player)
    }

    pub async fn add_whitelist(&self, server: &ServerRef, name: &str) -> Result<PlayerIdentity> {
        let player = self
            .add_by_name(server, name, Conflict::AlreadyWhitelisted, WhitelistRecord::from_identity)
            .await?;
        self.dispatch_best_effort(server, &format!("whitelist add {}", player.name))
            .await;
        self.record(server, "server:whitelist.add", json!({ "uuid": player.uuid_string(), "name": player.name }))
            .await;
        info!(server = %server.id, name = %player.name, "whitelisted player");
        Ok(player)
    }

    pub async fn remove_whitelist(&self, server: &ServerRef, uuid: &Uuid) -> Result<PlayerIdentity> {
        let player = self
            .remove_by_uuid::<WhitelistRecord>(server, uuid, Conflict::NotWhitelisted)
            .await?;
        self.dispatch_best_effort(server, &format!("whitelist remove {}", player.name))
            .await;
        self.record(server, "server:whitelist.remove", json!({ "uuid": player.uuid_string(), "name": player.name }))
            .await;
        info!(server = %server.id, name = %player.name, "removed from whitelist");
        Ok(player)
    }

    /// Flip `white-list=` in `server.properties`.
    pub async fn set_whitelist_enabled(&self, server: &ServerRef, enabled: bool) -> Result<()> {
        let current = match self.files.get_content(server, SERVER_PROPERTIES).await {
            Ok(content) => content,
            Err(err) => {
                debug!(server = %server.id, error = %err, "server.properties not readable, starting empty");
                String::new()
            }
        };

        self.facts.invalidate_properties(server).await;
        self.files
            .put_content(server, SERVER_PROPERTIES, &with_whitelist(&current, enabled))
            .await?;
        // A read that raced the write may have re-cached the old file.
        self.facts.invalidate_properties(server).await;
        tokio::time::sleep(self.store.settle_delay()).await;

        let toggle = if enabled { "on" } else { "off" };
        self.dispatch_best_effort(server, &format!("whitelist {toggle}")).await;
        self.record(server, "server:whitelist.set", json!({ "enabled": enabled }))
            .await;
        info!(server = %server.id, enabled, "set whitelist");
        Ok(())
    }

    pub async fn ban(&self, server: &ServerRef, name: &str, reason: &str) -> Result<PlayerIdentity> {
        let player = self
            .add_by_name(server, name, Conflict::AlreadyBanned, |identity| {
                BanRecord::new(identity, reason, now())
            })
            .await?;
        self.dispatch_best_effort(server, &format!("ban {} {reason}", player.name))
            .await;
        self.record(
            server,
            "server:player.ban",
            json!({ "uuid": player.uuid_string(), "name": player.name, "reason": reason }),
        )
        .await;
        info!(server = %server.id, name = %player.name, "banned player");
        Ok(player)
    }

    pub async fn unban(&self, server: &ServerRef, uuid: &Uuid) -> Result<PlayerIdentity> {
        let player = self
            .remove_by_uuid::<BanRecord>(server, uuid, Conflict::NotBanned)
            .await?;
        self.dispatch_best_effort(server, &format!("pardon {}", player.name))
            .await;
        self.record(server, "server:player.unban", json!({ "uuid": player.uuid_string(), "name": player.name }))
            .await;
        info!(server = %server.id, name = %player.name, "unbanned player");
        Ok(player)
    }

    pub async fn ban_ip(&self, server: &ServerRef, ip: IpAddr, reason: &str) -> Result<()> {
        let mut list: Vec<IpBanRecord> = self.store.read(server).await;
        if list.iter().any(|ban| same_ip(&ban.ip, &ip)) {
            return Err(Conflict::IpAlreadyBanned.into());
        }

        list.push(IpBanRecord::new(ip.to_string(), reason, now()));
        self.store.write(server, &list).await?;

        self.dispatch_best_effort(server, &format!("ban-ip {ip} {reason}")).await;
        self.record(server, "server:player.ban-ip", json!({ "ip": ip.to_string(), "reason": reason }))
            .await;
        info!(server = %server.id, %ip, "banned ip");
        Ok(())
    }

    pub async fn unban_ip(&self, server: &ServerRef, ip: IpAddr) -> Result<()> {
        let mut list: Vec<IpBanRecord> = self.store.read(server).await;
        if !list.iter().any(|ban| same_ip(&ban.ip, &ip)) {
            return Err(Conflict::IpNotBanned.into());
        }

        list.retain(|ban| !same_ip(&ban.ip, &ip));
        self.store.write(server, &list).await?;

        self.dispatch_best_effort(server, &format!("pardon-ip {ip}")).await;
        self.record(server, "server:player.unban-ip", json!({ "ip": ip.to_string() }))
            .await;
        info!(server = %server.id, %ip, "unbanned ip");
        Ok(())
    }

    async fn online_player(&self, server: &ServerRef, uuid: &Uuid) -> Result<OnlinePlayer> {
        let snapshot = self.presence.probe(server).await.map_err(|err| {
            debug!(server = %server.id, error = %err, "presence probe failed");
            ManagerError::ServerOffline
        })?;
        snapshot
            .find(uuid)
            .cloned()
            .ok_or(ManagerError::PlayerNotOnline)
    }

    /// Ban whatever address an online player is connected from.
    pub async fn ban_ip_player(&self, server: &ServerRef, uuid: &Uuid, reason: &str) -> Result<()> {
        let player = self.online_player(server, uuid).await?;
        self.dispatch(server, &format!("ban-ip {} {reason}", player.name))
            .await?;
        self.record(
            server,
            "server:player.ban-ip-player",
            json!({ "uuid": uuid.hyphenated().to_string(), "name": player.name, "reason": reason }),
        )
        .await;
        info!(server = %server.id, name = %player.name, "banned player ip");
        Ok(())
    }

    pub async fn kick(&self, server: &ServerRef, uuid: &Uuid, reason: &str) -> Result<()> {
        let player = self.online_player(server, uuid).await?;
        self.dispatch(server, &format!("kick {} {reason}", player.name))
            .await?;
        self.record(
            server,
            "server:player.kick",
            json!({ "uuid": uuid.hyphenated().to_string(), "name": player.name, "reason": reason }),
        )
        .await;
        info!(server = %server.id, name = %player.name, "kicked player");
        Ok(())
    }

    pub async fn clear(&self, server: &ServerRef, uuid: &Uuid) -> Result<()> {
        let player = self.online_player(server, uuid).await?;
        self.dispatch(server, &format!("clear {}", player.name)).await?;
        self.record(
            server,
            "server:player.clear",
            json!({ "uuid": uuid.hyphenated().to_string(), "name": player.name }),
        )
        .await;
        Ok(())
    }

    pub async fn whisper(&self, server: &ServerRef, uuid: &Uuid, message: &str) -> Result<()> {
        let player = self.online_player(server, uuid).await?;
        self.dispatch(server, &format!("tell {} {message}", player.name))
            .await?;
        self.record(
            server,
            "server:player.whisper",
            json!({ "uuid": uuid.hyphenated().to_string(), "name": player.name, "message": message }),
        )
        .await;
        Ok(())
    }

    pub async fn kill(&self, server: &ServerRef, uuid: &Uuid) -> Result<()> {
        let player = self.online_player(server, uuid).await?;
        self.dispatch(server, &format!("kill {}", player.name)).await?;
        self.record(
            server,
            "server:player.kill",
            json!({ "uuid": uuid.hyphenated().to_string(), "name": player.name }),
        )
        .await;
        Ok(())
    }

    /// Delete a player's saved data from every world, kicking them first if
    /// they are online.
    pub async fn wipe(&self, server: &ServerRef, uuid: &Uuid) -> Result<()> {
        let snapshot = self.presence.probe(server).await.map_err(|err| {
            debug!(server = %server.id, error = %err, "presence probe failed");
            ManagerError::ServerOffline
        })?;
        let name = snapshot.find(uuid).map(|player| player.name.clone());

        let offline = |err: StoreError| {
            warn!(server = %server.id, error = %err, "wipe failed");
            ManagerError::ServerOffline
        };

        let root = self.files.list_directory(server, "/").await.map_err(offline)?;

        if let Some(name) = &name {
            self.dispatch(server, &format!("kick {name} Wiped")).await?;
        }

        let uuid_string = uuid.hyphenated().to_string();
        let targets = [
            format!("playerdata/{uuid_string}.dat"),
            format!("playerdata/{uuid_string}.dat_old"),
        ];
        for dir in root.iter().filter(|entry| !entry.is_file) {
            let children = self
                .files
                .list_directory(server, &dir.name)
                .await
                .map_err(offline)?;
            if !children.iter().any(|child| child.name == "playerdata") {
                continue;
            }
            self.files
                .delete_files(server, &dir.name, &targets)
                .await
                .map_err(offline)?;
            debug!(server = %server.id, world = %dir.name, uuid = %uuid_string, "wiped player data");
        }

        self.record(
            server,
            "server:player.wipe",
            json!({ "uuid": uuid_string, "name": name }),
        )
        .await;
        info!(server = %server.id, uuid = %uuid_string, "wiped player");
        Ok(())
    }

    /// Merge every source into one view. Never fails: a dead probe just
    /// reports the server offline.
    pub async fn overview(&self, server: &ServerRef) -> Overview {
        let (ops, whitelist, bans, ip_bans) = tokio::join!(
            self.store.read::<OpRecord>(server),
            self.store.read::<WhitelistRecord>(server),
            self.store.read::<BanRecord>(server),
            self.store.read::<IpBanRecord>(server),
        );

        let opped = sort_list(ops)
            .into_iter()
            .map(|op| OpView {
                player: PlayerView::new(&op.uuid, &op.name),
                level: op.level,
                bypasses_player_limit: op.bypasses_player_limit,
            })
            .collect();
        let whitelisted = sort_list(whitelist)
            .into_iter()
            .map(|entry| PlayerView::new(&entry.uuid, &entry.name))
            .collect();
        let banned_players = sort_list(bans)
            .into_iter()
            .map(|ban| BanView {
                player: PlayerView::new(&ban.uuid, &ban.name),
                reason: ban.reason,
            })
            .collect();
        let banned_ips = sort_list(ip_bans)
            .into_iter()
            .map(|ban| IpBanView {
                ip: ban.ip,
                reason: ban.reason,
            })
            .collect();

        let players = match self.presence.probe(server).await {
            Ok(snapshot) => {
                let mut list: Vec<PlayerView> = snapshot
                    .players
                    .iter()
                    .map(|player| {
                        let uuid = player
                            .uuid
                            .map(|uuid| uuid.hyphenated().to_string())
                            .unwrap_or_default();
                        PlayerView::new(&uuid, &player.name)
                    })
                    .collect();
                list.sort_by_cached_key(|player| player.name.to_ascii_lowercase());
                Some(PlayersView {
                    online: snapshot.online_count,
                    max: snapshot.max_count,
                    list,
                })
            }
            Err(err) => {
                debug!(server = %server.id, error = %err, "presence unavailable, reporting offline");
                None
            }
        };

        let facts = self.facts.facts(server).await;
        debug!(server = %server.id, ?facts, "server facts");

        Overview {
            online: players.is_some(),
            online_mode: !facts.offline_mode,
            opped,
            banned: BannedView {
                players: banned_players,
                ips: banned_ips,
            },
            whitelist: WhitelistView {
                enabled: facts.whitelist_enabled,
                list: whitelisted,
            },
            players,
        }
    }
}
