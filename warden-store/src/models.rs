use arrayvec::ArrayString;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Upper bound on player name length, in characters.
pub const PLAYER_NAME_MAX_CHARS: usize = 16;

/// Minecraft player name - max 16 characters, stored inline (no heap allocation).
/// Sized in bytes for 16 characters of up to four UTF-8 bytes each.
pub type PlayerName = ArrayString<{ PLAYER_NAME_MAX_CHARS * 4 }>;

/// Parse a player UUID in either the dashed or the compact 32-digit form.
///
/// Hyphens are stripped before parsing, so `"069a79f4-44e9-..."` and
/// `"069a79f444e9..."` canonicalize to the same value.
pub fn parse_uuid(raw: &str) -> Option<Uuid> {
  let compact: String = raw.chars().filter(|c| *c != '-').collect();
  if compact.len() != 32 {
    return None;
  }
  Uuid::try_parse(&compact).ok()
}

/// A game server as seen through the panel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerRef {
  /// Panel identifier (used in every remote file/command call)
  pub id: String,
  /// Host the game listens on (allocation alias preferred over raw ip)
  pub host: String,
  /// Game port
  pub port: u16,
}

/// One entry of a remote directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
  pub name: String,
  pub is_file: bool,
}

/// A resolved player identity. Immutable once resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerIdentity {
  pub uuid: Uuid,
  pub name: String,
}

impl PlayerIdentity {
  pub fn new(uuid: Uuid, name: impl Into<String>) -> Self {
    Self {
      uuid,
      name: name.into(),
    }
  }

  /// Dashed lowercase form, as written into authority files.
  pub fn uuid_string(&self) -> String {
    self.uuid.hyphenated().to_string()
  }
}

/// One row of `usercache.json`. Extra fields written by the server itself
/// (`expiresOn`) are carried through untouched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserCacheEntry {
  pub name: String,
  pub uuid: String,
  #[serde(rename = "expiresOn", default, skip_serializing_if = "Option::is_none")]
  pub expires_on: Option<String>,
}

impl UserCacheEntry {
  pub fn from_identity(identity: &PlayerIdentity) -> Self {
    Self {
      name: identity.name.clone(),
      uuid: identity.uuid_string(),
      expires_on: None,
    }
  }
}

/// Ban timestamps are unix seconds when written by us, but the game server
/// writes formatted dates, and `expires` is usually the literal `"forever"`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BanTime {
  Unix(i64),
  Text(String),
}

impl BanTime {
  pub fn forever() -> Self {
    BanTime::Text("forever".to_string())
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpRecord {
  pub uuid: String,
  pub name: String,
  pub level: u8,
  #[serde(rename = "bypassesPlayerLimit", default)]
  pub bypasses_player_limit: bool,
}

impl OpRecord {
  /// Permission level given to every new grant.
  pub const GRANT_LEVEL: u8 = 4;

  pub fn grant(identity: &PlayerIdentity) -> Self {
    Self {
      uuid: identity.uuid_string(),
      name: identity.name.clone(),
      level: Self::GRANT_LEVEL,
      bypasses_player_limit: true,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WhitelistRecord {
  pub uuid: String,
  pub name: String,
}

impl WhitelistRecord {
  pub fn from_identity(identity: &PlayerIdentity) -> Self {
    Self {
      uuid: identity.uuid_string(),
      name: identity.name.clone(),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BanRecord {
  pub uuid: String,
  pub name: String,
  pub created: BanTime,
  #[serde(default)]
  pub source: String,
  pub expires: BanTime,
  #[serde(default)]
  pub reason: String,
}

impl BanRecord {
  pub fn new(identity: &PlayerIdentity, reason: impl Into<String>, now: i64) -> Self {
    Self {
      uuid: identity.uuid_string(),
      name: identity.name.clone(),
      created: BanTime::Unix(now),
      source: "Server".to_string(),
      expires: BanTime::forever(),
      reason: reason.into(),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IpBanRecord {
  pub ip: String,
  pub created: BanTime,
  #[serde(default)]
  pub source: String,
  pub expires: BanTime,
  #[serde(default)]
  pub reason: String,
}

impl IpBanRecord {
  pub fn new(ip: impl Into<String>, reason: impl Into<String>, now: i64) -> Self {
    Self {
      ip: ip.into(),
      created: BanTime::Unix(now),
      source: "Server".to_string(),
      expires: BanTime::forever(),
      reason: reason.into(),
    }
  }
}

/// The four independent authority files kept by the game server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ListKind {
  Operators,
  Whitelist,
  BannedPlayers,
  BannedIps,
}

impl ListKind {
  pub fn path(self) -> &'static str {
    match self {
      ListKind::Operators => "/ops.json",
      ListKind::Whitelist => "/whitelist.json",
      ListKind::BannedPlayers => "/banned-players.json",
      ListKind::BannedIps => "/banned-ips.json",
    }
  }
}

/// An audit event as stored in the activity log.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditEvent {
  pub server_id: String,
  pub event: String,
  pub properties: serde_json::Map<String, serde_json::Value>,
  pub created_at: i64,
}
