//! Storage side of the player warden: the game server's authority files,
//! the remote daemon that owns them, and the activity log.

mod audit;
mod authority;
mod error;
mod memory;
mod models;
mod panel;
mod remote;

pub use audit::{AuditLog, AuditSink};
pub use authority::{AuthorityRecord, AuthorityStore, PlayerRecord, sort_list};
pub use error::{Result, StoreError};
pub use memory::MemoryDaemon;
pub use models::{
  AuditEvent, BanRecord, BanTime, DirEntry, IpBanRecord, ListKind, OpRecord, PlayerIdentity,
  PlayerName, PLAYER_NAME_MAX_CHARS, ServerRef, UserCacheEntry, WhitelistRecord, parse_uuid,
};
pub use panel::PanelClient;
pub use remote::{CommandDispatcher, FileRepository, ServerDirectory};
