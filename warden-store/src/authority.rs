//! Authority Store Accessor: the op list, whitelist and both ban lists.
//!
//! Each list is its own file and its own source of truth. There is no
//! locking: a read-modify-write from two concurrent requests can lose one
//! of the updates.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;
use uuid::Uuid;

use crate::error::{Result, StoreError};
use crate::models::{
  BanRecord, IpBanRecord, ListKind, OpRecord, ServerRef, WhitelistRecord, parse_uuid,
};
use crate::remote::FileRepository;

/// A record type stored in one of the authority files.
pub trait AuthorityRecord: Serialize + DeserializeOwned + Send + Sync {
  const KIND: ListKind;

  /// Presentation sort key (player name, or IP for IP bans).
  fn sort_key(&self) -> &str;
}

/// Records keyed by player.
pub trait PlayerRecord: AuthorityRecord {
  fn name(&self) -> &str;
  fn uuid(&self) -> &str;

  /// True when the stored uuid denotes `uuid`, whatever its formatting.
  fn has_uuid(&self, uuid: &Uuid) -> bool {
    parse_uuid(self.uuid()).as_ref() == Some(uuid)
  }
}

macro_rules! player_record {
  ($ty:ty, $kind:expr) => {
    impl AuthorityRecord for $ty {
      const KIND: ListKind = $kind;

      fn sort_key(&self) -> &str {
        &self.name
      }
    }

    impl PlayerRecord for $ty {
      fn name(&self) -> &str {
        &self.name
      }

      fn uuid(&self) -> &str {
        &self.uuid
      }
    }
  };
}

player_record!(OpRecord, ListKind::Operators);
player_record!(WhitelistRecord, ListKind::Whitelist);
player_record!(BanRecord, ListKind::BannedPlayers);

impl AuthorityRecord for IpBanRecord {
  const KIND: ListKind = ListKind::BannedIps;

  fn sort_key(&self) -> &str {
    &self.ip
  }
}

/// Sort for presentation: case-insensitive by name, or by IP for IP bans.
pub fn sort_list<T: AuthorityRecord>(mut list: Vec<T>) -> Vec<T> {
  list.sort_by_cached_key(|record| record.sort_key().to_ascii_lowercase());
  list
}

/// Reads and writes authority files through the remote file repository.
#[derive(Clone)]
pub struct AuthorityStore {
  files: Arc<dyn FileRepository>,
  settle_delay: Duration,
}

impl AuthorityStore {
  pub fn new(files: Arc<dyn FileRepository>, settle_delay: Duration) -> Self {
    Self {
      files,
      settle_delay,
    }
  }

  /// Read a list. Missing or corrupt files read as empty.
  pub async fn read<T: AuthorityRecord>(&self, server: &ServerRef) -> Vec<T> {
    let path = T::KIND.path();
    let content = match self.files.get_content(server, path).await {
      Ok(content) => content,
      Err(err) => {
        debug!(server = %server.id, path, error = %err, "authority file unreadable, treating as empty");
        return Vec::new();
      }
    };

    match serde_json::from_str(&content) {
      Ok(list) => list,
      Err(source) => {
        let err = StoreError::Decode {
          path: path.to_string(),
          source,
        };
        debug!(server = %server.id, error = %err, "authority file corrupt, treating as empty");
        Vec::new()
      }
    }
  }

  /// Write a whole list back, then wait for the write to settle.
  ///
  /// The daemon applies writes asynchronously; console commands that depend
  /// on the new file contents must not be sent before the delay elapses.
  pub async fn write<T: AuthorityRecord>(&self, server: &ServerRef, list: &[T]) -> Result<()> {
    let path = T::KIND.path();
    let content = serde_json::to_string_pretty(list).map_err(StoreError::Encode)?;
    self.files.put_content(server, path, &content).await?;
    debug!(server = %server.id, path, entries = list.len(), "wrote authority file");

    if !self.settle_delay.is_zero() {
      tokio::time::sleep(self.settle_delay).await;
    }
    Ok(())
  }

  pub fn settle_delay(&self) -> Duration {
    self.settle_delay
  }
}
