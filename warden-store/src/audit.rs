//! Append-only activity log for player management actions.

use std::path::Path;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio_rusqlite::Connection;
use tokio_rusqlite::rusqlite::params;
use tracing::{debug, info};

use crate::error::{Result, StoreError};
use crate::models::AuditEvent;

/// Destination for audit events.
#[async_trait]
pub trait AuditSink: Send + Sync {
  async fn record(
    &self,
    server_id: &str,
    event: &str,
    properties: Map<String, Value>,
    now: i64,
  ) -> Result<()>;
}

/// SQLite-backed audit log.
#[derive(Clone)]
pub struct AuditLog {
  conn: Connection,
}

impl AuditLog {
  /// Open or create an audit log at the given path.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = Connection::open(path).await.map_err(StoreError::Sqlite)?;
    let log = Self { conn };
    log.initialize().await?;
    Ok(log)
  }

  /// Create an in-memory audit log (useful for testing).
  pub async fn open_in_memory() -> Result<Self> {
    let conn = Connection::open_in_memory()
      .await
      .map_err(StoreError::Sqlite)?;
    let log = Self { conn };
    log.initialize().await?;
    Ok(log)
  }

  async fn initialize(&self) -> Result<()> {
    self.conn
            .call(|conn| {
                conn.pragma_update(None, "journal_mode", "WAL")?;

                conn.execute_batch(
                    r#"
                    CREATE TABLE IF NOT EXISTS activity_log (
                        id INTEGER PRIMARY KEY AUTOINCREMENT,
                        server_id TEXT NOT NULL,
                        event TEXT NOT NULL,
                        properties TEXT NOT NULL,
                        created_at INTEGER NOT NULL
                    );

                    CREATE INDEX IF NOT EXISTS idx_activity_server ON activity_log(server_id, id);
                    "#,
                )?;
                Ok(())
            })
            .await?;

    info!("audit log initialized");
    Ok(())
  }

  /// Most recent events for a server, newest first.
  pub async fn recent_events(&self, server_id: String, limit: u32) -> Result<Vec<AuditEvent>> {
    let rows = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare_cached(
          "SELECT server_id, event, properties, created_at FROM activity_log WHERE server_id = ?1 ORDER BY id DESC LIMIT ?2",
        )?;

        let rows = stmt
          .query_map(params![&server_id, limit], |row| {
            Ok((
              row.get::<_, String>(0)?,
              row.get::<_, String>(1)?,
              row.get::<_, String>(2)?,
              row.get::<_, i64>(3)?,
            ))
          })?
          .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(rows)
      })
      .await?;

    rows
      .into_iter()
      .map(|(server_id, event, properties, created_at)| {
        let properties = serde_json::from_str(&properties).map_err(|source| StoreError::Decode {
          path: "activity_log.properties".to_string(),
          source,
        })?;
        Ok(AuditEvent {
          server_id,
          event,
          properties,
          created_at,
        })
      })
      .collect()
  }
}

#[async_trait]
impl AuditSink for AuditLog {
  async fn record(
    &self,
    server_id: &str,
    event: &str,
    properties: Map<String, Value>,
    now: i64,
  ) -> Result<()> {
    let encoded = serde_json::to_string(&properties).map_err(StoreError::Encode)?;
    let server_id = server_id.to_string();
    let event = event.to_string();
    let event_log = event.clone();

    self
      .conn
      .call(move |conn| {
        conn
          .prepare_cached(
            "INSERT INTO activity_log (server_id, event, properties, created_at) VALUES (?1, ?2, ?3, ?4)",
          )?
          .execute(params![&server_id, &event, &encoded, now])?;
        Ok(())
      })
      .await?;

    debug!(event = %event_log, "recorded activity");
    Ok(())
  }
}
