//! Contracts for the remote daemon that owns the game server's filesystem
//! and console.
//!
//! Nothing here is transactional: every call is an independent request
//! against the daemon, and a write is not guaranteed to be visible to the
//! game process the moment it returns.

use async_trait::async_trait;

use crate::Result;
use crate::models::{DirEntry, ServerRef};

/// File access on the game server's own filesystem.
#[async_trait]
pub trait FileRepository: Send + Sync {
    /// Read a whole file. Missing files fail with `StoreError::NotFound`.
    async fn get_content(&self, server: &ServerRef, path: &str) -> Result<String>;

    /// Replace a whole file.
    async fn put_content(&self, server: &ServerRef, path: &str, content: &str) -> Result<()>;

    /// List the immediate children of a directory.
    async fn list_directory(&self, server: &ServerRef, path: &str) -> Result<Vec<DirEntry>>;

    /// Delete files relative to `root`. Files that do not exist are ignored.
    async fn delete_files(&self, server: &ServerRef, root: &str, files: &[String]) -> Result<()>;
}

/// Console access to the running game process.
#[async_trait]
pub trait CommandDispatcher: Send + Sync {
    async fn send(&self, server: &ServerRef, command: &str) -> Result<()>;
}

/// Maps a panel server identifier to where the game actually listens.
#[async_trait]
pub trait ServerDirectory: Send + Sync {
    async fn resolve(&self, server_id: &str) -> Result<ServerRef>;
}
