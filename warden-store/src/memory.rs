//! In-memory daemon (useful for testing and local runs without a panel).

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tracing::debug;

use crate::error::{Result, StoreError};
use crate::models::{DirEntry, ServerRef};
use crate::remote::{CommandDispatcher, FileRepository, ServerDirectory};

#[derive(Default)]
struct State {
    servers: HashMap<String, ServerRef>,
    files: BTreeMap<(String, String), String>,
    dirs: BTreeSet<(String, String)>,
    commands: Vec<(String, String)>,
    console_offline: bool,
    writes_failing: bool,
}

/// Files, directories and console of any number of servers, kept in memory.
#[derive(Default)]
pub struct MemoryDaemon {
    state: Mutex<State>,
}

fn normalize(path: &str) -> String {
    let trimmed = path.trim_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        format!("/{trimmed}")
    }
}

fn join(root: &str, relative: &str) -> String {
    normalize(&format!("{}/{}", normalize(root), relative))
}

impl MemoryDaemon {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a server so `ServerDirectory::resolve` can find it.
    pub fn add_server(&self, id: &str, host: &str, port: u16) -> ServerRef {
        let server = ServerRef {
            id: id.to_string(),
            host: host.to_string(),
            port,
        };
        self.state().servers.insert(id.to_string(), server.clone());
        server
    }

    pub fn put_file(&self, server_id: &str, path: &str, content: &str) {
        self.state()
            .files
            .insert((server_id.to_string(), normalize(path)), content.to_string());
    }

    pub fn create_dir(&self, server_id: &str, path: &str) {
        self.state()
            .dirs
            .insert((server_id.to_string(), normalize(path)));
    }

    pub fn file(&self, server_id: &str, path: &str) -> Option<String> {
        self.state()
            .files
            .get(&(server_id.to_string(), normalize(path)))
            .cloned()
    }

    /// Console commands received for a server, oldest first.
    pub fn commands(&self, server_id: &str) -> Vec<String> {
        self.state()
            .commands
            .iter()
            .filter(|(id, _)| id == server_id)
            .map(|(_, command)| command.clone())
            .collect()
    }

    /// Make every console command fail as if the game process were down.
    pub fn set_console_offline(&self, offline: bool) {
        self.state().console_offline = offline;
    }

    /// Make every file write fail.
    pub fn set_writes_failing(&self, failing: bool) {
        self.state().writes_failing = failing;
    }
}

#[async_trait]
impl FileRepository for MemoryDaemon {
    async fn get_content(&self, server: &ServerRef, path: &str) -> Result<String> {
        let path = normalize(path);
        self.state()
            .files
            .get(&(server.id.clone(), path.clone()))
            .cloned()
            .ok_or(StoreError::NotFound(path))
    }

    async fn put_content(&self, server: &ServerRef, path: &str, content: &str) -> Result<()> {
        let mut state = self.state();
        if state.writes_failing {
            return Err(StoreError::Unavailable(format!("write to {path} refused")));
        }
        state
            .files
            .insert((server.id.clone(), normalize(path)), content.to_string());
        Ok(())
    }

    async fn list_directory(&self, server: &ServerRef, path: &str) -> Result<Vec<DirEntry>> {
        let dir = normalize(path);
        let prefix = if dir == "/" {
            "/".to_string()
        } else {
            format!("{dir}/")
        };

        let state = self.state();
        let mut children: BTreeMap<String, bool> = BTreeMap::new();
        let files = state
            .files
            .keys()
            .filter(|(id, _)| *id == server.id)
            .map(|(_, p)| (p, true));
        let dirs = state
            .dirs
            .iter()
            .filter(|(id, _)| *id == server.id)
            .map(|(_, p)| (p, false));

        for (full, is_file) in files.chain(dirs) {
            let Some(rest) = full.strip_prefix(&prefix) else {
                continue;
            };
            if rest.is_empty() {
                continue;
            }
            match rest.split_once('/') {
                Some((child, _)) => {
                    children.insert(child.to_string(), false);
                }
                None => {
                    children.entry(rest.to_string()).or_insert(is_file);
                }
            }
        }

        let known_dir = dir == "/" || state.dirs.contains(&(server.id.clone(), dir.clone()));
        if children.is_empty() && !known_dir {
            return Err(StoreError::NotFound(dir));
        }

        Ok(children
            .into_iter()
            .map(|(name, is_file)| DirEntry { name, is_file })
            .collect())
    }

    async fn delete_files(&self, server: &ServerRef, root: &str, files: &[String]) -> Result<()> {
        let mut state = self.state();
        if state.writes_failing {
            return Err(StoreError::Unavailable(format!("delete in {root} refused")));
        }
        for file in files {
            let path = join(root, file);
            if state.files.remove(&(server.id.clone(), path.clone())).is_some() {
                debug!(%path, "deleted file");
            }
        }
        Ok(())
    }
}

#[async_trait]
impl CommandDispatcher for MemoryDaemon {
    async fn send(&self, server: &ServerRef, command: &str) -> Result<()> {
        let mut state = self.state();
        if state.console_offline {
            return Err(StoreError::Unavailable("console is offline".to_string()));
        }
        state.commands.push((server.id.clone(), command.to_string()));
        Ok(())
    }
}

#[async_trait]
impl ServerDirectory for MemoryDaemon {
    async fn resolve(&self, server_id: &str) -> Result<ServerRef> {
        self.state()
            .servers
            .get(server_id)
            .cloned()
            .ok_or(StoreError::ServerNotFound)
    }
}
