//! Config Fact Extractor.
//!
//! Answers yes/no questions about a server by reading whichever of its
//! config files exist. A fact that cannot be determined (file missing,
//! unreadable, no matching key) falls back to its safe default; nothing
//! in here ever fails a request.

use std::collections::HashMap;
use std::sync::{Arc, LazyLock};

use regex::Regex;
use serde::Serialize;
use tracing::debug;
use warden_store::{FileRepository, ServerRef};

use crate::cache::TtlCache;
use crate::config::CacheTtls;

const SERVER_PROPERTIES: &str = "/server.properties";
const VELOCITY_TOML: &str = "/velocity.toml";
const PROXY_CONFIG_YML: &str = "/config.yml";
const BUNGEE_YML: &str = "/bungee.yml";
const SPIGOT_YML: &str = "/spigot.yml";
const BUKKIT_YML: &str = "/bukkit.yml";
const PAPER_CONFIGS: [&str; 2] = ["/paper.yml", "/config/paper-global.yml"];
const FLOODGATE_CONFIG: &str = "/plugins/floodgate/config.yml";

static QUOTED_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"username-prefix: "(.+)""#).expect("valid regex"));
static BARE_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"username-prefix: (.+)").expect("valid regex"));

/// Everything the engine needs to know about how a server is set up.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ServerFacts {
    pub query_enabled: bool,
    pub offline_mode: bool,
    pub proxied: bool,
    pub bukkit_based: bool,
    pub whitelist_enabled: bool,
    pub floodgate_prefix: Option<String>,
}

/// Split a `.properties` file into key/value pairs.
///
/// Comment lines are skipped; each remaining line is split on its first
/// `=`, and a line without one maps to an empty value.
pub fn parse_properties(text: &str) -> HashMap<String, String> {
    text.split('\n')
        .map(|line| line.trim_end_matches('\r'))
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(|line| match line.split_once('=') {
            Some((key, value)) => (key.to_string(), value.to_string()),
            None => (line.to_string(), String::new()),
        })
        .collect()
}

/// True when a `[query]` section sets `enabled = true`.
pub fn velocity_query_enabled(toml: &str) -> bool {
    let mut section: Option<&str> = None;
    for line in toml.lines().map(str::trim) {
        if line.starts_with('[') && line.ends_with(']') {
            section = Some(line[1..line.len() - 1].trim());
            continue;
        }
        if section != Some("query") {
            continue;
        }
        if let Some((key, value)) = line.split_once('=') {
            if key.trim() == "enabled" && value.trim() == "true" {
                return true;
            }
        }
    }
    false
}

pub fn proxy_query_enabled(yml: &str) -> bool {
    yml.contains("query_enabled: true")
}

/// Paper forwards player identities from a proxy.
pub fn paper_proxied(yml: &str) -> bool {
    yml.contains("velocity:\n    enabled: true")
        || yml.contains("bungee-cord:\n    enabled: true")
        || yml.contains("velocity-support:\n    enabled: true")
}

/// Paper is behind a proxy that itself runs in offline mode.
pub fn paper_proxy_offline(yml: &str) -> bool {
    yml.contains("velocity:\n    enabled: true\n    online-mode: false")
        || yml.contains("bungee-online-mode: false")
        || yml.contains("velocity-support:\n    enabled: true\n    online-mode: false")
}

/// Bridge-namespace username prefix from a floodgate config.
pub fn floodgate_prefix(yml: &str) -> Option<String> {
    QUOTED_PREFIX
        .captures(yml)
        .or_else(|| BARE_PREFIX.captures(yml))
        .map(|caps| caps[1].trim_end_matches('\r').to_string())
}

/// Reads facts through the remote file repository, memoized per server.
pub struct FactExtractor {
    files: Arc<dyn FileRepository>,
    properties: TtlCache<HashMap<String, String>>,
    flags: TtlCache<bool>,
    prefixes: TtlCache<Option<String>>,
    ttls: CacheTtls,
}

impl FactExtractor {
    pub fn new(files: Arc<dyn FileRepository>, ttls: CacheTtls) -> Self {
        Self {
            files,
            properties: TtlCache::new(),
            flags: TtlCache::new(),
            prefixes: TtlCache::new(),
            ttls,
        }
    }

    async fn read(&self, server: &ServerRef, path: &str) -> Option<String> {
        match self.files.get_content(server, path).await {
            Ok(content) => Some(content),
            Err(err) => {
                debug!(server = %server.id, path, error = %err, "config file not readable");
                None
            }
        }
    }

    /// Content of the first candidate that can be read.
    async fn read_first(&self, server: &ServerRef, paths: &[&str]) -> Option<String> {
        for path in paths {
            if let Some(content) = self.read(server, path).await {
                return Some(content);
            }
        }
        None
    }

    pub async fn server_properties(&self, server: &ServerRef) -> HashMap<String, String> {
        let key = format!("properties:{}", server.id);
        self.properties
            .get_or_insert(&key, self.ttls.properties, || async {
                self.read(server, SERVER_PROPERTIES)
                    .await
                    .map(|text| parse_properties(&text))
                    .unwrap_or_default()
            })
            .await
    }

    /// Forget the cached `server.properties` so the next read sees a fresh copy.
    pub async fn invalidate_properties(&self, server: &ServerRef) {
        self.properties
            .invalidate(&format!("properties:{}", server.id))
            .await;
    }

    async fn property_is(&self, server: &ServerRef, key: &str, expected: &str) -> bool {
        self.server_properties(server)
            .await
            .get(key)
            .is_some_and(|value| value == expected)
    }

    pub async fn is_whitelist_enabled(&self, server: &ServerRef) -> bool {
        self.property_is(server, "white-list", "true").await
    }

    pub async fn floodgate_prefix(&self, server: &ServerRef) -> Option<String> {
        let key = format!("floodgate:{}", server.id);
        self.prefixes
            .get_or_insert(&key, self.ttls.facts, || async {
                self.read(server, FLOODGATE_CONFIG)
                    .await
                    .and_then(|yml| floodgate_prefix(&yml))
            })
            .await
    }

    pub async fn is_query_enabled(&self, server: &ServerRef) -> bool {
        // An explicit `false` here does not short-circuit: a proxy config
        // further down may still enable query.
        if self.property_is(server, "enable-query", "true").await {
            return true;
        }

        let key = format!("query:{}", server.id);
        self.flags
            .get_or_insert(&key, self.ttls.facts, || async {
                if let Some(toml) = self.read(server, VELOCITY_TOML).await {
                    if velocity_query_enabled(&toml) {
                        return true;
                    }
                }
                if let Some(yml) = self.read(server, PROXY_CONFIG_YML).await {
                    if proxy_query_enabled(&yml) {
                        return true;
                    }
                }
                false
            })
            .await
    }

    pub async fn is_proxied(&self, server: &ServerRef) -> bool {
        let key = format!("proxied:{}", server.id);
        self.flags
            .get_or_insert(&key, self.ttls.facts, || async {
                if let Some(yml) = self.read(server, SPIGOT_YML).await {
                    if yml.contains("bungeecord: true") {
                        return true;
                    }
                }
                self.read_first(server, &PAPER_CONFIGS)
                    .await
                    .is_some_and(|yml| paper_proxied(&yml))
            })
            .await
    }

    pub async fn is_offline_mode(&self, server: &ServerRef) -> bool {
        let proxied = self.is_proxied(server).await;
        if !proxied && self.property_is(server, "online-mode", "false").await {
            return true;
        }

        let key = format!("offline:{}", server.id);
        self.flags
            .get_or_insert(&key, self.ttls.facts, || async {
                if proxied {
                    return self
                        .read_first(server, &PAPER_CONFIGS)
                        .await
                        .is_some_and(|yml| paper_proxy_offline(&yml));
                }

                if let Some(toml) = self.read(server, VELOCITY_TOML).await {
                    return toml.contains("online-mode = false");
                }
                self.read_first(server, &[BUNGEE_YML, PROXY_CONFIG_YML])
                    .await
                    .is_some_and(|yml| yml.contains("online_mode: false"))
            })
            .await
    }

    pub async fn is_bukkit_based(&self, server: &ServerRef) -> bool {
        let key = format!("bukkit:{}", server.id);
        self.flags
            .get_or_insert(&key, self.ttls.facts, || async {
                self.read(server, BUKKIT_YML)
                    .await
                    .is_some_and(|yml| !yml.is_empty())
            })
            .await
    }

    pub async fn facts(&self, server: &ServerRef) -> ServerFacts {
        ServerFacts {
            query_enabled: self.is_query_enabled(server).await,
            offline_mode: self.is_offline_mode(server).await,
            proxied: self.is_proxied(server).await,
            bukkit_based: self.is_bukkit_based(server).await,
            whitelist_enabled: self.is_whitelist_enabled(server).await,
            floodgate_prefix: self.floodgate_prefix(server).await,
        }
    }
}
