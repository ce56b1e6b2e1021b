use std::env::var;
use std::time::Duration;

use dotenvy::dotenv;

/// Application configuration with environment variable overrides
#[derive(Debug, Clone)]
pub struct Config {
    /// Request body size limit in bytes
    /// Env: REQUEST_BODY_LIMIT (default: 65536 = 64KB)
    pub request_body_limit: usize,

    /// Request timeout in seconds
    /// Env: REQUEST_TIMEOUT_SECS (default: 30)
    pub request_timeout: Duration,

    /// Server port
    /// Env: PORT (default: 3000)
    pub port: u16,

    /// Audit log database file path
    /// Env: AUDIT_DATABASE_PATH (default: "warden.db")
    pub audit_database_path: String,

    /// Panel base URL
    /// Env: PANEL_URL (default: "http://localhost")
    pub panel_url: String,

    /// Panel client API key used for file and console access
    /// Env: PANEL_API_KEY (optional, checked at startup)
    pub panel_api_key: Option<String>,

    /// Bearer token callers must present
    /// Env: API_TOKEN (optional, checked at startup)
    pub api_token: Option<String>,

    /// Name reported in the identity provider user agent
    /// Env: APP_NAME (default: "Pterodactyl")
    pub app_name: String,

    /// Standard identity provider, forward lookups
    /// Env: MOJANG_API_URL (default: "https://api.mojang.com")
    pub mojang_api_url: String,

    /// Standard identity provider, reverse lookups
    /// Env: MOJANG_SESSION_URL (default: "https://sessionserver.mojang.com")
    pub mojang_session_url: String,

    /// Bridge identity provider
    /// Env: GEYSER_API_URL (default: "https://api.geysermc.org")
    pub geyser_api_url: String,

    /// Rate limit (seconds per replenished request, see tower_governor)
    /// Env: RATE_LIMIT_PER_SEC (default: 1)
    pub rate_limit_per_sec: u64,

    /// Burst size
    /// Env: RATE_LIMIT_BURST (default: 30)
    pub rate_limit_burst: u32,

    /// Probe game servers over the query and status ping protocols.
    /// When off, every server reads as offline.
    /// Env: PRESENCE_PROBES (default: true)
    pub presence_probes: bool,

    /// Engine tuning
    pub engine: EngineConfig,
}

/// Time-to-live for each cached fact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheTtls {
    /// Parsed server.properties
    pub properties: Duration,
    /// Derived facts (query, offline, proxied, bukkit, floodgate prefix)
    pub facts: Duration,
    /// Contents of usercache.json
    pub user_cache: Duration,
    /// Presence snapshot
    pub presence: Duration,
    /// Successful identity provider lookups
    pub lookups: Duration,
}

impl Default for CacheTtls {
    fn default() -> Self {
        Self {
            properties: Duration::from_secs(10),
            facts: Duration::from_secs(30),
            user_cache: Duration::from_secs(30),
            presence: Duration::from_secs(10),
            lookups: Duration::from_secs(1000),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    pub ttls: CacheTtls,
    /// Wait after each authority write before dispatching console commands
    /// Env: SETTLE_DELAY_MS (default: 500)
    pub settle_delay: Duration,
    /// Presence probe timeout
    /// Env: PROBE_TIMEOUT_SECS (default: 2)
    pub probe_timeout: Duration,
    /// Identity provider request timeout
    /// Env: LOOKUP_TIMEOUT_SECS (default: 5)
    pub lookup_timeout: Duration,
    /// Retries after the first failed identity provider request
    pub lookup_retries: u32,
    /// Fixed pause between identity provider attempts
    pub lookup_backoff: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            ttls: CacheTtls::default(),
            settle_delay: Duration::from_millis(500),
            probe_timeout: Duration::from_secs(2),
            lookup_timeout: Duration::from_secs(5),
            lookup_retries: 2,
            lookup_backoff: Duration::from_millis(100),
        }
    }
}

impl Config {
    /// Load configuration from environment variables with defaults
    pub fn from_env() -> Self {
        let _ = dotenv(); //for debugging mostly
        let defaults = Self::default();
        Self {
            request_body_limit: env_or_default("REQUEST_BODY_LIMIT", defaults.request_body_limit),
            request_timeout: Duration::from_secs(env_or_default("REQUEST_TIMEOUT_SECS", 30)),
            port: env_or_default("PORT", defaults.port),
            audit_database_path: env_or_default_string("AUDIT_DATABASE_PATH", "warden.db"),
            panel_url: env_or_default_string("PANEL_URL", &defaults.panel_url),
            panel_api_key: var("PANEL_API_KEY").ok(),
            api_token: var("API_TOKEN").ok(),
            app_name: env_or_default_string("APP_NAME", &defaults.app_name),
            mojang_api_url: env_or_default_string("MOJANG_API_URL", &defaults.mojang_api_url),
            mojang_session_url: env_or_default_string(
                "MOJANG_SESSION_URL",
                &defaults.mojang_session_url,
            ),
            geyser_api_url: env_or_default_string("GEYSER_API_URL", &defaults.geyser_api_url),
            rate_limit_per_sec: env_or_default("RATE_LIMIT_PER_SEC", defaults.rate_limit_per_sec),
            rate_limit_burst: env_or_default("RATE_LIMIT_BURST", defaults.rate_limit_burst),
            presence_probes: env_or_default("PRESENCE_PROBES", defaults.presence_probes),
            engine: EngineConfig {
                settle_delay: Duration::from_millis(env_or_default("SETTLE_DELAY_MS", 500)),
                probe_timeout: Duration::from_secs(env_or_default("PROBE_TIMEOUT_SECS", 2)),
                lookup_timeout: Duration::from_secs(env_or_default("LOOKUP_TIMEOUT_SECS", 5)),
                ..EngineConfig::default()
            },
        }
    }
}

impl Default for Config {
    /// Create configuration with all default values
    fn default() -> Self {
        Self {
            request_body_limit: 64 * 1024,
            request_timeout: Duration::from_secs(30),
            port: 3000,
            audit_database_path: "warden.db".to_string(),
            panel_url: "http://localhost".to_string(),
            panel_api_key: None,
            api_token: None,
            app_name: "Pterodactyl".to_string(),
            mojang_api_url: "https://api.mojang.com".to_string(),
            mojang_session_url: "https://sessionserver.mojang.com".to_string(),
            geyser_api_url: "https://api.geysermc.org".to_string(),
            rate_limit_per_sec: 1,
            rate_limit_burst: 30,
            presence_probes: true,
            engine: EngineConfig::default(),
        }
    }
}

/// Parse environment variable or return default value
fn env_or_default<T: std::str::FromStr>(key: &str, default: T) -> T {
    var(key)
        .ok()
        .and_then(|val| val.parse().ok())
        .unwrap_or(default)
}

/// Parse environment variable string or return default value
fn env_or_default_string(key: &str, default: &str) -> String {
    var(key).unwrap_or_else(|_| default.to_string())
}
