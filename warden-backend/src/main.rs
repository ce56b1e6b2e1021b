use anyhow::Context;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use warden_backend::config::Config;
use warden_backend::helpers::hash_api_key;
use warden_backend::presence::{PingProtocol, QueryProtocol, Unavailable};
use warden_backend::protocol::{FullStatQuery, ServerListPing};
use warden_backend::providers::{GeyserApi, MojangApi};
use warden_backend::{AppState, Collaborators, PlayerManager, RateLimitConfig, create_app};
use warden_store::{AuditLog, PanelClient};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing for structured logging
    #[cfg(debug_assertions)]
    let log_level = tracing::Level::DEBUG;
    #[cfg(not(debug_assertions))]
    let log_level = tracing::Level::INFO;

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .compact()
        .init();
    tracing::info!("Starting player warden...");
    // Load configuration from environment variables or use defaults
    let config = Config::from_env();
    tracing::info!(
        "Configuration: port={}, audit_db={}, body_limit={}KB, timeout={}s, panel_url={}",
        config.port,
        config.audit_database_path,
        config.request_body_limit / 1024,
        config.request_timeout.as_secs(),
        config.panel_url
    );
    tracing::info!(
        "Engine: settle={}ms, probe_timeout={}s, lookup_timeout={}s, rate_limit={}s/request (burst {})",
        config.engine.settle_delay.as_millis(),
        config.engine.probe_timeout.as_secs(),
        config.engine.lookup_timeout.as_secs(),
        config.rate_limit_per_sec,
        config.rate_limit_burst
    );

    let api_token = config
        .api_token
        .as_deref()
        .context("API_TOKEN must be set")?;
    let panel_api_key = config
        .panel_api_key
        .as_deref()
        .context("PANEL_API_KEY must be set")?;

    let audit = AuditLog::open(&config.audit_database_path)
        .await
        .context("failed to open audit log")?;
    let panel = Arc::new(
        PanelClient::new(&config.panel_url, panel_api_key, config.engine.lookup_timeout)
            .context("failed to build panel client")?,
    );
    let (query, ping): (Arc<dyn QueryProtocol>, Arc<dyn PingProtocol>) = if config.presence_probes {
        (Arc::new(FullStatQuery), Arc::new(ServerListPing))
    } else {
        tracing::warn!("Presence probes disabled, servers will report offline");
        (Arc::new(Unavailable), Arc::new(Unavailable))
    };

    let manager = PlayerManager::new(
        Collaborators {
            files: panel.clone(),
            commands: panel.clone(),
            standard: Arc::new(MojangApi::new(&config).context("failed to build Mojang client")?),
            bridge: Arc::new(GeyserApi::new(&config).context("failed to build Geyser client")?),
            query,
            ping,
            audit: Arc::new(audit.clone()),
        },
        &config.engine,
    );

    let state = AppState {
        manager,
        servers: panel,
        audit,
        api_token_hash: hash_api_key(api_token),
    };
    let rate_limit = RateLimitConfig {
        per_second: config.rate_limit_per_sec,
        burst: config.rate_limit_burst,
    };
    let app = create_app(
        state,
        config.request_body_limit,
        config.request_timeout,
        rate_limit,
    );

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .context("server error")?;
    Ok(())
}
