mod cache;
pub mod config;
mod error;
pub mod facts;
pub mod helpers;
pub mod identity;
pub mod manager;
pub mod presence;
pub mod protocol;
pub mod providers;
mod routes;
mod validation;

use axum::{
    Router,
    http::StatusCode,
    routing::{get, post, put},
};
use std::sync::Arc;
use std::time::Duration;
use tower_governor::{
    GovernorLayer, governor::GovernorConfigBuilder, key_extractor::SmartIpKeyExtractor,
};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;
use warden_store::{AuditLog, ServerDirectory};

pub use manager::{Collaborators, PlayerManager};

pub struct AppState {
    pub manager: PlayerManager,
    pub servers: Arc<dyn ServerDirectory>,
    pub audit: AuditLog,
    /// SHA-256 hex digest of the bearer token callers must present
    pub api_token_hash: String,
}

/// Rate limiting configuration
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Seconds per replenished request
    pub per_second: u64,
    /// Burst size
    pub burst: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            per_second: 1,
            burst: 30,
        }
    }
}

/// Create the application router with the given state and configuration
pub fn create_app(
    state: AppState,
    request_body_limit: usize,
    request_timeout: Duration,
    rate_limit: RateLimitConfig,
) -> Router {
    let state = Arc::new(state);

    let governor = GovernorConfigBuilder::default()
        .per_second(rate_limit.per_second.max(1))
        .burst_size(rate_limit.burst.max(1))
        .key_extractor(SmartIpKeyExtractor)
        .finish()
        .expect("non-zero rate limit");

    let server_routes = Router::new()
        .route("/servers/{server}", get(routes::overview))
        .route("/servers/{server}/activity", get(routes::activity))
        .route("/servers/{server}/whitelist/status", post(routes::set_whitelist))
        .route(
            "/servers/{server}/whitelist",
            put(routes::add_whitelist).delete(routes::remove_whitelist),
        )
        .route("/servers/{server}/op", put(routes::op).delete(routes::deop))
        .route("/servers/{server}/ban", put(routes::ban).delete(routes::unban))
        .route(
            "/servers/{server}/ban-ip",
            put(routes::ban_ip).delete(routes::unban_ip),
        )
        .route("/servers/{server}/ban-ip-player", put(routes::ban_ip_player))
        .route("/servers/{server}/kick", post(routes::kick))
        .route("/servers/{server}/clear", post(routes::clear))
        .route("/servers/{server}/wipe", post(routes::wipe))
        .route("/servers/{server}/whisper", post(routes::whisper))
        .route("/servers/{server}/kill", post(routes::kill))
        .layer(GovernorLayer::new(governor));

    Router::new()
        .route("/health", get(|| async { StatusCode::OK }))
        .merge(server_routes)
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            request_timeout,
        ))
        .layer(RequestBodyLimitLayer::new(request_body_limit))
        .with_state(state)
}
