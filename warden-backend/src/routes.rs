use crate::AppState;
use crate::error::AppError;
use crate::helpers::hash_api_key;
use crate::manager::Overview;
use crate::validation;

use axum::{
    Json,
    extract::{FromRequestParts, Path, Query, State, rejection::JsonRejection, rejection::QueryRejection},
    http::request::Parts,
};
use axum_extra::TypedHeader;
use axum_macros::debug_handler;
use headers::Authorization;
use headers::authorization::Bearer;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use warden_store::{AuditEvent, ServerRef};

const DEFAULT_BAN_REASON: &str = "Banned by an operator.";
const DEFAULT_ACTIVITY_LIMIT: u32 = 50;
const MAX_ACTIVITY_LIMIT: u32 = 200;

/// Proof that the caller presented the configured bearer token.
pub(crate) struct Authorized;

impl FromRequestParts<Arc<AppState>> for Authorized {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let TypedHeader(auth) =
            TypedHeader::<Authorization<Bearer>>::from_request_parts(parts, state)
                .await
                .map_err(|_| AppError::Unauthorized)?;

        if hash_api_key(auth.token()) != state.api_token_hash {
            tracing::warn!("Rejected request with invalid API token");
            return Err(AppError::Unauthorized);
        }
        Ok(Authorized)
    }
}

async fn resolve(state: &AppState, server_id: &str) -> Result<ServerRef, AppError> {
    Ok(state.servers.resolve(server_id).await?)
}

#[derive(Serialize)]
pub(crate) struct Success {
    success: bool,
}

const SUCCESS: Success = Success { success: true };

#[derive(Serialize)]
pub(crate) struct OverviewResponse {
    success: bool,
    #[serde(flatten)]
    overview: Overview,
}

#[derive(Serialize)]
pub(crate) struct ActivityResponse {
    success: bool,
    events: Vec<AuditEvent>,
}

#[derive(Deserialize, Default)]
#[serde(default)]
pub(crate) struct NamedRequest {
    name: Option<String>,
}

#[derive(Deserialize, Default)]
#[serde(default)]
pub(crate) struct PlayerRequest {
    uuid: Option<String>,
}

#[derive(Deserialize, Default)]
#[serde(default)]
pub(crate) struct BanRequest {
    name: Option<String>,
    reason: Option<String>,
}

#[derive(Deserialize, Default)]
#[serde(default)]
pub(crate) struct ReasonedPlayerRequest {
    uuid: Option<String>,
    reason: Option<String>,
}

#[derive(Deserialize, Default)]
#[serde(default)]
pub(crate) struct WhisperRequest {
    uuid: Option<String>,
    message: Option<String>,
}

#[derive(Deserialize, Default)]
#[serde(default)]
pub(crate) struct IpRequest {
    ip: Option<String>,
    reason: Option<String>,
}

#[derive(Deserialize, Default)]
#[serde(default)]
pub(crate) struct WhitelistStatusRequest {
    enabled: Option<bool>,
}

#[derive(Deserialize, Default)]
#[serde(default)]
pub(crate) struct ActivityQuery {
    limit: Option<u32>,
}

#[debug_handler]
pub(crate) async fn overview(
    State(state): State<Arc<AppState>>,
    _auth: Authorized,
    Path(server_id): Path<String>,
) -> Result<Json<OverviewResponse>, AppError> {
    let server = resolve(&state, &server_id).await?;
    let overview = state.manager.overview(&server).await;

    Ok(Json(OverviewResponse {
        success: true,
        overview,
    }))
}

#[debug_handler]
pub(crate) async fn set_whitelist(
    State(state): State<Arc<AppState>>,
    _auth: Authorized,
    Path(server_id): Path<String>,
    payload: Result<Json<WhitelistStatusRequest>, JsonRejection>,
) -> Result<Json<Success>, AppError> {
    let Json(payload) = payload?;
    let enabled = validation::enabled(payload.enabled)?;

    let server = resolve(&state, &server_id).await?;
    state.manager.set_whitelist_enabled(&server, enabled).await?;

    Ok(Json(SUCCESS))
}

pub(crate) async fn add_whitelist(
    State(state): State<Arc<AppState>>,
    _auth: Authorized,
    Path(server_id): Path<String>,
    payload: Result<Json<NamedRequest>, JsonRejection>,
) -> Result<Json<Success>, AppError> {
    let Json(payload) = payload?;
    let name = validation::player_name(payload.name.as_deref())?;

    let server = resolve(&state, &server_id).await?;
    state.manager.add_whitelist(&server, &name).await?;

    Ok(Json(SUCCESS))
}

pub(crate) async fn remove_whitelist(
    State(state): State<Arc<AppState>>,
    _auth: Authorized,
    Path(server_id): Path<String>,
    payload: Result<Json<PlayerRequest>, JsonRejection>,
) -> Result<Json<Success>, AppError> {
    let Json(payload) = payload?;
    let uuid = validation::player_uuid(payload.uuid.as_deref())?;

    let server = resolve(&state, &server_id).await?;
    state.manager.remove_whitelist(&server, &uuid).await?;

    Ok(Json(SUCCESS))
}

#[debug_handler]
pub(crate) async fn op(
    State(state): State<Arc<AppState>>,
    _auth: Authorized,
    Path(server_id): Path<String>,
    payload: Result<Json<NamedRequest>, JsonRejection>,
) -> Result<Json<Success>, AppError> {
    let Json(payload) = payload?;
    let name = validation::player_name(payload.name.as_deref())?;

    let server = resolve(&state, &server_id).await?;
    state.manager.op(&server, &name).await?;

    Ok(Json(SUCCESS))
}

pub(crate) async fn deop(
    State(state): State<Arc<AppState>>,
    _auth: Authorized,
    Path(server_id): Path<String>,
    payload: Result<Json<PlayerRequest>, JsonRejection>,
) -> Result<Json<Success>, AppError> {
    let Json(payload) = payload?;
    let uuid = validation::player_uuid(payload.uuid.as_deref())?;

    let server = resolve(&state, &server_id).await?;
    state.manager.deop(&server, &uuid).await?;

    Ok(Json(SUCCESS))
}

pub(crate) async fn ban(
    State(state): State<Arc<AppState>>,
    _auth: Authorized,
    Path(server_id): Path<String>,
    payload: Result<Json<BanRequest>, JsonRejection>,
) -> Result<Json<Success>, AppError> {
    let Json(payload) = payload?;
    let name = validation::player_name(payload.name.as_deref())?;
    let reason = validation::reason(payload.reason.as_deref())?;

    let server = resolve(&state, &server_id).await?;
    state.manager.ban(&server, &name, reason).await?;

    Ok(Json(SUCCESS))
}

pub(crate) async fn unban(
    State(state): State<Arc<AppState>>,
    _auth: Authorized,
    Path(server_id): Path<String>,
    payload: Result<Json<PlayerRequest>, JsonRejection>,
) -> Result<Json<Success>, AppError> {
    let Json(payload) = payload?;
    let uuid = validation::player_uuid(payload.uuid.as_deref())?;

    let server = resolve(&state, &server_id).await?;
    state.manager.unban(&server, &uuid).await?;

    Ok(Json(SUCCESS))
}

pub(crate) async fn ban_ip(
    State(state): State<Arc<AppState>>,
    _auth: Authorized,
    Path(server_id): Path<String>,
    payload: Result<Json<IpRequest>, JsonRejection>,
) -> Result<Json<Success>, AppError> {
    let Json(payload) = payload?;
    let ip = validation::ip_address(payload.ip.as_deref())?;
    let reason = validation::optional_reason(payload.reason.as_deref())?.unwrap_or(DEFAULT_BAN_REASON);

    let server = resolve(&state, &server_id).await?;
    state.manager.ban_ip(&server, ip, reason).await?;

    Ok(Json(SUCCESS))
}

pub(crate) async fn unban_ip(
    State(state): State<Arc<AppState>>,
    _auth: Authorized,
    Path(server_id): Path<String>,
    payload: Result<Json<IpRequest>, JsonRejection>,
) -> Result<Json<Success>, AppError> {
    let Json(payload) = payload?;
    let ip = validation::ip_address(payload.ip.as_deref())?;

    let server = resolve(&state, &server_id).await?;
    state.manager.unban_ip(&server, ip).await?;

    Ok(Json(SUCCESS))
}

pub(crate) async fn ban_ip_player(
    State(state): State<Arc<AppState>>,
    _auth: Authorized,
    Path(server_id): Path<String>,
    payload: Result<Json<ReasonedPlayerRequest>, JsonRejection>,
) -> Result<Json<Success>, AppError> {
    let Json(payload) = payload?;
    let uuid = validation::player_uuid(payload.uuid.as_deref())?;
    let reason = validation::reason(payload.reason.as_deref())?;

    let server = resolve(&state, &server_id).await?;
    state.manager.ban_ip_player(&server, &uuid, reason).await?;

    Ok(Json(SUCCESS))
}

pub(crate) async fn kick(
    State(state): State<Arc<AppState>>,
    _auth: Authorized,
    Path(server_id): Path<String>,
    payload: Result<Json<ReasonedPlayerRequest>, JsonRejection>,
) -> Result<Json<Success>, AppError> {
    let Json(payload) = payload?;
    let uuid = validation::player_uuid(payload.uuid.as_deref())?;
    let reason = validation::reason(payload.reason.as_deref())?;

    let server = resolve(&state, &server_id).await?;
    state.manager.kick(&server, &uuid, reason).await?;

    Ok(Json(SUCCESS))
}

pub(crate) async fn clear(
    State(state): State<Arc<AppState>>,
    _auth: Authorized,
    Path(server_id): Path<String>,
    payload: Result<Json<PlayerRequest>, JsonRejection>,
) -> Result<Json<Success>, AppError> {
    let Json(payload) = payload?;
    let uuid = validation::player_uuid(payload.uuid.as_deref())?;

    let server = resolve(&state, &server_id).await?;
    state.manager.clear(&server, &uuid).await?;

    Ok(Json(SUCCESS))
}

pub(crate) async fn wipe(
    State(state): State<Arc<AppState>>,
    _auth: Authorized,
    Path(server_id): Path<String>,
    payload: Result<Json<PlayerRequest>, JsonRejection>,
) -> Result<Json<Success>, AppError> {
    let Json(payload) = payload?;
    let uuid = validation::player_uuid(payload.uuid.as_deref())?;

    let server = resolve(&state, &server_id).await?;
    state.manager.wipe(&server, &uuid).await?;

    Ok(Json(SUCCESS))
}

pub(crate) async fn whisper(
    State(state): State<Arc<AppState>>,
    _auth: Authorized,
    Path(server_id): Path<String>,
    payload: Result<Json<WhisperRequest>, JsonRejection>,
) -> Result<Json<Success>, AppError> {
    let Json(payload) = payload?;
    let uuid = validation::player_uuid(payload.uuid.as_deref())?;
    let message = validation::message(payload.message.as_deref())?;

    let server = resolve(&state, &server_id).await?;
    state.manager.whisper(&server, &uuid, message).await?;

    Ok(Json(SUCCESS))
}

pub(crate) async fn kill(
    State(state): State<Arc<AppState>>,
    _auth: Authorized,
    Path(server_id): Path<String>,
    payload: Result<Json<PlayerRequest>, JsonRejection>,
) -> Result<Json<Success>, AppError> {
    let Json(payload) = payload?;
    let uuid = validation::player_uuid(payload.uuid.as_deref())?;

    let server = resolve(&state, &server_id).await?;
    state.manager.kill(&server, &uuid).await?;

    Ok(Json(SUCCESS))
}

#[debug_handler]
pub(crate) async fn activity(
    State(state): State<Arc<AppState>>,
    _auth: Authorized,
    Path(server_id): Path<String>,
    query: Result<Query<ActivityQuery>, QueryRejection>,
) -> Result<Json<ActivityResponse>, AppError> {
    let Query(query) = query?;
    let limit = query
        .limit
        .unwrap_or(DEFAULT_ACTIVITY_LIMIT)
        .clamp(1, MAX_ACTIVITY_LIMIT);

    let server = resolve(&state, &server_id).await?;
    let events = state.audit.recent_events(server.id, limit).await?;

    Ok(Json(ActivityResponse {
        success: true,
        events,
    }))
}
