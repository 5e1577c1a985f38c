//! Logging cache endpoints

use axum::{
    body::Bytes,
    extract::{Path, State},
    Json,
};
use chrono::{Duration, Utc};
use jasper_manager::{CachedLoggerInfo, LoggingPayload};
use jasper_process::OutputOptions;

use super::parse_json;
use crate::{
    error::{ApiError, ApiResult},
    models::{OutcomeResponse, PruneResponse, SizeResponse},
    state::AppState,
};

pub async fn create(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Bytes,
) -> ApiResult<Json<CachedLoggerInfo>> {
    let options: OutputOptions = parse_json(&body)?;
    let logger = state.logging.create(&id, options)?;
    Ok(Json(logger.info()))
}

pub async fn get(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<CachedLoggerInfo>> {
    state
        .logging
        .get(&id)
        .map(|logger| Json(logger.info()))
        .ok_or(ApiError::NotFound(id))
}

pub async fn remove(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<OutcomeResponse>> {
    if state.logging.remove(&id) {
        Ok(Json(OutcomeResponse::ok()))
    } else {
        Err(ApiError::NotFound(id))
    }
}

/// Write a batch of messages through a cached logger
pub async fn send(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Bytes,
) -> ApiResult<Json<OutcomeResponse>> {
    let payload: LoggingPayload = parse_json(&body)?;
    let logger = state.logging.get(&id).ok_or(ApiError::NotFound(id))?;
    logger.send(&payload)?;
    Ok(Json(OutcomeResponse::ok()))
}

/// Drop loggers not touched within the last `ttl` seconds
pub async fn prune(
    State(state): State<AppState>,
    Path(ttl): Path<String>,
) -> ApiResult<Json<PruneResponse>> {
    let before = ttl
        .parse::<i64>()
        .ok()
        .filter(|secs| *secs >= 0)
        .and_then(Duration::try_seconds)
        .and_then(|ttl| Utc::now().checked_sub_signed(ttl))
        .ok_or_else(|| ApiError::BadRequest(format!("'{}' is not a TTL in seconds", ttl)))?;

    let removed = state.logging.prune(before);
    Ok(Json(PruneResponse { removed }))
}

pub async fn size(State(state): State<AppState>) -> Json<SizeResponse> {
    Json(SizeResponse {
        size: state.logging.len(),
    })
}
