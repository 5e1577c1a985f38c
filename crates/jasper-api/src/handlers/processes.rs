//! Process and manager endpoints

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    Json,
};
use futures::future::join_all;
use jasper_manager::Filter;
use jasper_process::{CreateOptions, ProcessError, ProcessHandle, ProcessInfo, Signal};
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::parse_json;
use crate::{
    error::{ApiError, ApiResult},
    models::{LogsQuery, OutcomeResponse, TagQuery, WaitResponse, DEFAULT_LOG_LINES},
    state::AppState,
};

async fn snapshots(ctx: &CancellationToken, procs: Vec<ProcessHandle>) -> Vec<ProcessInfo> {
    join_all(procs.iter().map(|process| process.info(ctx))).await
}

/// Create a process bound to the service's lifetime
pub async fn create(State(state): State<AppState>, body: Bytes) -> ApiResult<Json<ProcessInfo>> {
    let opts: CreateOptions = parse_json(&body)?;
    let process = state.manager.create_process(&state.root, opts).await?;
    info!(id = process.id(), "Created process over REST");

    let ctx = state.request_ctx();
    Ok(Json(process.info(&ctx).await))
}

pub async fn list(
    State(state): State<AppState>,
    Path(filter): Path<String>,
) -> ApiResult<Json<Vec<ProcessInfo>>> {
    let filter: Filter = filter.parse()?;
    let ctx = state.request_ctx();
    let procs = state.manager.list(&ctx, filter).await?;
    Ok(Json(snapshots(&ctx, procs).await))
}

pub async fn group(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<Json<Vec<ProcessInfo>>> {
    let ctx = state.request_ctx();
    let procs = state.manager.group(&ctx, &name).await?;
    Ok(Json(snapshots(&ctx, procs).await))
}

pub async fn get(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<ProcessInfo>> {
    let ctx = state.request_ctx();
    let process = state.manager.get(&ctx, &id).await?;
    Ok(Json(process.info(&ctx).await))
}

pub async fn get_tags(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Vec<String>>> {
    let ctx = state.request_ctx();
    let process = state.manager.get(&ctx, &id).await?;
    Ok(Json(process.get_tags(&ctx).await))
}

pub async fn add_tag(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<TagQuery>,
) -> ApiResult<Json<OutcomeResponse>> {
    let tag = query.add;
    if tag.is_empty() {
        return Err(ApiError::BadRequest("no tag specified".to_string()));
    }

    let ctx = state.request_ctx();
    let process = state.manager.get(&ctx, &id).await?;
    process.tag(&ctx, &tag).await;
    Ok(Json(OutcomeResponse::ok()))
}

pub async fn reset_tags(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<OutcomeResponse>> {
    let ctx = state.request_ctx();
    let process = state.manager.get(&ctx, &id).await?;
    process.reset_tags(&ctx).await;
    Ok(Json(OutcomeResponse::ok()))
}

/// Block until the process exits. A non-zero exit is a successful request
/// whose body carries the code and the error text.
pub async fn wait(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<WaitResponse>> {
    let ctx = state.request_ctx();
    let process = state.manager.get(&ctx, &id).await?;

    match process.wait(&ctx).await {
        Ok(exit_code) => Ok(Json(WaitResponse {
            exit_code,
            error: None,
            timed_out: false,
        })),
        Err(err) => match err {
            ProcessError::NonZeroExit { code, timed_out } => Ok(Json(WaitResponse {
                exit_code: code,
                error: Some(err.to_string()),
                timed_out,
            })),
            other => Err(other.into()),
        },
    }
}

/// Start a copy of the process and adopt it into the manager
pub async fn respawn(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<ProcessInfo>> {
    let ctx = state.request_ctx();
    let process = state.manager.get(&ctx, &id).await?;
    let respawned = process.respawn(&state.root).await?;
    state.manager.register(&ctx, respawned.clone()).await?;
    info!(from = %id, id = respawned.id(), "Respawned process over REST");
    Ok(Json(respawned.info(&ctx).await))
}

pub async fn signal(
    State(state): State<AppState>,
    Path((id, signal)): Path<(String, String)>,
) -> ApiResult<Json<OutcomeResponse>> {
    let value: i32 = signal
        .parse()
        .map_err(|_| ApiError::BadRequest(format!("'{}' is not a signal number", signal)))?;
    let signal = Signal::from_wire(value)?;

    let ctx = state.request_ctx();
    let process = state.manager.get(&ctx, &id).await?;
    process.signal(&ctx, signal).await?;
    Ok(Json(OutcomeResponse::ok()))
}

pub async fn register_signal_trigger(
    State(state): State<AppState>,
    Path((id, trigger_id)): Path<(String, String)>,
) -> ApiResult<Json<OutcomeResponse>> {
    let ctx = state.request_ctx();
    let process = state.manager.get(&ctx, &id).await?;
    process.register_signal_trigger_id(&ctx, &trigger_id).await?;
    Ok(Json(OutcomeResponse::ok()))
}

/// Recent lines kept by the process's in-memory logger
pub async fn logs(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<LogsQuery>,
) -> ApiResult<Json<Vec<String>>> {
    let count = query.count.unwrap_or(DEFAULT_LOG_LINES);

    let ctx = state.request_ctx();
    let process = state.manager.get(&ctx, &id).await?;
    let info = process.info(&ctx).await;
    info.options
        .output
        .in_memory_lines(count)
        .map(Json)
        .ok_or_else(|| {
            ApiError::BadRequest(format!("process '{}' has no in-memory logger", id))
        })
}

pub async fn clear(State(state): State<AppState>) -> Json<OutcomeResponse> {
    let ctx = state.request_ctx();
    state.manager.clear(&ctx).await;
    Json(OutcomeResponse::ok())
}

pub async fn close(State(state): State<AppState>) -> ApiResult<Json<OutcomeResponse>> {
    let ctx = state.request_ctx();
    state.manager.close(&ctx).await?;
    Ok(Json(OutcomeResponse::ok()))
}
