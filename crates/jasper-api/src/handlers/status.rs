//! Service status endpoints

use axum::{extract::State, Json};
use jasper_process::info::hostname;

use crate::{
    models::{IdResponse, StatusResponse},
    state::AppState,
};

/// Liveness and identity of the service
pub async fn status(State(state): State<AppState>) -> Json<StatusResponse> {
    Json(StatusResponse {
        active: !state.root.is_cancelled(),
        host: hostname(),
        pid: std::process::id(),
        manager_id: state.manager.id().to_string(),
        uptime: state.uptime_seconds(),
    })
}

pub async fn id(State(state): State<AppState>) -> Json<IdResponse> {
    Json(IdResponse {
        id: state.manager.id().to_string(),
    })
}
