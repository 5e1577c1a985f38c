//! API error types and handling

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use jasper_manager::ManagerError;
use jasper_process::{ErrorKind, ProcessError};
use thiserror::Error;

use crate::models::OutcomeResponse;

/// Nonstandard status used when the caller went away mid-request.
pub const CLIENT_CLOSED_REQUEST: u16 = 499;

/// API error types
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Manager(#[from] ManagerError),

    #[error(transparent)]
    Process(#[from] ProcessError),

    #[error("invalid request: {0}")]
    BadRequest(String),

    #[error("'{0}' not found")]
    NotFound(String),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A non-success answer from a remote service
    #[error("{text}")]
    Service { status: u16, text: String },
}

impl ApiError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ApiError::Manager(e) => e.kind(),
            ApiError::Process(e) => e.kind(),
            ApiError::BadRequest(_) | ApiError::Json(_) => ErrorKind::InvalidInput,
            ApiError::NotFound(_) => ErrorKind::NotFound,
            ApiError::Transport(_) => ErrorKind::Transport,
            ApiError::Io(_) => ErrorKind::Internal,
            ApiError::Service { status, .. } => kind_for_status(*status),
        }
    }

    pub fn status(&self) -> StatusCode {
        status_for_kind(self.kind())
    }
}

/// HTTP status an error kind is reported with.
pub fn status_for_kind(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::InvalidInput => StatusCode::BAD_REQUEST,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::PreconditionFailed => StatusCode::PRECONDITION_FAILED,
        ErrorKind::Canceled => StatusCode::from_u16(CLIENT_CLOSED_REQUEST)
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
        ErrorKind::SpawnFailure
        | ErrorKind::TerminationFailure
        | ErrorKind::ExitFailure
        | ErrorKind::Transport
        | ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Inverse of [`status_for_kind`] for statuses received by a client.
pub fn kind_for_status(status: u16) -> ErrorKind {
    match status {
        400 => ErrorKind::InvalidInput,
        404 => ErrorKind::NotFound,
        412 => ErrorKind::PreconditionFailed,
        CLIENT_CLOSED_REQUEST => ErrorKind::Canceled,
        _ => ErrorKind::Internal,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), error = %self, "Request failed");
        } else {
            tracing::debug!(status = status.as_u16(), error = %self, "Request rejected");
        }

        (status, Json(OutcomeResponse::failure(self.to_string()))).into_response()
    }
}

impl From<ApiError> for ProcessError {
    fn from(err: ApiError) -> Self {
        match err {
            ApiError::Process(e) => e,
            ApiError::Manager(ManagerError::Process(e)) => e,
            ApiError::Transport(e) => ProcessError::Transport(e.to_string()),
            ApiError::Json(e) => ProcessError::Transport(e.to_string()),
            ApiError::Service { status, text } => match kind_for_status(status) {
                ErrorKind::Canceled => ProcessError::Canceled,
                ErrorKind::Internal => ProcessError::Transport(format!("{}: {}", status, text)),
                kind => ProcessError::Remote {
                    kind,
                    message: text,
                },
            },
            other => ProcessError::Remote {
                kind: other.kind(),
                message: other.to_string(),
            },
        }
    }
}

impl From<ApiError> for ManagerError {
    fn from(err: ApiError) -> Self {
        match err {
            ApiError::Manager(e) => e,
            other => ManagerError::Process(other.into()),
        }
    }
}

/// Result type alias for API operations
pub type ApiResult<T> = Result<T, ApiError>;
