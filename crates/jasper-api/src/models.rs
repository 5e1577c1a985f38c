//! API request and response models
//!
//! Process-returning routes answer with [`jasper_process::ProcessInfo`] and
//! options travel as [`jasper_process::CreateOptions`]; the types here cover
//! everything else.

use serde::{Deserialize, Serialize};

/// Outcome of an operation that returns nothing else, and the body of
/// every failed request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomeResponse {
    /// Whether the operation succeeded
    pub success: bool,
    /// Error text on failure, empty otherwise
    #[serde(default)]
    pub text: String,
}

impl OutcomeResponse {
    pub fn ok() -> Self {
        Self {
            success: true,
            text: String::new(),
        }
    }

    pub fn failure(text: impl Into<String>) -> Self {
        Self {
            success: false,
            text: text.into(),
        }
    }
}

/// Service status
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusResponse {
    pub active: bool,
    pub host: String,
    pub pid: u32,
    pub manager_id: String,
    /// Seconds since the service started
    pub uptime: u64,
}

/// ID of the service's manager
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdResponse {
    pub id: String,
}

/// Result of waiting on a process. A finished process always yields its
/// exit code; `error` carries the non-zero exit description.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaitResponse {
    pub exit_code: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub timed_out: bool,
}

/// Query for `POST /process/:id/tags`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TagQuery {
    #[serde(default)]
    pub add: String,
}

/// Query for `GET /process/:id/logs`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LogsQuery {
    /// Most recent lines to return
    #[serde(default)]
    pub count: Option<usize>,
}

/// Default number of log lines returned when no count is given.
pub const DEFAULT_LOG_LINES: usize = 100;

/// Number of cached loggers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SizeResponse {
    pub size: usize,
}

/// Loggers dropped by a prune
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PruneResponse {
    pub removed: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_wire_shape() {
        let json = serde_json::to_value(OutcomeResponse::failure("boom")).unwrap();
        assert_eq!(json, serde_json::json!({"success": false, "text": "boom"}));

        let parsed: OutcomeResponse = serde_json::from_str(r#"{"success": true}"#).unwrap();
        assert_eq!(parsed, OutcomeResponse::ok());
    }

    #[test]
    fn test_wait_response_omits_missing_error() {
        let json = serde_json::to_value(WaitResponse {
            exit_code: 0,
            error: None,
            timed_out: false,
        })
        .unwrap();
        assert_eq!(json, serde_json::json!({"exit_code": 0, "timed_out": false}));
    }
}
