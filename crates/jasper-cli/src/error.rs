// CLI error types

use jasper_api::ApiError;
use thiserror::Error;

/// CLI-specific errors
#[derive(Error, Debug)]
pub enum CliError {
    #[error("Invalid request: {message}")]
    InvalidRequest { message: String },

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A waited-on process finished unsuccessfully
    #[error("{text}")]
    ProcessFailed { exit_code: i32, text: String },
}

impl CliError {
    /// Get a user-friendly error message with suggestions
    pub fn user_message(&self) -> String {
        match self {
            CliError::InvalidRequest { message } => {
                format!("Invalid request: {}\n\nRequests are JSON objects read from standard input.", message)
            }
            CliError::Config(e) => {
                format!("Configuration error: {}\n\nCheck the --config file and JASPER_* environment variables.", e)
            }
            CliError::Api(e) => format!("Service call failed: {}", e),
            CliError::Json(e) => format!("Malformed JSON: {}", e),
            CliError::Io(e) => format!("I/O failed: {}", e),
            CliError::ProcessFailed { text, .. } => text.clone(),
        }
    }
}

pub type CliResult<T> = Result<T, CliError>;
