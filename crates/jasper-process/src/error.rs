//! Error types for process management

use std::io;
use thiserror::Error;

/// Message used whenever an operation needs a live process.
pub const TERMINATED_MESSAGE: &str = "cannot signal a process that has terminated";

/// Coarse classification of every error the process core can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed options, bad filter, unknown trigger id, empty ID.
    InvalidInput,
    /// Lookup of an unknown process.
    NotFound,
    /// Operation not allowed in the current state.
    PreconditionFailed,
    /// The OS refused to create the process.
    SpawnFailure,
    /// A teardown step failed.
    TerminationFailure,
    /// The caller's cancellation token fired.
    Canceled,
    /// The process finished with a non-zero exit code.
    ExitFailure,
    /// A remote service could not be reached or answered with garbage.
    Transport,
    /// Anything else (I/O while talking to the OS).
    Internal,
}

/// Process management errors
#[derive(Debug, Error)]
pub enum ProcessError {
    /// Invalid configuration or argument
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Process not found
    #[error("process '{0}' not found")]
    NotFound(String),

    /// The process is not in a state that allows the operation
    #[error("{0}")]
    PreconditionFailed(String),

    /// Failed to spawn process
    #[error("failed to spawn process: {0}")]
    SpawnFailed(#[source] io::Error),

    /// Failed to deliver a signal
    #[error("failed to signal process {pid}: {reason}")]
    SignalFailed { pid: i32, reason: String },

    /// Failed to tear down a process or resource group
    #[error("termination failed: {0}")]
    TerminationFailed(String),

    /// The platform cannot do what was asked
    #[error("unsupported operation: {0}")]
    Unsupported(String),

    /// The caller canceled the operation
    #[error("operation canceled")]
    Canceled,

    /// Process finished with a non-zero exit code
    #[error("process exited with code {code}{}", timeout_suffix(.timed_out))]
    NonZeroExit { code: i32, timed_out: bool },

    /// Several independent failures
    #[error("{}", format_aggregate(.0))]
    Aggregate(Vec<ProcessError>),

    /// Talking to a remote service failed
    #[error("transport error: {0}")]
    Transport(String),

    /// Failure reported by a remote service, kept with its original kind
    #[error("{message}")]
    Remote { kind: ErrorKind, message: String },

    /// IO error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl ProcessError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ProcessError::InvalidInput(_) | ProcessError::Unsupported(_) => ErrorKind::InvalidInput,
            ProcessError::NotFound(_) => ErrorKind::NotFound,
            ProcessError::PreconditionFailed(_) => ErrorKind::PreconditionFailed,
            ProcessError::SpawnFailed(_) => ErrorKind::SpawnFailure,
            ProcessError::SignalFailed { .. } | ProcessError::TerminationFailed(_) => {
                ErrorKind::TerminationFailure
            }
            ProcessError::Canceled => ErrorKind::Canceled,
            ProcessError::NonZeroExit { .. } => ErrorKind::ExitFailure,
            ProcessError::Aggregate(errors) => errors
                .first()
                .map(ProcessError::kind)
                .unwrap_or(ErrorKind::Internal),
            ProcessError::Transport(_) => ErrorKind::Transport,
            ProcessError::Remote { kind, .. } => *kind,
            ProcessError::Io(_) => ErrorKind::Internal,
        }
    }

    /// Exit code carried by a Wait failure: the process's own code, or -1 when
    /// the wait itself was canceled.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            ProcessError::NonZeroExit { code, .. } => Some(*code),
            ProcessError::Canceled => Some(-1),
            _ => None,
        }
    }

    /// Build the error returned for operations on a completed process.
    pub fn terminated() -> Self {
        ProcessError::PreconditionFailed(TERMINATED_MESSAGE.to_string())
    }

    /// Collapse a list of errors: none is success, one is itself, more is an
    /// aggregate.
    pub fn from_many(mut errors: Vec<ProcessError>) -> Result<()> {
        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(ProcessError::Aggregate(errors)),
        }
    }
}

fn timeout_suffix(timed_out: &bool) -> &'static str {
    if *timed_out {
        " after timing out"
    } else {
        ""
    }
}

fn format_aggregate(errors: &[ProcessError]) -> String {
    let causes: Vec<String> = errors.iter().map(ToString::to_string).collect();
    format!("{} errors occurred: {}", errors.len(), causes.join("; "))
}

/// Result type for process operations
pub type Result<T> = std::result::Result<T, ProcessError>;
