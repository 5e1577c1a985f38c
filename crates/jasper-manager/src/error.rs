//! Error types for managers, commands and the logging cache

use jasper_process::{ErrorKind, ProcessError};
use thiserror::Error;

/// Manager errors
#[derive(Debug, Error)]
pub enum ManagerError {
    /// Failure reported by a process
    #[error(transparent)]
    Process(#[from] ProcessError),

    /// Bad filter, empty ID, duplicate registration
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Unknown process or logger
    #[error("'{0}' not found")]
    NotFound(String),

    /// Operation not allowed in the current state
    #[error("{0}")]
    PreconditionFailed(String),

    /// The caller canceled the operation
    #[error("operation canceled")]
    Canceled,

    /// Several independent failures
    #[error("{}", format_aggregate(.0))]
    Aggregate(Vec<ManagerError>),
}

impl ManagerError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ManagerError::Process(e) => e.kind(),
            ManagerError::InvalidInput(_) => ErrorKind::InvalidInput,
            ManagerError::NotFound(_) => ErrorKind::NotFound,
            ManagerError::PreconditionFailed(_) => ErrorKind::PreconditionFailed,
            ManagerError::Canceled => ErrorKind::Canceled,
            ManagerError::Aggregate(errors) => errors
                .first()
                .map(ManagerError::kind)
                .unwrap_or(ErrorKind::Internal),
        }
    }

    /// Collapse a list of errors: none is success, one is itself, more is an
    /// aggregate.
    pub fn from_many(mut errors: Vec<ManagerError>) -> Result<()> {
        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(ManagerError::Aggregate(errors)),
        }
    }
}

fn format_aggregate(errors: &[ManagerError]) -> String {
    let causes: Vec<String> = errors.iter().map(ToString::to_string).collect();
    format!("{} errors occurred: {}", errors.len(), causes.join("; "))
}

/// Result type for manager operations
pub type Result<T> = std::result::Result<T, ManagerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_process_errors_keep_their_kind() {
        let err: ManagerError = ProcessError::NonZeroExit { code: 1, timed_out: false }.into();
        assert_eq!(err.kind(), ErrorKind::ExitFailure);
        assert_eq!(err.to_string(), "process exited with code 1");
    }

    #[test]
    fn test_from_many() {
        assert!(ManagerError::from_many(Vec::new()).is_ok());

        let single = ManagerError::from_many(vec![ManagerError::Canceled]).unwrap_err();
        assert!(matches!(single, ManagerError::Canceled));

        let many = ManagerError::from_many(vec![
            ManagerError::NotFound("a".into()),
            ManagerError::Canceled,
        ])
        .unwrap_err();
        assert_eq!(many.kind(), ErrorKind::NotFound);
        assert!(many.to_string().starts_with("2 errors occurred"));
    }
}
