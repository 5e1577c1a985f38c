//! Process classification used by `list`

use std::fmt;
use std::str::FromStr;

use jasper_process::ProcessInfo;
use serde::{Deserialize, Serialize};

use crate::error::ManagerError;

/// Which processes a listing returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Filter {
    All,
    Running,
    Terminated,
    Failed,
    Successful,
}

impl Filter {
    /// Every filter value.
    pub const VALUES: [Filter; 5] = [
        Filter::All,
        Filter::Running,
        Filter::Terminated,
        Filter::Failed,
        Filter::Successful,
    ];

    /// Wire name
    pub fn as_str(self) -> &'static str {
        match self {
            Filter::All => "all",
            Filter::Running => "running",
            Filter::Terminated => "terminated",
            Filter::Failed => "failed",
            Filter::Successful => "successful",
        }
    }

    /// Whether a process in state `info` passes this filter.
    pub fn matches(self, info: &ProcessInfo) -> bool {
        match self {
            Filter::All => true,
            Filter::Running => info.is_running,
            Filter::Terminated => !info.is_running,
            Filter::Failed => info.complete && !info.successful,
            Filter::Successful => info.successful,
        }
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Filter {
    type Err = ManagerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Filter::VALUES
            .into_iter()
            .find(|filter| filter.as_str() == s)
            .ok_or_else(|| ManagerError::InvalidInput(format!("'{}' is not a valid filter", s)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn finished(exit_code: i32) -> ProcessInfo {
        ProcessInfo {
            id: "p".to_string(),
            complete: true,
            exit_code,
            successful: exit_code == 0,
            ..Default::default()
        }
    }

    #[test]
    fn test_parse_known_values() {
        for filter in Filter::VALUES {
            assert_eq!(filter.as_str().parse::<Filter>().unwrap(), filter);
        }
        assert!("Running".parse::<Filter>().is_err());
        assert!("".parse::<Filter>().is_err());
    }

    #[test]
    fn test_matches() {
        let running = ProcessInfo {
            is_running: true,
            ..Default::default()
        };
        assert!(Filter::Running.matches(&running));
        assert!(!Filter::Terminated.matches(&running));
        assert!(!Filter::Failed.matches(&running));

        assert!(Filter::Successful.matches(&finished(0)));
        assert!(Filter::Terminated.matches(&finished(0)));
        assert!(Filter::Failed.matches(&finished(2)));
        assert!(!Filter::Successful.matches(&finished(2)));
        assert!(Filter::All.matches(&finished(2)));
    }

    #[test]
    fn test_serde_uses_wire_names() {
        assert_eq!(serde_json::to_string(&Filter::Failed).unwrap(), "\"failed\"");
    }
}
