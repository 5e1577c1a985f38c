//! Process state snapshots

use serde::{Deserialize, Serialize};

use crate::options::CreateOptions;

/// Snapshot of a process's observable state.
///
/// Once `complete` is set no field changes again.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessInfo {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub host: String,
    #[serde(default = "unknown_pid")]
    pub pid: i32,
    #[serde(default, rename = "running")]
    pub is_running: bool,
    #[serde(default)]
    pub successful: bool,
    #[serde(default)]
    pub complete: bool,
    #[serde(default, rename = "timedout")]
    pub timeout: bool,
    #[serde(default)]
    pub exit_code: i32,
    #[serde(default)]
    pub options: CreateOptions,
}

fn unknown_pid() -> i32 {
    -1
}

impl Default for ProcessInfo {
    fn default() -> Self {
        Self {
            id: String::new(),
            host: String::new(),
            pid: unknown_pid(),
            is_running: false,
            successful: false,
            complete: false,
            timeout: false,
            exit_code: 0,
            options: CreateOptions::default(),
        }
    }
}

impl ProcessInfo {
    /// The empty snapshot returned when no process could be observed.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Whether this is the empty snapshot.
    pub fn is_empty(&self) -> bool {
        self.id.is_empty()
    }

    /// Record a terminal outcome.
    pub(crate) fn finish(&mut self, exit_code: i32, signaled: bool, timed_out: bool) {
        self.is_running = false;
        self.complete = true;
        self.exit_code = exit_code;
        self.timeout = timed_out;
        self.successful = exit_code == 0 && !signaled && !timed_out;
    }
}

/// Name of this host as reported in process info.
pub fn hostname() -> String {
    #[cfg(unix)]
    {
        nix::unistd::gethostname()
            .ok()
            .and_then(|name| name.into_string().ok())
            .unwrap_or_default()
    }
    #[cfg(not(unix))]
    {
        std::env::var("COMPUTERNAME").unwrap_or_default()
    }
}
