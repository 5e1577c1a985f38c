//! Fallback tracker built on process groups

use std::collections::BTreeSet;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::{debug, warn};

use super::{ProcessTracker, ResourceLimits};
use crate::error::{ProcessError, Result};

/// Delay between SIGTERM and SIGKILL when tearing a group down.
pub const SIGKILL_ESCALATION: Duration = Duration::from_millis(200);

/// Remembers the process group of every added process and kills whole
/// groups on cleanup. Children start in their own group, so the group id is
/// the child's pid.
///
/// On Windows the tree under each pid is killed with `taskkill /t`.
#[derive(Debug, Default)]
pub struct ProcessGroupTracker {
    groups: Mutex<BTreeSet<i32>>,
}

impl ProcessGroupTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tracked group ids
    pub fn groups(&self) -> Vec<i32> {
        self.groups.lock().iter().copied().collect()
    }
}

#[async_trait]
impl ProcessTracker for ProcessGroupTracker {
    fn add(&self, pid: i32) -> Result<()> {
        if pid <= 0 {
            return Err(ProcessError::InvalidInput(format!("cannot track pid {}", pid)));
        }
        self.groups.lock().insert(pid);
        Ok(())
    }

    fn update_limits(&self, _limits: &ResourceLimits) -> Result<()> {
        Err(ProcessError::Unsupported(
            "process groups cannot enforce resource limits".to_string(),
        ))
    }

    async fn cleanup(&self) -> Result<()> {
        let groups: Vec<i32> = std::mem::take(&mut *self.groups.lock()).into_iter().collect();
        if groups.is_empty() {
            return Ok(());
        }
        debug!(count = groups.len(), "Killing tracked process groups");
        kill_groups(&groups).await
    }
}

#[cfg(unix)]
async fn kill_groups(groups: &[i32]) -> Result<()> {
    use nix::errno::Errno;
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    let send = |signal: Signal, errors: &mut Vec<ProcessError>| {
        for &pgid in groups {
            match killpg(Pid::from_raw(pgid), signal) {
                Ok(()) | Err(Errno::ESRCH) => {}
                Err(e) => {
                    warn!(pgid, signal = %signal, error = %e, "Failed to signal process group");
                    errors.push(ProcessError::TerminationFailed(format!(
                        "signal {} to group {}: {}",
                        signal, pgid, e
                    )));
                }
            }
        }
    };

    let mut errors = Vec::new();
    send(Signal::SIGTERM, &mut errors);
    tokio::time::sleep(SIGKILL_ESCALATION).await;
    send(Signal::SIGKILL, &mut errors);

    ProcessError::from_many(errors)
}

#[cfg(windows)]
async fn kill_groups(groups: &[i32]) -> Result<()> {
    use std::process::Stdio;
    use tokio::process::Command;

    let mut errors = Vec::new();
    for &pid in groups {
        let result = Command::new("taskkill")
            .args(["/pid", &pid.to_string(), "/f", "/t"])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await;
        // a tree that already exited is not an error
        if let Err(e) = result {
            warn!(pid, error = %e, "Failed to run taskkill");
            errors.push(ProcessError::TerminationFailed(format!("taskkill {}: {}", pid, e)));
        }
    }
    ProcessError::from_many(errors)
}
