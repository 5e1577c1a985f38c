//! OS resource groups that guarantee every descendant dies on cleanup

#[cfg(target_os = "linux")]
mod cgroup;
mod group;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::Result;

#[cfg(target_os = "linux")]
pub use cgroup::{CgroupTracker, CgroupVersion};
pub use group::ProcessGroupTracker;

/// Limits applied to every process in a tracker.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceLimits {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_bytes: Option<u64>,
    /// Share of one CPU, in percent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu_quota_percent: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_processes: Option<u64>,
}

impl ResourceLimits {
    pub fn is_empty(&self) -> bool {
        self.memory_bytes.is_none() && self.cpu_quota_percent.is_none() && self.max_processes.is_none()
    }
}

/// A container that processes are added to and that can be torn down as a
/// whole.
#[async_trait]
pub trait ProcessTracker: Send + Sync + fmt::Debug {
    /// Place the process `pid` (and its future children) in the container.
    fn add(&self, pid: i32) -> Result<()>;

    /// Apply resource limits to the container.
    fn update_limits(&self, limits: &ResourceLimits) -> Result<()>;

    /// Kill everything in the container and release it. Calling this again
    /// is harmless.
    async fn cleanup(&self) -> Result<()>;
}

/// Best tracker available on this host for the container `name`.
///
/// Linux hosts get a cgroup when the hierarchy is writable; every other case
/// falls back to tracking process groups.
pub fn new_tracker(name: &str) -> Arc<dyn ProcessTracker> {
    #[cfg(target_os = "linux")]
    {
        match CgroupTracker::new(name) {
            Ok(tracker) => {
                info!(name, version = ?tracker.version(), "Tracking processes with a cgroup");
                return Arc::new(tracker);
            }
            Err(e) => {
                tracing::warn!(name, error = %e, "Cgroups unavailable, tracking process groups instead");
            }
        }
    }

    info!(name, "Tracking process groups");
    Arc::new(ProcessGroupTracker::new())
}
