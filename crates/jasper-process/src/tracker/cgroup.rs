//! Linux cgroup tracker

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use nix::errno::Errno;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use tracing::{debug, warn};

use super::{ProcessTracker, ResourceLimits};
use crate::error::{ProcessError, Result};

const CGROUP_ROOT: &str = "/sys/fs/cgroup";
const V1_SUBSYSTEM: &str = "memory";
const CPU_PERIOD_MICROS: u64 = 100_000;
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);
const DRAIN_POLL: Duration = Duration::from_millis(20);
const REMOVE_ATTEMPTS: usize = 10;

/// Which cgroup hierarchy the tracker writes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CgroupVersion {
    /// Unified hierarchy
    V2,
    /// Legacy hierarchy, memory controller only
    V1,
}

/// Tracks processes in a named cgroup.
#[derive(Debug)]
pub struct CgroupTracker {
    path: PathBuf,
    version: CgroupVersion,
}

impl CgroupTracker {
    /// Create (or reuse) the cgroup `name` under the host hierarchy.
    pub fn new(name: &str) -> Result<Self> {
        let root = Path::new(CGROUP_ROOT);
        if root.join("cgroup.controllers").exists() {
            Self::at(root.join(name), CgroupVersion::V2)
        } else {
            Self::at(root.join(V1_SUBSYSTEM).join(name), CgroupVersion::V1)
        }
    }

    /// Use the cgroup directory at `path`.
    pub fn at(path: impl Into<PathBuf>, version: CgroupVersion) -> Result<Self> {
        let path = path.into();
        fs::create_dir_all(&path).map_err(|e| {
            ProcessError::Unsupported(format!("cannot create cgroup {}: {}", path.display(), e))
        })?;
        Ok(Self { path, version })
    }

    pub fn version(&self) -> CgroupVersion {
        self.version
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write(&self, file: &str, value: &str) -> Result<()> {
        fs::write(self.path.join(file), value).map_err(|e| {
            ProcessError::Io(io::Error::new(
                e.kind(),
                format!("write {} to {}: {}", value, file, e),
            ))
        })
    }

    /// PIDs currently in the cgroup.
    pub fn members(&self) -> Result<Vec<i32>> {
        match fs::read_to_string(self.path.join("cgroup.procs")) {
            Ok(contents) => Ok(contents
                .lines()
                .filter_map(|line| line.trim().parse().ok())
                .collect()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    fn live_members(&self) -> Result<Vec<i32>> {
        Ok(self
            .members()?
            .into_iter()
            .filter(|&pid| !matches!(kill(Pid::from_raw(pid), None), Err(Errno::ESRCH)))
            .collect())
    }

    fn kill_members(&self) -> Vec<ProcessError> {
        let kill_file = self.path.join("cgroup.kill");
        if self.version == CgroupVersion::V2 && kill_file.exists() {
            return match fs::write(&kill_file, "1") {
                Ok(()) => Vec::new(),
                Err(e) => vec![ProcessError::TerminationFailed(format!(
                    "cgroup.kill in {}: {}",
                    self.path.display(),
                    e
                ))],
            };
        }

        let members = match self.members() {
            Ok(members) => members,
            Err(e) => return vec![e],
        };
        members
            .into_iter()
            .filter_map(|pid| match kill(Pid::from_raw(pid), Signal::SIGKILL) {
                Ok(()) | Err(Errno::ESRCH) => None,
                Err(e) => Some(ProcessError::SignalFailed {
                    pid,
                    reason: e.to_string(),
                }),
            })
            .collect()
    }

    async fn remove(&self) -> Result<()> {
        for attempt in 0..REMOVE_ATTEMPTS {
            match fs::remove_dir(&self.path) {
                Ok(()) => return Ok(()),
                Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
                Err(e) if attempt + 1 == REMOVE_ATTEMPTS => {
                    return Err(ProcessError::TerminationFailed(format!(
                        "remove cgroup {}: {}",
                        self.path.display(),
                        e
                    )))
                }
                Err(e) => {
                    debug!(path = %self.path.display(), error = %e, "Cgroup busy, retrying removal");
                    tokio::time::sleep(DRAIN_POLL).await;
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl ProcessTracker for CgroupTracker {
    fn add(&self, pid: i32) -> Result<()> {
        if pid <= 0 {
            return Err(ProcessError::InvalidInput(format!("cannot track pid {}", pid)));
        }
        fs::create_dir_all(&self.path)?;
        self.write("cgroup.procs", &pid.to_string())
    }

    fn update_limits(&self, limits: &ResourceLimits) -> Result<()> {
        match self.version {
            CgroupVersion::V2 => {
                if let Some(bytes) = limits.memory_bytes {
                    self.write("memory.max", &bytes.to_string())?;
                }
                if let Some(count) = limits.max_processes {
                    self.write("pids.max", &count.to_string())?;
                }
                if let Some(percent) = limits.cpu_quota_percent {
                    let quota = CPU_PERIOD_MICROS * u64::from(percent) / 100;
                    self.write("cpu.max", &format!("{} {}", quota, CPU_PERIOD_MICROS))?;
                }
            }
            CgroupVersion::V1 => {
                if limits.cpu_quota_percent.is_some() || limits.max_processes.is_some() {
                    return Err(ProcessError::Unsupported(
                        "the v1 memory cgroup only limits memory".to_string(),
                    ));
                }
                if let Some(bytes) = limits.memory_bytes {
                    self.write("memory.limit_in_bytes", &bytes.to_string())?;
                }
            }
        }
        Ok(())
    }

    async fn cleanup(&self) -> Result<()> {
        if !self.path.exists() {
            return Ok(());
        }

        let mut errors = self.kill_members();

        let deadline = tokio::time::Instant::now() + DRAIN_TIMEOUT;
        loop {
            match self.live_members() {
                Ok(live) if live.is_empty() => break,
                Ok(live) if tokio::time::Instant::now() >= deadline => {
                    warn!(path = %self.path.display(), remaining = live.len(), "Cgroup members survived cleanup");
                    errors.push(ProcessError::TerminationFailed(format!(
                        "{} processes still running in {}",
                        live.len(),
                        self.path.display()
                    )));
                    break;
                }
                Ok(_) => tokio::time::sleep(DRAIN_POLL).await,
                Err(e) => {
                    errors.push(e);
                    break;
                }
            }
        }

        if let Err(e) = self.remove().await {
            errors.push(e);
        }
        ProcessError::from_many(errors)
    }
}
