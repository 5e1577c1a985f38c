//! Portable signal model and delivery

use std::fmt;
use std::process::ExitStatus;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ProcessError, Result};

/// Signals that can cross the wire. Integer values follow the Linux numbering
/// and are mapped to the host's values on delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "i32", into = "i32")]
pub enum Signal {
    /// Signal 0: existence probe, never delivered as a real signal.
    Zero,
    Hangup,
    Interrupt,
    Kill,
    User1,
    User2,
    Terminate,
}

impl Signal {
    /// Decode a wire integer. Negative values are rejected, unknown values
    /// decode to [`Signal::Zero`].
    pub fn from_wire(value: i32) -> Result<Self> {
        if value < 0 {
            return Err(ProcessError::InvalidInput(format!(
                "signal {} is negative",
                value
            )));
        }

        Ok(match value {
            1 => Signal::Hangup,
            2 => Signal::Interrupt,
            9 => Signal::Kill,
            10 => Signal::User1,
            12 => Signal::User2,
            15 => Signal::Terminate,
            _ => Signal::Zero,
        })
    }

    /// Wire integer for this signal.
    pub fn as_wire(self) -> i32 {
        match self {
            Signal::Zero => 0,
            Signal::Hangup => 1,
            Signal::Interrupt => 2,
            Signal::Kill => 9,
            Signal::User1 => 10,
            Signal::User2 => 12,
            Signal::Terminate => 15,
        }
    }

    /// Apply host translation: Windows has no SIGTERM, so it becomes a kill.
    pub fn for_platform(self) -> Self {
        if cfg!(windows) && self == Signal::Terminate {
            Signal::Kill
        } else {
            self
        }
    }

    #[cfg(unix)]
    fn to_nix(self) -> Option<nix::sys::signal::Signal> {
        use nix::sys::signal::Signal as Nix;

        match self {
            Signal::Zero => None,
            Signal::Hangup => Some(Nix::SIGHUP),
            Signal::Interrupt => Some(Nix::SIGINT),
            Signal::Kill => Some(Nix::SIGKILL),
            Signal::User1 => Some(Nix::SIGUSR1),
            Signal::User2 => Some(Nix::SIGUSR2),
            Signal::Terminate => Some(Nix::SIGTERM),
        }
    }

    /// Platform numeric value, which is also the exit code reported for a
    /// process killed by this signal on Unix.
    pub fn platform_value(self) -> i32 {
        #[cfg(unix)]
        {
            self.to_nix().map(|s| s as i32).unwrap_or(0)
        }
        #[cfg(not(unix))]
        {
            self.as_wire()
        }
    }
}

impl TryFrom<i32> for Signal {
    type Error = ProcessError;

    fn try_from(value: i32) -> Result<Self> {
        Signal::from_wire(value)
    }
}

impl From<Signal> for i32 {
    fn from(signal: Signal) -> Self {
        signal.as_wire()
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Signal::Zero => "SIG0",
            Signal::Hangup => "SIGHUP",
            Signal::Interrupt => "SIGINT",
            Signal::Kill => "SIGKILL",
            Signal::User1 => "SIGUSR1",
            Signal::User2 => "SIGUSR2",
            Signal::Terminate => "SIGTERM",
        };
        f.write_str(name)
    }
}

/// Deliver `signal` to the process with the given PID.
#[cfg(unix)]
pub(crate) fn deliver(pid: i32, signal: Signal) -> Result<()> {
    use nix::sys::signal::kill;
    use nix::unistd::Pid;

    debug!(pid, signal = %signal, "Delivering signal");
    match kill(Pid::from_raw(pid), signal.to_nix()) {
        Ok(()) => Ok(()),
        Err(nix::errno::Errno::ESRCH) => Err(ProcessError::terminated()),
        Err(e) => Err(ProcessError::SignalFailed {
            pid,
            reason: e.to_string(),
        }),
    }
}

/// Deliver `signal` to the process with the given PID.
///
/// Only kill-like signals exist on Windows; they map to `taskkill /f`.
#[cfg(windows)]
pub(crate) fn deliver(pid: i32, signal: Signal) -> Result<()> {
    debug!(pid, signal = %signal, "Delivering signal");
    match signal.for_platform() {
        Signal::Zero => Ok(()),
        Signal::Kill => {
            let status = std::process::Command::new("taskkill")
                .args(["/pid", &pid.to_string(), "/f"])
                .stdin(std::process::Stdio::null())
                .stdout(std::process::Stdio::null())
                .stderr(std::process::Stdio::null())
                .status()
                .map_err(|e| ProcessError::SignalFailed {
                    pid,
                    reason: e.to_string(),
                })?;
            if status.success() {
                Ok(())
            } else {
                Err(ProcessError::SignalFailed {
                    pid,
                    reason: format!("taskkill exited with {:?}", status.code()),
                })
            }
        }
        other => Err(ProcessError::Unsupported(format!(
            "{} cannot be delivered on windows",
            other
        ))),
    }
}

/// Translate an exit status into `(exit_code, signaled)`. A process killed by a
/// signal reports the signal number as its exit code.
pub(crate) fn exit_outcome(status: &ExitStatus) -> (i32, bool) {
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;

        if let Some(signal) = status.signal() {
            return (signal, true);
        }
    }

    (status.code().unwrap_or(-1), false)
}
