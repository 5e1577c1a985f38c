//! Process-wide table of signal trigger factories
//!
//! Remote callers cannot ship code, so they attach signal triggers by name.
//! The names resolve here to factories linked into the service.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use parking_lot::RwLock;
use tracing::debug;

use crate::error::{ProcessError, Result};
use crate::info::ProcessInfo;
use crate::process::SignalTrigger;
use crate::signal::Signal;

/// Builds a fresh signal trigger for one process.
pub type SignalTriggerFactory = fn() -> SignalTrigger;

/// Stops mongod/mongos through their own shutdown path on Windows.
pub const MONGOD_SHUTDOWN_TRIGGER: &str = "mongod_shutdown";

/// Ends a Windows process through a close request instead of a forced kill.
pub const CLEAN_TERMINATION_TRIGGER: &str = "clean_termination";

static REGISTRY: Lazy<RwLock<HashMap<String, SignalTriggerFactory>>> = Lazy::new(|| {
    let mut factories: HashMap<String, SignalTriggerFactory> = HashMap::new();
    factories.insert(MONGOD_SHUTDOWN_TRIGGER.to_string(), mongod_shutdown_trigger);
    if cfg!(windows) {
        factories.insert(CLEAN_TERMINATION_TRIGGER.to_string(), clean_termination_trigger);
    }
    RwLock::new(factories)
});

/// Add a factory under `id`.
pub fn register_signal_trigger_factory(id: &str, factory: SignalTriggerFactory) -> Result<()> {
    if id.is_empty() {
        return Err(ProcessError::InvalidInput(
            "cannot register a signal trigger with an empty id".to_string(),
        ));
    }

    let mut registry = REGISTRY.write();
    if registry.contains_key(id) {
        return Err(ProcessError::PreconditionFailed(format!(
            "signal trigger '{}' is already registered",
            id
        )));
    }
    registry.insert(id.to_string(), factory);
    debug!(id, "Registered signal trigger factory");
    Ok(())
}

/// Look up the factory registered under `id`.
pub fn get_signal_trigger_factory(id: &str) -> Option<SignalTriggerFactory> {
    REGISTRY.read().get(id).copied()
}

/// Every registered id, sorted.
pub fn registered_signal_triggers() -> Vec<String> {
    let mut ids: Vec<String> = REGISTRY.read().keys().cloned().collect();
    ids.sort();
    ids
}

fn executable_name(info: &ProcessInfo) -> Option<String> {
    let program = info.options.args.first()?;
    let stem = std::path::Path::new(program).file_stem()?;
    Some(stem.to_string_lossy().to_lowercase())
}

fn mongod_shutdown_trigger() -> SignalTrigger {
    Box::new(|info: &ProcessInfo, signal: Signal| {
        if !matches!(signal, Signal::Terminate | Signal::Kill) {
            return false;
        }
        match executable_name(info).as_deref() {
            Some("mongod") | Some("mongos") => request_close(info.pid),
            _ => false,
        }
    })
}

fn clean_termination_trigger() -> SignalTrigger {
    Box::new(|info: &ProcessInfo, signal: Signal| {
        matches!(signal, Signal::Terminate | Signal::Kill) && request_close(info.pid)
    })
}

/// Ask a Windows process to exit on its own. Returns whether the request was
/// delivered; elsewhere the ordinary signal is already graceful.
#[cfg(windows)]
fn request_close(pid: i32) -> bool {
    let status = std::process::Command::new("taskkill")
        .args(["/pid", &pid.to_string()])
        .stdin(std::process::Stdio::null())
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .status();
    match status {
        Ok(status) => status.success(),
        Err(e) => {
            tracing::warn!(pid, error = %e, "Failed to request process close");
            false
        }
    }
}

#[cfg(not(windows))]
fn request_close(_pid: i32) -> bool {
    false
}
