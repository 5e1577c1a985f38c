//! The process contract and its local implementations

mod basic;
mod blocking;
mod synchronized;

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::error;

use crate::error::{ProcessError, Result};
use crate::info::ProcessInfo;
use crate::options::{CreateOptions, ProcessImplementation};
use crate::signal::Signal;

pub use basic::BasicProcess;
pub use blocking::BlockingProcess;
pub use synchronized::SynchronizedProcess;

/// Callback fired once when a process reaches its terminal state.
pub type ProcessTrigger = Box<dyn FnOnce(&ProcessInfo) + Send + Sync>;

/// Callback consulted before a signal is delivered. Returning `true`
/// consumes the signal.
pub type SignalTrigger = Box<dyn Fn(&ProcessInfo, Signal) -> bool + Send + Sync>;

/// Shared handle to any process implementation.
pub type ProcessHandle = Arc<dyn Process>;

/// Uniform contract over a supervised OS process.
///
/// Every operation that can wait takes a cancellation token. Cancelling it
/// abandons the call; it never affects the process.
#[async_trait]
pub trait Process: Send + Sync {
    /// Unique identifier
    fn id(&self) -> &str;

    /// Current state snapshot, empty if `ctx` is cancelled first.
    async fn info(&self, ctx: &CancellationToken) -> ProcessInfo;

    /// Whether the process is still running
    async fn running(&self, ctx: &CancellationToken) -> bool;

    /// Whether the process reached its terminal state
    async fn complete(&self, ctx: &CancellationToken) -> bool;

    /// Deliver `signal` unless a signal trigger consumes it.
    async fn signal(&self, ctx: &CancellationToken, signal: Signal) -> Result<()>;

    /// Wait for the process to finish and return its exit code. A non-zero
    /// exit code is reported as [`ProcessError::NonZeroExit`].
    async fn wait(&self, ctx: &CancellationToken) -> Result<i32>;

    /// Start a new process from the same options.
    async fn respawn(&self, ctx: &CancellationToken) -> Result<ProcessHandle>;

    /// Add a completion trigger.
    async fn register_trigger(&self, ctx: &CancellationToken, trigger: ProcessTrigger)
        -> Result<()>;

    /// Add a signal trigger.
    async fn register_signal_trigger(
        &self,
        ctx: &CancellationToken,
        trigger: SignalTrigger,
    ) -> Result<()>;

    /// Add the signal trigger registered under `id`.
    async fn register_signal_trigger_id(&self, ctx: &CancellationToken, id: &str) -> Result<()> {
        let factory = crate::registry::get_signal_trigger_factory(id).ok_or_else(|| {
            ProcessError::InvalidInput(format!("no signal trigger registered with id '{}'", id))
        })?;
        self.register_signal_trigger(ctx, factory()).await
    }

    /// Add a tag. Tagging twice is a no-op.
    async fn tag(&self, ctx: &CancellationToken, tag: &str);

    /// Tags in insertion order
    async fn get_tags(&self, ctx: &CancellationToken) -> Vec<String>;

    /// Remove every tag
    async fn reset_tags(&self, ctx: &CancellationToken);
}

/// Construct the implementation selected by `opts`, wrapped in a
/// [`SynchronizedProcess`] when requested.
///
/// The process stays bound to `ctx`: cancelling it kills the child.
pub fn new_process(ctx: &CancellationToken, opts: CreateOptions) -> Result<ProcessHandle> {
    new_process_with_triggers(ctx, opts, Vec::new())
}

/// Like [`new_process`], with completion triggers registered before the
/// child starts.
pub fn new_process_with_triggers(
    ctx: &CancellationToken,
    opts: CreateOptions,
    triggers: Vec<ProcessTrigger>,
) -> Result<ProcessHandle> {
    opts.validate()?;

    let synchronized = opts.synchronized;
    let process: ProcessHandle = match opts.implementation {
        ProcessImplementation::Basic => {
            Arc::new(BasicProcess::with_triggers(ctx, opts, triggers)?)
        }
        ProcessImplementation::Blocking => {
            Arc::new(BlockingProcess::with_triggers(ctx, opts, triggers)?)
        }
    };

    if synchronized {
        Ok(Arc::new(SynchronizedProcess::new(process)))
    } else {
        Ok(process)
    }
}

/// Run completion triggers in order. A panicking trigger is logged and the
/// rest still run.
pub(crate) fn fire_triggers(triggers: Vec<ProcessTrigger>, info: &ProcessInfo) {
    for (index, trigger) in triggers.into_iter().enumerate() {
        if let Err(panic) = panic::catch_unwind(AssertUnwindSafe(|| trigger(info))) {
            error!(
                id = %info.id,
                index,
                panic = panic_message(&panic),
                "Process trigger panicked"
            );
        }
    }
}

/// Consult signal triggers in order; the first to return `true` wins.
pub(crate) fn consume_signal(
    triggers: &[SignalTrigger],
    info: &ProcessInfo,
    signal: Signal,
) -> bool {
    triggers.iter().enumerate().any(|(index, trigger)| {
        match panic::catch_unwind(AssertUnwindSafe(|| trigger(info, signal))) {
            Ok(consumed) => consumed,
            Err(panic) => {
                error!(
                    id = %info.id,
                    index,
                    panic = panic_message(&panic),
                    "Signal trigger panicked"
                );
                false
            }
        }
    })
}

fn panic_message(panic: &Box<dyn std::any::Any + Send>) -> &str {
    panic
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}

/// Add `tag` to an ordered tag set.
pub(crate) fn insert_tag(tags: &mut Vec<String>, tag: &str) {
    if !tags.iter().any(|t| t == tag) {
        tags.push(tag.to_string());
    }
}

/// Options for a respawned process: same specification, fresh output state.
pub(crate) fn respawn_options(info: &ProcessInfo) -> CreateOptions {
    let mut opts = info.options.clone();
    opts.output = opts.output.detached();
    opts
}

/// Map a terminal exit code onto the result of `wait`.
pub(crate) fn wait_result(info: &ProcessInfo) -> Result<i32> {
    if info.exit_code == 0 && !info.timeout {
        Ok(0)
    } else {
        Err(ProcessError::NonZeroExit {
            code: info.exit_code,
            timed_out: info.timeout,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[test]
    fn test_triggers_run_in_order_despite_panic() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut triggers: Vec<ProcessTrigger> = Vec::new();
        for i in 0..3 {
            let seen = Arc::clone(&seen);
            triggers.push(Box::new(move |_| {
                if i == 1 {
                    panic!("trigger {} failed", i);
                }
                seen.lock().push(i);
            }));
        }

        fire_triggers(triggers, &ProcessInfo::default());
        assert_eq!(*seen.lock(), vec![0, 2]);
    }

    #[test]
    fn test_first_consuming_signal_trigger_short_circuits() {
        let calls = Arc::new(Mutex::new(0));
        let counter = Arc::clone(&calls);
        let triggers: Vec<SignalTrigger> = vec![
            Box::new(|_, sig| sig == Signal::Terminate),
            Box::new(move |_, _| {
                *counter.lock() += 1;
                false
            }),
        ];

        assert!(consume_signal(&triggers, &ProcessInfo::default(), Signal::Terminate));
        assert_eq!(*calls.lock(), 0);
        assert!(!consume_signal(&triggers, &ProcessInfo::default(), Signal::Kill));
        assert_eq!(*calls.lock(), 1);
    }

    #[test]
    fn test_insert_tag_is_set_like() {
        let mut tags = Vec::new();
        insert_tag(&mut tags, "a");
        insert_tag(&mut tags, "b");
        insert_tag(&mut tags, "a");
        assert_eq!(tags, vec!["a", "b"]);
    }
}
