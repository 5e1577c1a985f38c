//! Non-blocking process with a background waiter

use std::future::pending;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::{
    consume_signal, fire_triggers, insert_tag, new_process, respawn_options, wait_result,
    Process, ProcessHandle, ProcessTrigger, SignalTrigger,
};
use crate::error::{ProcessError, Result};
use crate::info::{hostname, ProcessInfo};
use crate::options::CreateOptions;
use crate::signal::{self, exit_outcome, Signal};
use crate::spawn::{spawn, Spawned};
use crate::PROCESS_ENV_VAR;

struct State {
    info: ProcessInfo,
    tags: Vec<String>,
    triggers: Vec<ProcessTrigger>,
    signal_triggers: Vec<SignalTrigger>,
}

/// A process that starts on construction and is reaped by a background task.
///
/// All state lives behind one lock. The waiter publishes the terminal state
/// and takes the trigger list in a single write, so a trigger is either
/// registered in time to fire or rejected. The state turns terminal as soon
/// as the child is reaped; triggers run and `wait` returns once the output
/// pumps have drained.
pub struct BasicProcess {
    id: String,
    state: Arc<RwLock<State>>,
    done: watch::Receiver<bool>,
}

impl BasicProcess {
    /// Spawn the process described by `opts`.
    pub fn new(ctx: &CancellationToken, opts: CreateOptions) -> Result<Self> {
        Self::with_triggers(ctx, opts, Vec::new())
    }

    /// Spawn the process with `triggers` already registered, so they fire
    /// even if the child exits before the caller could register them.
    pub fn with_triggers(
        ctx: &CancellationToken,
        mut opts: CreateOptions,
        triggers: Vec<ProcessTrigger>,
    ) -> Result<Self> {
        let id = Uuid::new_v4().to_string();
        opts.add_env_var(PROCESS_ENV_VAR, id.clone());

        let spawned = match spawn(ctx, &opts) {
            Ok(spawned) => spawned,
            Err(e) => {
                if let Err(close_err) = opts.close() {
                    warn!(error = %close_err, "Failed to run closers after spawn failure");
                }
                return Err(e);
            }
        };

        let closers = opts.take_closers();
        let mut tags = Vec::new();
        for tag in &opts.tags {
            insert_tag(&mut tags, tag);
        }

        let timeout = opts.timeout;
        let info = ProcessInfo {
            id: id.clone(),
            host: hostname(),
            pid: spawned.pid,
            is_running: true,
            options: opts,
            ..Default::default()
        };

        let close_trigger: ProcessTrigger = Box::new(move |info: &ProcessInfo| {
            if let Err(e) = closers.close() {
                warn!(id = %info.id, error = %e, "Process closers failed");
            }
        });

        let state = Arc::new(RwLock::new(State {
            info,
            tags,
            triggers: std::iter::once(close_trigger).chain(triggers).collect(),
            signal_triggers: Vec::new(),
        }));
        let (done_tx, done_rx) = watch::channel(false);

        tokio::spawn(supervise(
            spawned,
            timeout,
            ctx.clone(),
            Arc::clone(&state),
            done_tx,
        ));

        Ok(Self {
            id,
            state,
            done: done_rx,
        })
    }
}

async fn supervise(
    mut spawned: Spawned,
    timeout: Duration,
    ctx: CancellationToken,
    state: Arc<RwLock<State>>,
    done: watch::Sender<bool>,
) {
    let pid = spawned.pid;
    let deadline = async move {
        if timeout.is_zero() {
            pending::<()>().await
        } else {
            tokio::time::sleep(timeout).await
        }
    };
    tokio::pin!(deadline);

    let mut timed_out = false;
    let mut canceled = false;
    let status = loop {
        tokio::select! {
            status = spawned.child.wait() => break status,
            _ = &mut deadline, if !timed_out => {
                timed_out = true;
                warn!(pid, timeout_secs = timeout.as_secs(), "Process timed out, killing");
                if let Err(e) = spawned.child.start_kill() {
                    error!(pid, error = %e, "Failed to kill timed out process");
                }
            }
            _ = ctx.cancelled(), if !canceled => {
                canceled = true;
                debug!(pid, "Owning context canceled, killing process");
                if let Err(e) = spawned.child.start_kill() {
                    error!(pid, error = %e, "Failed to kill process");
                }
            }
        }
    };

    let (exit_code, signaled) = match &status {
        Ok(status) => exit_outcome(status),
        Err(e) => {
            error!(pid, error = %e, "Failed to wait for process");
            (-1, false)
        }
    };

    // the child is reaped, so its pid may be reused from here on
    let (info, triggers) = {
        let mut state = state.write();
        state.info.finish(exit_code, signaled, timed_out);
        (state.info.clone(), std::mem::take(&mut state.triggers))
    };
    info!(id = %info.id, pid, exit_code, timed_out, "Process completed");

    spawned.drain().await;
    fire_triggers(triggers, &info);
    done.send_replace(true);
}

#[async_trait]
impl Process for BasicProcess {
    fn id(&self) -> &str {
        &self.id
    }

    async fn info(&self, ctx: &CancellationToken) -> ProcessInfo {
        if ctx.is_cancelled() {
            return ProcessInfo::empty();
        }
        self.state.read().info.clone()
    }

    async fn running(&self, _ctx: &CancellationToken) -> bool {
        self.state.read().info.is_running
    }

    async fn complete(&self, _ctx: &CancellationToken) -> bool {
        self.state.read().info.complete
    }

    async fn signal(&self, ctx: &CancellationToken, signal: Signal) -> Result<()> {
        if ctx.is_cancelled() {
            return Err(ProcessError::Canceled);
        }

        let state = self.state.read();
        if state.info.complete {
            return Err(ProcessError::terminated());
        }

        let signal = signal.for_platform();
        if consume_signal(&state.signal_triggers, &state.info, signal) {
            debug!(id = %self.id, signal = %signal, "Signal consumed by trigger");
            return Ok(());
        }

        signal::deliver(state.info.pid, signal)
    }

    async fn wait(&self, ctx: &CancellationToken) -> Result<i32> {
        let mut done = self.done.clone();
        tokio::select! {
            biased;
            _ = ctx.cancelled() => return Err(ProcessError::Canceled),
            finished = done.wait_for(|complete| *complete) => {
                if finished.is_err() {
                    return Err(ProcessError::TerminationFailed(format!(
                        "waiter for process '{}' stopped before completion",
                        self.id
                    )));
                }
            }
        }

        wait_result(&self.state.read().info)
    }

    async fn respawn(&self, ctx: &CancellationToken) -> Result<ProcessHandle> {
        let opts = respawn_options(&self.state.read().info);
        new_process(ctx, opts)
    }

    async fn register_trigger(
        &self,
        _ctx: &CancellationToken,
        trigger: ProcessTrigger,
    ) -> Result<()> {
        let mut state = self.state.write();
        if state.info.complete {
            return Err(ProcessError::PreconditionFailed(
                "cannot register trigger after process exits".to_string(),
            ));
        }
        state.triggers.push(trigger);
        Ok(())
    }

    async fn register_signal_trigger(
        &self,
        _ctx: &CancellationToken,
        trigger: SignalTrigger,
    ) -> Result<()> {
        let mut state = self.state.write();
        if state.info.complete {
            return Err(ProcessError::PreconditionFailed(
                "cannot register signal trigger after process exits".to_string(),
            ));
        }
        state.signal_triggers.push(trigger);
        Ok(())
    }

    async fn tag(&self, _ctx: &CancellationToken, tag: &str) {
        insert_tag(&mut self.state.write().tags, tag);
    }

    async fn get_tags(&self, _ctx: &CancellationToken) -> Vec<String> {
        self.state.read().tags.clone()
    }

    async fn reset_tags(&self, _ctx: &CancellationToken) {
        self.state.write().tags.clear();
    }
}
