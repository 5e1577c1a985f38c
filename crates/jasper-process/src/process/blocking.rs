//! Reactor process: one task owns the child and serializes every operation

use std::future::pending;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot, watch};
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

type Operation = Box<dyn FnOnce(&mut Reactor) + Send>;

/// State owned by the reactor task.
struct Reactor {
    info: ProcessInfo,
    tags: Vec<String>,
    triggers: Vec<ProcessTrigger>,
    signal_triggers: Vec<SignalTrigger>,
}

/// What the reactor leaves behind once the process has finished.
#[derive(Clone)]
struct Terminal {
    info: ProcessInfo,
    tags: Vec<String>,
}

/// A process whose child handle is owned by a single task.
///
/// Calls are queued as closures on an operation channel and answered over a
/// one-shot reply. As soon as the child is reaped the task publishes a
/// terminal snapshot and stops serving operations; later calls are answered
/// from that snapshot. `wait` returns once the output has drained and the
/// triggers have run.
pub struct BlockingProcess {
    id: String,
    ops: mpsc::UnboundedSender<Operation>,
    terminal: Arc<watch::Sender<Option<Terminal>>>,
    done: watch::Receiver<bool>,
}

impl BlockingProcess {
    /// Spawn the process described by `opts` and start its reactor.
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

        let close_trigger: ProcessTrigger = Box::new(move |info: &ProcessInfo| {
            if let Err(e) = closers.close() {
                warn!(id = %info.id, error = %e, "Process closers failed");
            }
        });

        let timeout = opts.timeout;
        let reactor = Reactor {
            info: ProcessInfo {
                id: id.clone(),
                host: hostname(),
                pid: spawned.pid,
                is_running: true,
                options: opts,
                ..Default::default()
            },
            tags,
            triggers: std::iter::once(close_trigger).chain(triggers).collect(),
            signal_triggers: Vec::new(),
        };

        let (ops_tx, ops_rx) = mpsc::unbounded_channel();
        let (terminal_tx, _) = watch::channel(None);
        let terminal = Arc::new(terminal_tx);
        let (done_tx, done_rx) = watch::channel(false);

        tokio::spawn(reactor.run(
            spawned,
            timeout,
            ctx.clone(),
            ops_rx,
            Arc::clone(&terminal),
            done_tx,
        ));

        Ok(Self {
            id,
            ops: ops_tx,
            terminal,
            done: done_rx,
        })
    }

    fn terminal(&self) -> Option<Terminal> {
        self.terminal.borrow().clone()
    }

    /// Run `op` on the reactor. `None` means the reactor is gone or `ctx`
    /// was cancelled first.
    async fn call<T, F>(&self, ctx: &CancellationToken, op: F) -> Option<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Reactor) -> T + Send + 'static,
    {
        let (reply_tx, reply_rx) = oneshot::channel();
        let operation: Operation = Box::new(move |reactor| {
            let _ = reply_tx.send(op(reactor));
        });
        self.ops.send(operation).ok()?;

        tokio::select! {
            biased;
            _ = ctx.cancelled() => None,
            reply = reply_rx => reply.ok(),
        }
    }

    fn closed_or_canceled(&self) -> ProcessError {
        if self.terminal().is_some() {
            ProcessError::terminated()
        } else {
            ProcessError::Canceled
        }
    }

    fn registration_closed(&self, what: &str) -> ProcessError {
        if self.terminal().is_some() {
            ProcessError::PreconditionFailed(format!(
                "cannot register {} after process exits",
                what
            ))
        } else {
            ProcessError::Canceled
        }
    }
}

impl Reactor {
    async fn run(
        mut self,
        mut spawned: Spawned,
        timeout: Duration,
        ctx: CancellationToken,
        mut ops: mpsc::UnboundedReceiver<Operation>,
        terminal: Arc<watch::Sender<Option<Terminal>>>,
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
                Some(op) = ops.recv() => op(&mut self),
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
        self.info.finish(exit_code, signaled, timed_out);
        info!(id = %self.info.id, pid, exit_code, timed_out, "Process completed");

        let triggers = std::mem::take(&mut self.triggers);
        terminal.send_replace(Some(Terminal {
            info: self.info.clone(),
            tags: self.tags,
        }));
        // queued operations are dropped with the receiver and their callers
        // fall back to the terminal snapshot
        drop(ops);

        spawned.drain().await;
        fire_triggers(triggers, &self.info);
        done.send_replace(true);
    }
}

#[async_trait]
impl Process for BlockingProcess {
    fn id(&self) -> &str {
        &self.id
    }

    async fn info(&self, ctx: &CancellationToken) -> ProcessInfo {
        if let Some(terminal) = self.terminal() {
            return terminal.info;
        }
        match self.call(ctx, |reactor| reactor.info.clone()).await {
            Some(info) => info,
            None => self
                .terminal()
                .filter(|_| !ctx.is_cancelled())
                .map(|terminal| terminal.info)
                .unwrap_or_default(),
        }
    }

    async fn running(&self, ctx: &CancellationToken) -> bool {
        self.info(ctx).await.is_running
    }

    async fn complete(&self, ctx: &CancellationToken) -> bool {
        self.info(ctx).await.complete
    }

    async fn signal(&self, ctx: &CancellationToken, signal: Signal) -> Result<()> {
        if self.terminal().is_some() {
            return Err(ProcessError::terminated());
        }

        let id = self.id.clone();
        let outcome = self
            .call(ctx, move |reactor| {
                if reactor.info.complete {
                    return Err(ProcessError::terminated());
                }
                let signal = signal.for_platform();
                if consume_signal(&reactor.signal_triggers, &reactor.info, signal) {
                    debug!(id = %id, signal = %signal, "Signal consumed by trigger");
                    return Ok(());
                }
                signal::deliver(reactor.info.pid, signal)
            })
            .await;

        outcome.unwrap_or_else(|| Err(self.closed_or_canceled()))
    }

    async fn wait(&self, ctx: &CancellationToken) -> Result<i32> {
        let mut done = self.done.clone();
        tokio::select! {
            biased;
            _ = ctx.cancelled() => return Err(ProcessError::Canceled),
            finished = done.wait_for(|complete| *complete) => {
                if finished.is_err() {
                    return Err(ProcessError::TerminationFailed(format!(
                        "reactor for process '{}' stopped before completion",
                        self.id
                    )));
                }
            }
        }

        let info = self.terminal().map(|t| t.info).unwrap_or_default();
        wait_result(&info)
    }

    async fn respawn(&self, ctx: &CancellationToken) -> Result<ProcessHandle> {
        let info = self.info(ctx).await;
        if info.is_empty() {
            return Err(ProcessError::Canceled);
        }
        new_process(ctx, respawn_options(&info))
    }

    async fn register_trigger(&self, ctx: &CancellationToken, trigger: ProcessTrigger) -> Result<()> {
        if self.terminal().is_some() {
            return Err(ProcessError::PreconditionFailed(
                "cannot register trigger after process exits".to_string(),
            ));
        }
        self.call(ctx, move |reactor| reactor.triggers.push(trigger))
            .await
            .ok_or_else(|| self.registration_closed("trigger"))
    }

    async fn register_signal_trigger(
        &self,
        ctx: &CancellationToken,
        trigger: SignalTrigger,
    ) -> Result<()> {
        if self.terminal().is_some() {
            return Err(ProcessError::PreconditionFailed(
                "cannot register signal trigger after process exits".to_string(),
            ));
        }
        self.call(ctx, move |reactor| reactor.signal_triggers.push(trigger))
            .await
            .ok_or_else(|| self.registration_closed("signal trigger"))
    }

    async fn tag(&self, ctx: &CancellationToken, tag: &str) {
        let owned = tag.to_string();
        if self
            .call(ctx, move |reactor| insert_tag(&mut reactor.tags, &owned))
            .await
            .is_none()
        {
            self.terminal.send_modify(|terminal| {
                if let Some(terminal) = terminal {
                    insert_tag(&mut terminal.tags, tag);
                }
            });
        }
    }

    async fn get_tags(&self, ctx: &CancellationToken) -> Vec<String> {
        if let Some(terminal) = self.terminal() {
            return terminal.tags;
        }
        match self.call(ctx, |reactor| reactor.tags.clone()).await {
            Some(tags) => tags,
            None => self.terminal().map(|t| t.tags).unwrap_or_default(),
        }
    }

    async fn reset_tags(&self, ctx: &CancellationToken) {
        if self
            .call(ctx, |reactor| reactor.tags.clear())
            .await
            .is_none()
        {
            self.terminal.send_modify(|terminal| {
                if let Some(terminal) = terminal {
                    terminal.tags.clear();
                }
            });
        }
    }
}
