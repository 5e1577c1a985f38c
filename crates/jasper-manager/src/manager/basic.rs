//! In-process manager over local processes

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use futures::future::{join_all, BoxFuture};
use jasper_process::{
    new_process_with_triggers, new_tracker, CreateOptions, ErrorKind, ProcessError,
    ProcessHandle, ProcessInfo, ProcessTracker, ProcessTrigger, Signal, MANAGER_ENV_VAR,
};
use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::Manager;
use crate::command::Command;
use crate::error::{ManagerError, Result};
use crate::filter::Filter;
use crate::logging_cache::LoggingCache;

/// How long `close` waits after each termination signal.
pub const CLOSE_GRACE_PERIOD: Duration = Duration::from_secs(5);

struct Inner {
    id: String,
    procs: RwLock<HashMap<String, ProcessHandle>>,
    tracker: Option<Arc<dyn ProcessTracker>>,
    logging: Arc<LoggingCache>,
}

/// Manager that owns processes in a local map.
///
/// The map has its own lock, so every operation is safe to call
/// concurrently; compound sequences (create then list) are not atomic. Wrap
/// in [`super::SynchronizedManager`] when that matters.
#[derive(Clone)]
pub struct BasicManager {
    inner: Arc<Inner>,
}

impl BasicManager {
    /// A manager with a fresh ID. With `track_processes` every child is
    /// enrolled in a tracker that [`Manager::close`] tears down.
    pub fn new(track_processes: bool) -> Self {
        let id = Uuid::new_v4().to_string();
        let tracker = track_processes.then(|| new_tracker(&format!("jasper-{}", id)));
        Self::build(id, tracker)
    }

    /// A manager enrolling every child in `tracker`.
    pub fn with_tracker(tracker: Arc<dyn ProcessTracker>) -> Self {
        Self::build(Uuid::new_v4().to_string(), Some(tracker))
    }

    fn build(id: String, tracker: Option<Arc<dyn ProcessTracker>>) -> Self {
        debug!(manager = %id, tracked = tracker.is_some(), "Manager created");
        Self {
            inner: Arc::new(Inner {
                logging: Arc::new(LoggingCache::new(id.clone())),
                id,
                procs: RwLock::new(HashMap::new()),
                tracker,
            }),
        }
    }

    /// Cached loggers owned by this manager.
    pub fn logging_cache(&self) -> Arc<LoggingCache> {
        Arc::clone(&self.inner.logging)
    }

    /// Number of processes currently owned.
    pub fn len(&self) -> usize {
        self.inner.procs.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn snapshot(&self) -> Vec<ProcessHandle> {
        self.inner.procs.read().values().cloned().collect()
    }
}

impl Inner {
    fn create<'a>(
        self: &'a Arc<Self>,
        ctx: &'a CancellationToken,
        mut opts: CreateOptions,
    ) -> BoxFuture<'a, Result<ProcessHandle>> {
        Box::pin(async move {
            if ctx.is_cancelled() {
                return Err(ManagerError::Canceled);
            }
            opts.add_env_var(MANAGER_ENV_VAR, self.id.as_str());

            let mut triggers = Vec::new();
            if opts.has_follow_ups() {
                triggers.push(follow_up_trigger(Arc::downgrade(self), ctx.clone(), &opts));
            }
            let process = new_process_with_triggers(ctx, opts, triggers)?;

            if let Some(tracker) = &self.tracker {
                let pid = process.info(ctx).await.pid;
                if pid > 0 {
                    if let Err(e) = tracker.add(pid) {
                        warn!(manager = %self.id, id = process.id(), pid, error = %e, "Could not track process");
                    }
                }
            }

            self.insert(Arc::clone(&process))?;
            info!(manager = %self.id, id = process.id(), "Process created");
            Ok(process)
        })
    }

    fn insert(&self, process: ProcessHandle) -> Result<()> {
        let mut procs = self.procs.write();
        if procs.contains_key(process.id()) {
            return Err(ManagerError::InvalidInput(format!(
                "cannot register process '{}': id already exists",
                process.id()
            )));
        }
        procs.insert(process.id().to_string(), process);
        Ok(())
    }
}

/// Completion trigger that starts the follow-up processes matching how the
/// parent ended. Timeout takes precedence over failure.
fn follow_up_trigger(
    manager: Weak<Inner>,
    ctx: CancellationToken,
    opts: &CreateOptions,
) -> ProcessTrigger {
    let on_success = opts.on_success.clone();
    let on_failure = opts.on_failure.clone();
    let on_timeout = opts.on_timeout.clone();

    Box::new(move |info: &ProcessInfo| {
        let follow_ups = if info.timeout {
            on_timeout
        } else if info.successful {
            on_success
        } else {
            on_failure
        };
        if follow_ups.is_empty() {
            return;
        }
        let Some(manager) = manager.upgrade() else {
            return;
        };
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!(parent = %info.id, "No runtime available for follow-up processes");
            return;
        };

        let parent = info.id.clone();
        runtime.spawn(async move {
            for opts in follow_ups {
                match manager.create(&ctx, opts).await {
                    Ok(process) => debug!(%parent, id = process.id(), "Follow-up process started"),
                    Err(e) => warn!(%parent, error = %e, "Follow-up process failed to start"),
                }
            }
        });
    })
}

/// Returns whether the process finished within `grace`.
async fn wait_within(
    ctx: &CancellationToken,
    process: &ProcessHandle,
    grace: Duration,
) -> Result<bool> {
    match tokio::time::timeout(grace, process.wait(ctx)).await {
        Err(_) => Ok(false),
        Ok(Err(e)) if e.kind() == ErrorKind::Canceled => Err(ManagerError::Canceled),
        Ok(_) => Ok(true),
    }
}

/// Send `signal` unless the process already finished. Returns whether it was
/// still running.
async fn signal_live(ctx: &CancellationToken, process: &ProcessHandle, signal: Signal) -> Result<bool> {
    match process.signal(ctx, signal).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::PreconditionFailed => Ok(false),
        Err(e) => Err(e.into()),
    }
}

/// SIGTERM, then SIGKILL after the grace period.
async fn terminate(ctx: &CancellationToken, process: &ProcessHandle) -> Result<()> {
    if process.complete(ctx).await {
        return Ok(());
    }
    if !signal_live(ctx, process, Signal::Terminate).await? {
        return Ok(());
    }
    if wait_within(ctx, process, CLOSE_GRACE_PERIOD).await? {
        return Ok(());
    }

    warn!(id = process.id(), "Process ignored SIGTERM, killing");
    if !signal_live(ctx, process, Signal::Kill).await? {
        return Ok(());
    }
    if wait_within(ctx, process, CLOSE_GRACE_PERIOD).await? {
        return Ok(());
    }
    Err(ProcessError::TerminationFailed(format!("process '{}' did not exit", process.id())).into())
}

#[async_trait]
impl Manager for BasicManager {
    fn id(&self) -> &str {
        &self.inner.id
    }

    async fn create_process(
        &self,
        ctx: &CancellationToken,
        opts: CreateOptions,
    ) -> Result<ProcessHandle> {
        self.inner.create(ctx, opts).await
    }

    fn create_command(self: Arc<Self>) -> Command {
        Command::with_manager(self)
    }

    async fn register(&self, ctx: &CancellationToken, process: ProcessHandle) -> Result<()> {
        if ctx.is_cancelled() {
            return Err(ManagerError::PreconditionFailed(
                "cannot register process: context canceled".to_string(),
            ));
        }
        if process.id().is_empty() {
            return Err(ManagerError::InvalidInput(
                "cannot register process without an id".to_string(),
            ));
        }
        self.inner.insert(process)
    }

    async fn get(&self, _ctx: &CancellationToken, id: &str) -> Result<ProcessHandle> {
        self.inner
            .procs
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| ManagerError::NotFound(id.to_string()))
    }

    async fn list(&self, ctx: &CancellationToken, filter: Filter) -> Result<Vec<ProcessHandle>> {
        let mut matching = Vec::new();
        for process in self.snapshot() {
            let info = process.info(ctx).await;
            if ctx.is_cancelled() {
                return Err(ManagerError::Canceled);
            }
            if filter.matches(&info) {
                matching.push(process);
            }
        }
        Ok(matching)
    }

    async fn group(&self, ctx: &CancellationToken, tag: &str) -> Result<Vec<ProcessHandle>> {
        let mut tagged = Vec::new();
        for process in self.snapshot() {
            let tags = process.get_tags(ctx).await;
            if ctx.is_cancelled() {
                return Err(ManagerError::Canceled);
            }
            if tags.iter().any(|t| t == tag) {
                tagged.push(process);
            }
        }
        Ok(tagged)
    }

    async fn clear(&self, ctx: &CancellationToken) {
        let mut completed = Vec::new();
        for process in self.snapshot() {
            if process.complete(ctx).await {
                completed.push(process.id().to_string());
            }
        }

        let mut procs = self.inner.procs.write();
        for id in &completed {
            procs.remove(id);
        }
        debug!(manager = %self.inner.id, cleared = completed.len(), "Cleared completed processes");
    }

    async fn close(&self, ctx: &CancellationToken) -> Result<()> {
        if ctx.is_cancelled() {
            return Err(ManagerError::Canceled);
        }

        let mut errors = Vec::new();
        if let Some(tracker) = &self.inner.tracker {
            if let Err(e) = tracker.cleanup().await {
                errors.push(ManagerError::from(e));
            }
        }

        let procs = self.snapshot();
        let results = join_all(procs.iter().map(|process| terminate(ctx, process))).await;
        errors.extend(results.into_iter().filter_map(Result::err));

        if ctx.is_cancelled() {
            warn!(manager = %self.inner.id, "Close canceled before every process exited");
            return Err(ManagerError::Canceled);
        }

        self.inner.procs.write().clear();
        info!(manager = %self.inner.id, closed = procs.len(), errors = errors.len(), "Manager closed");
        ManagerError::from_many(errors)
    }
}
