//! Builder for running a sequence of commands through a manager
//!
//! A [`Command`] holds a list of argument vectors and one template of
//! process options. Running it creates one process per argument vector,
//! either one after another ([`Command::run`]) or all at once
//! ([`Command::run_parallel`]). Sinks handed to the builder are closed when
//! the run ends, whatever its outcome.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use jasper_process::options::Closers;
use jasper_process::sink::LogSink;
use jasper_process::{
    CreateOptions, LoggerSpec, ProcessHandle, ProcessImplementation, ProcessInfo,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, Level};

use crate::error::{ManagerError, Result};
use crate::manager::{BasicManager, Manager, ManagerHandle};

/// Check run before anything starts; `false` skips the whole command.
pub type Prerequisite = Box<dyn Fn() -> bool + Send + Sync>;

/// Called with each step's options just before the step starts.
pub type PreHook = Box<dyn Fn(&CreateOptions) + Send + Sync>;

/// Called with each step's outcome; its return value replaces the outcome.
pub type PostHook = Box<dyn Fn(Result<()>) -> Result<()> + Send + Sync>;

/// Sequence of commands sharing one set of options.
pub struct Command {
    cmds: Vec<Vec<String>>,
    opts: CreateOptions,
    remote_host: Option<String>,
    priority: Level,
    id: Option<String>,
    continue_on_error: bool,
    stop_on_error: bool,
    ignore_error: bool,
    background: bool,
    prerequisite: Option<Prerequisite>,
    pre_hook: Option<PreHook>,
    post_hook: Option<PostHook>,
    closers: Closers,
    manager: ManagerHandle,
    procs: Vec<ProcessHandle>,
}

impl Default for Command {
    fn default() -> Self {
        Self::new()
    }
}

impl Command {
    /// A builder backed by its own untracked manager.
    pub fn new() -> Self {
        Self::with_manager(Arc::new(BasicManager::new(false)))
    }

    /// A builder whose processes are created by `manager`.
    pub fn with_manager(manager: ManagerHandle) -> Self {
        Self {
            cmds: Vec::new(),
            opts: CreateOptions::default(),
            remote_host: None,
            priority: Level::INFO,
            id: None,
            continue_on_error: false,
            stop_on_error: false,
            ignore_error: false,
            background: false,
            prerequisite: None,
            pre_hook: None,
            post_hook: None,
            closers: Closers::default(),
            manager,
            procs: Vec::new(),
        }
    }

    /// Add a step from a whitespace-separated command line.
    pub fn append(mut self, command_line: &str) -> Self {
        let args: Vec<String> = command_line.split_whitespace().map(str::to_string).collect();
        if !args.is_empty() {
            self.cmds.push(args);
        }
        self
    }

    /// Add a step from an argument vector.
    pub fn extend<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.cmds.push(args.into_iter().map(Into::into).collect());
        self
    }

    pub fn directory(mut self, dir: impl Into<PathBuf>) -> Self {
        self.opts.working_directory = Some(dir.into());
        self
    }

    pub fn environment(mut self, env: HashMap<String, String>) -> Self {
        self.opts.environment = env;
        self
    }

    pub fn add_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.opts.add_env_var(key, value);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.opts.timeout = timeout;
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.opts.tags.push(tag.into());
        self
    }

    pub fn implementation(mut self, implementation: ProcessImplementation) -> Self {
        self.opts.implementation = implementation;
        self
    }

    pub fn standard_input(mut self, bytes: impl Into<Vec<u8>>) -> Self {
        self.opts.standard_input_bytes = Some(bytes.into());
        self
    }

    /// Run every step on `host` over ssh.
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.remote_host = Some(host.into());
        self
    }

    /// Level at which steps are logged.
    pub fn priority(mut self, level: Level) -> Self {
        self.priority = level;
        self
    }

    /// Identifier added as a tag to every step.
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Keep going after a failed step; failures are still reported.
    pub fn continue_on_error(mut self, value: bool) -> Self {
        self.continue_on_error = value;
        self
    }

    /// Abort on the first failed step, even with `continue_on_error`.
    pub fn stop_on_error(mut self, value: bool) -> Self {
        self.stop_on_error = value;
        self
    }

    /// Drop step failures from the outcome.
    pub fn ignore_error(mut self, value: bool) -> Self {
        self.ignore_error = value;
        self
    }

    /// Start steps without waiting for them.
    pub fn background(mut self, value: bool) -> Self {
        self.background = value;
        self
    }

    pub fn prerequisite<F>(mut self, check: F) -> Self
    where
        F: Fn() -> bool + Send + Sync + 'static,
    {
        self.prerequisite = Some(Box::new(check));
        self
    }

    pub fn pre_hook<F>(mut self, hook: F) -> Self
    where
        F: Fn(&CreateOptions) + Send + Sync + 'static,
    {
        self.pre_hook = Some(Box::new(hook));
        self
    }

    pub fn post_hook<F>(mut self, hook: F) -> Self
    where
        F: Fn(Result<()>) -> Result<()> + Send + Sync + 'static,
    {
        self.post_hook = Some(Box::new(hook));
        self
    }

    pub fn suppress_output(mut self, value: bool) -> Self {
        self.opts.output.suppress_output = value;
        self
    }

    pub fn suppress_error(mut self, value: bool) -> Self {
        self.opts.output.suppress_error = value;
        self
    }

    fn close_on_finish(&self, sink: &Arc<dyn LogSink>) {
        let sink = Arc::clone(sink);
        self.closers.push(Box::new(move || sink.close()));
    }

    /// Send stdout of every step to `sink`.
    pub fn set_output_sink(mut self, sink: Arc<dyn LogSink>) -> Self {
        self.close_on_finish(&sink);
        self.opts.output.output = Some(sink);
        self
    }

    /// Send stderr of every step to `sink`.
    pub fn set_error_sink(mut self, sink: Arc<dyn LogSink>) -> Self {
        self.close_on_finish(&sink);
        self.opts.output.error = Some(sink);
        self
    }

    /// Send both streams of every step to `sink`.
    pub fn set_combined_sink(mut self, sink: Arc<dyn LogSink>) -> Self {
        self.close_on_finish(&sink);
        self.opts.output.output = Some(sink);
        self.opts.output.error = None;
        self.opts.output.send_error_to_output = true;
        self
    }

    /// Send stdout of every step to the logger described by `spec`.
    pub fn set_output_logger(self, spec: &LoggerSpec) -> Result<Self> {
        let sink = spec.configure()?;
        Ok(self.set_output_sink(sink))
    }

    /// Send stderr of every step to the logger described by `spec`.
    pub fn set_error_logger(self, spec: &LoggerSpec) -> Result<Self> {
        let sink = spec.configure()?;
        Ok(self.set_error_sink(sink))
    }

    /// Processes started so far, in order.
    pub fn processes(&self) -> &[ProcessHandle] {
        &self.procs
    }

    /// Snapshot of every process started so far.
    pub async fn export(&self, ctx: &CancellationToken) -> Vec<ProcessInfo> {
        let mut infos = Vec::with_capacity(self.procs.len());
        for process in &self.procs {
            infos.push(process.info(ctx).await);
        }
        infos
    }

    fn step_options(&self, args: &[String]) -> CreateOptions {
        let mut opts = self.opts.clone();
        opts.output = self.opts.output.detached();
        opts.args = match &self.remote_host {
            Some(host) => ["ssh".to_string(), host.clone()]
                .into_iter()
                .chain(args.iter().cloned())
                .collect(),
            None => args.to_vec(),
        };
        if let Some(id) = &self.id {
            if !opts.tags.contains(id) {
                opts.tags.push(id.clone());
            }
        }
        opts
    }

    fn log_step(&self, args: &[String]) {
        let command = args.join(" ");
        let id = self.id.as_deref().unwrap_or_default();
        let level = self.priority;
        if level == Level::ERROR {
            tracing::error!(id, %command, "Running command");
        } else if level == Level::WARN {
            tracing::warn!(id, %command, "Running command");
        } else if level == Level::INFO {
            tracing::info!(id, %command, "Running command");
        } else if level == Level::DEBUG {
            tracing::debug!(id, %command, "Running command");
        } else {
            tracing::trace!(id, %command, "Running command");
        }
    }

    fn should_run(&self) -> bool {
        match &self.prerequisite {
            Some(check) => check(),
            None => true,
        }
    }

    fn finish_step(&self, outcome: Result<()>) -> Result<()> {
        let outcome = match &self.post_hook {
            Some(hook) => hook(outcome),
            None => outcome,
        };
        match outcome {
            Err(e) if self.ignore_error => {
                debug!(id = self.id.as_deref().unwrap_or_default(), error = %e, "Ignoring failed step");
                Ok(())
            }
            outcome => outcome,
        }
    }

    async fn start(
        manager: &ManagerHandle,
        ctx: &CancellationToken,
        opts: CreateOptions,
        background: bool,
    ) -> (Option<ProcessHandle>, Result<()>) {
        let process = match manager.create_process(ctx, opts).await {
            Ok(process) => process,
            Err(e) => return (None, Err(e)),
        };
        if background {
            return (Some(process), Ok(()));
        }
        let outcome = process.wait(ctx).await.map(drop).map_err(ManagerError::from);
        (Some(process), outcome)
    }

    /// Run every step in order. Registered sinks are closed afterwards.
    pub async fn run(&mut self, ctx: &CancellationToken) -> Result<()> {
        if !self.should_run() {
            debug!(id = self.id.as_deref().unwrap_or_default(), "Prerequisite failed, skipping command");
            return Ok(());
        }

        let mut errors = Vec::new();
        for args in self.cmds.clone() {
            let opts = self.step_options(&args);
            if let Some(hook) = &self.pre_hook {
                hook(&opts);
            }
            self.log_step(&opts.args);

            let (process, outcome) = Self::start(&self.manager, ctx, opts, self.background).await;
            self.procs.extend(process);

            if let Err(e) = self.finish_step(outcome) {
                errors.push(e);
                if self.stop_on_error || !self.continue_on_error {
                    break;
                }
            }
        }

        self.finish(errors)
    }

    /// Run every step concurrently. Failures are aggregated.
    pub async fn run_parallel(&mut self, ctx: &CancellationToken) -> Result<()> {
        if !self.should_run() {
            return Ok(());
        }

        let steps: Vec<CreateOptions> = self
            .cmds
            .iter()
            .map(|args| self.step_options(args))
            .collect();
        for opts in &steps {
            if let Some(hook) = &self.pre_hook {
                hook(opts);
            }
            self.log_step(&opts.args);
        }

        let manager = Arc::clone(&self.manager);
        let background = self.background;
        let outcomes = join_all(
            steps
                .into_iter()
                .map(|opts| Self::start(&manager, ctx, opts, background)),
        )
        .await;

        let mut errors = Vec::new();
        for (process, outcome) in outcomes {
            self.procs.extend(process);
            if let Err(e) = self.finish_step(outcome) {
                errors.push(e);
            }
        }

        self.finish(errors)
    }

    fn finish(&self, mut errors: Vec<ManagerError>) -> Result<()> {
        if let Err(e) = self.closers.close() {
            errors.push(e.into());
        }
        ManagerError::from_many(errors)
    }

    /// Wait for every started process, for commands run in the background.
    pub async fn wait(&self, ctx: &CancellationToken) -> Result<()> {
        let mut errors = Vec::new();
        for process in &self.procs {
            if let Err(e) = process.wait(ctx).await {
                errors.push(e.into());
            }
        }
        ManagerError::from_many(errors)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use jasper_process::sink::InMemorySink;
    use jasper_process::ErrorKind;
    use parking_lot::Mutex;

    #[tokio::test]
    async fn test_sequential_steps_share_output_sink() {
        let ctx = CancellationToken::new();
        let sink = Arc::new(InMemorySink::new(10));
        let mut cmd = Command::new()
            .append("echo one")
            .extend(["sh", "-c", "echo two"])
            .set_output_sink(sink.clone());

        cmd.run(&ctx).await.unwrap();
        assert_eq!(sink.recent_lines(10).unwrap(), vec!["one", "two"]);
        assert_eq!(cmd.export(&ctx).await.len(), 2);
    }

    #[tokio::test]
    async fn test_failure_stops_sequence_by_default() {
        let ctx = CancellationToken::new();
        let mut cmd = Command::new().append("false").append("true");
        let err = cmd.run(&ctx).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ExitFailure);
        assert_eq!(cmd.processes().len(), 1);
    }

    #[tokio::test]
    async fn test_continue_and_stop_on_error() {
        let ctx = CancellationToken::new();
        let mut cmd = Command::new()
            .append("false")
            .append("false")
            .append("true")
            .continue_on_error(true);
        let err = cmd.run(&ctx).await.unwrap_err();
        assert!(matches!(err, ManagerError::Aggregate(ref errors) if errors.len() == 2));
        assert_eq!(cmd.processes().len(), 3);

        let mut cmd = Command::new()
            .append("false")
            .append("true")
            .continue_on_error(true)
            .stop_on_error(true);
        assert!(cmd.run(&ctx).await.is_err());
        assert_eq!(cmd.processes().len(), 1);
    }

    #[tokio::test]
    async fn test_ignore_error_drops_failures() {
        let ctx = CancellationToken::new();
        let mut cmd = Command::new().append("false").append("true").ignore_error(true);
        cmd.run(&ctx).await.unwrap();
        assert_eq!(cmd.processes().len(), 2);
    }

    #[tokio::test]
    async fn test_prerequisite_skips_everything() {
        let ctx = CancellationToken::new();
        let mut cmd = Command::new().append("false").prerequisite(|| false);
        cmd.run(&ctx).await.unwrap();
        assert!(cmd.processes().is_empty());
    }

    #[tokio::test]
    async fn test_hooks_see_every_step() {
        let ctx = CancellationToken::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let recorded = Arc::clone(&seen);

        let mut cmd = Command::new()
            .append("true")
            .append("false")
            .id("job")
            .continue_on_error(true)
            .pre_hook(move |opts| recorded.lock().push(opts.tags.clone()))
            .post_hook(|outcome| outcome.or(Ok(())));

        cmd.run(&ctx).await.unwrap();
        assert_eq!(*seen.lock(), vec![vec!["job".to_string()]; 2]);
    }

    #[tokio::test]
    async fn test_parallel_aggregates_failures() {
        let ctx = CancellationToken::new();
        let mut cmd = Command::new()
            .append("sleep 1")
            .append("false")
            .append("true");

        let started = std::time::Instant::now();
        let err = cmd.run_parallel(&ctx).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ExitFailure);
        assert_eq!(cmd.processes().len(), 3);
        assert!(started.elapsed() < Duration::from_secs(3));
    }

    #[tokio::test]
    async fn test_background_returns_before_completion() {
        let ctx = CancellationToken::new();
        let mut cmd = Command::new().append("sleep 1").background(true);
        cmd.run(&ctx).await.unwrap();
        assert!(cmd.processes()[0].running(&ctx).await);
        cmd.wait(&ctx).await.unwrap();
    }

    #[tokio::test]
    async fn test_remote_host_prefixes_ssh() {
        let ctx = CancellationToken::new();
        let args = Arc::new(Mutex::new(Vec::new()));
        let recorded = Arc::clone(&args);

        // the step itself fails without a reachable host; only the argv matters
        let mut cmd = Command::new()
            .append("uptime")
            .host("build-host")
            .timeout(Duration::from_secs(5))
            .ignore_error(true)
            .pre_hook(move |opts| *recorded.lock() = opts.args.clone());
        cmd.run(&ctx).await.unwrap();
        assert_eq!(*args.lock(), vec!["ssh", "build-host", "uptime"]);
    }
}
