//! # jasper-process
//!
//! **Purpose**: Process lifecycle engine for Jasper
//!
//! Launches, supervises, signals, waits on and tags operating-system
//! processes behind one uniform [`Process`] contract.
//!
//! ## Features
//!
//! - **Create Options**: Validated process specifications with environment,
//!   working directory, timeout, stdin and follow-up processes
//! - **Output Plumbing**: Redirection/suppression rules and logger sinks
//!   (file, in-memory, tracing, inherit, Splunk, Sumo Logic)
//! - **Two Implementations**: [`BasicProcess`] (lock + background waiter) and
//!   [`BlockingProcess`] (single reactor task owning the child)
//! - **Triggers**: Completion and signal triggers, plus a named registry so
//!   remote callers can attach built-in signal triggers by id
//! - **Trackers**: cgroup or process-group containers that kill every
//!   descendant on cleanup
//!
//! ## Usage
//!
//! ```rust,no_run
//! use jasper_process::{new_process, CreateOptions, Process};
//! use tokio_util::sync::CancellationToken;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let ctx = CancellationToken::new();
//! let process = new_process(&ctx, CreateOptions::new(["echo", "hello"]))?;
//!
//! let exit_code = process.wait(&ctx).await?;
//! assert_eq!(exit_code, 0);
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod info;
pub mod mock;
pub mod options;
pub mod process;
pub mod registry;
pub mod signal;
pub mod sink;
mod spawn;
pub mod tracker;

pub use error::{ErrorKind, ProcessError, Result, TERMINATED_MESSAGE};
pub use info::ProcessInfo;
pub use mock::MockProcess;
pub use options::{
    CreateOptions, LoggerSpec, OutputOptions, OutputWriter, ProcessImplementation,
};
pub use process::{
    new_process, new_process_with_triggers, BasicProcess, BlockingProcess, Process, ProcessHandle,
    ProcessTrigger, SignalTrigger, SynchronizedProcess,
};
pub use registry::{get_signal_trigger_factory, register_signal_trigger_factory};
pub use signal::Signal;
pub use tracker::{new_tracker, ProcessTracker, ResourceLimits};

/// Environment variable carrying a process's own ID.
pub const PROCESS_ENV_VAR: &str = "JASPER_PROCESS_ENVIRON_ID";

/// Environment variable carrying the owning manager's ID.
pub const MANAGER_ENV_VAR: &str = "JASPER_MANAGER_ENVIRON_ID";
