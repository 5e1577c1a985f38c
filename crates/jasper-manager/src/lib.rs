//! # jasper-manager
//!
//! **Purpose**: Ownership and bookkeeping for sets of Jasper processes
//!
//! ## Features
//!
//! - **Managers**: [`BasicManager`] owns a map of processes; the
//!   [`SynchronizedManager`] and [`SelfClearingManager`] wrappers add a global
//!   lock and a capacity bound
//! - **Filters and groups**: list processes by state or by tag
//! - **Teardown**: `close` drains the tracker and escalates SIGTERM to SIGKILL
//! - **Command builder**: sequential or parallel command runs with shared
//!   options, error policies and hooks
//! - **Logging cache**: named loggers kept alive between remote calls
//!
//! ## Usage
//!
//! ```rust,no_run
//! use jasper_manager::{BasicManager, Filter, Manager};
//! use jasper_process::{CreateOptions, Process};
//! use tokio_util::sync::CancellationToken;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let ctx = CancellationToken::new();
//! let manager = BasicManager::new(true);
//!
//! let process = manager
//!     .create_process(&ctx, CreateOptions::new(["sleep", "1"]).tag("batch"))
//!     .await?;
//! assert_eq!(manager.group(&ctx, "batch").await?.len(), 1);
//!
//! process.wait(&ctx).await?;
//! assert!(manager.list(&ctx, Filter::Running).await?.is_empty());
//! manager.close(&ctx).await?;
//! # Ok(())
//! # }
//! ```

pub mod command;
pub mod error;
pub mod filter;
pub mod logging_cache;
pub mod manager;

pub use command::Command;
pub use error::{ManagerError, Result};
pub use filter::Filter;
pub use logging_cache::{CachedLogger, CachedLoggerInfo, LoggingCache, LoggingPayload};
pub use manager::{BasicManager, Manager, ManagerHandle, SelfClearingManager, SynchronizedManager};
