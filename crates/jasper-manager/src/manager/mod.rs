//! The manager contract and its local implementations

mod basic;
mod self_clearing;
mod synchronized;

use std::sync::Arc;

use async_trait::async_trait;
use jasper_process::{CreateOptions, ProcessHandle};
use tokio_util::sync::CancellationToken;

use crate::command::Command;
use crate::error::Result;
use crate::filter::Filter;

pub use basic::BasicManager;
pub use self_clearing::SelfClearingManager;
pub use synchronized::SynchronizedManager;

/// Shared handle to any manager implementation.
pub type ManagerHandle = Arc<dyn Manager>;

/// Registrar and owner of a set of processes.
///
/// A process returned by [`Manager::create_process`] or adopted through
/// [`Manager::register`] stays reachable by ID until [`Manager::clear`] runs
/// after it completes, or until [`Manager::close`].
#[async_trait]
pub trait Manager: Send + Sync {
    /// Stable identifier of this manager.
    fn id(&self) -> &str;

    /// Start a process and take ownership of it.
    async fn create_process(
        &self,
        ctx: &CancellationToken,
        opts: CreateOptions,
    ) -> Result<ProcessHandle>;

    /// Command builder whose steps run through this manager.
    fn create_command(self: Arc<Self>) -> Command;

    /// Adopt a process created elsewhere.
    async fn register(&self, ctx: &CancellationToken, process: ProcessHandle) -> Result<()>;

    /// Exact lookup by ID.
    async fn get(&self, ctx: &CancellationToken, id: &str) -> Result<ProcessHandle>;

    /// Every owned process passing `filter`.
    async fn list(&self, ctx: &CancellationToken, filter: Filter) -> Result<Vec<ProcessHandle>>;

    /// Every owned process carrying `tag`.
    async fn group(&self, ctx: &CancellationToken, tag: &str) -> Result<Vec<ProcessHandle>>;

    /// Forget every completed process. Running ones stay.
    async fn clear(&self, ctx: &CancellationToken);

    /// Terminate every surviving process and forget all of them.
    async fn close(&self, ctx: &CancellationToken) -> Result<()>;
}
