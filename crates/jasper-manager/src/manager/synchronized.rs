//! Manager wrapper serializing mutations behind one lock

use std::sync::Arc;

use async_trait::async_trait;
use jasper_process::{CreateOptions, ProcessHandle};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use super::Manager;
use crate::command::Command;
use crate::error::Result;
use crate::filter::Filter;

/// Runs reads of the wrapped manager under a shared lock and mutations
/// (create, register, clear, close) under an exclusive one.
pub struct SynchronizedManager<M> {
    inner: M,
    lock: RwLock<()>,
}

impl<M: Manager> SynchronizedManager<M> {
    pub fn new(inner: M) -> Self {
        Self {
            inner,
            lock: RwLock::new(()),
        }
    }

    /// The wrapped manager
    pub fn inner(&self) -> &M {
        &self.inner
    }
}

#[async_trait]
impl<M: Manager + 'static> Manager for SynchronizedManager<M> {
    fn id(&self) -> &str {
        self.inner.id()
    }

    async fn create_process(
        &self,
        ctx: &CancellationToken,
        opts: CreateOptions,
    ) -> Result<ProcessHandle> {
        let _guard = self.lock.write().await;
        self.inner.create_process(ctx, opts).await
    }

    fn create_command(self: Arc<Self>) -> Command {
        Command::with_manager(self)
    }

    async fn register(&self, ctx: &CancellationToken, process: ProcessHandle) -> Result<()> {
        let _guard = self.lock.write().await;
        self.inner.register(ctx, process).await
    }

    async fn get(&self, ctx: &CancellationToken, id: &str) -> Result<ProcessHandle> {
        let _guard = self.lock.read().await;
        self.inner.get(ctx, id).await
    }

    async fn list(&self, ctx: &CancellationToken, filter: Filter) -> Result<Vec<ProcessHandle>> {
        let _guard = self.lock.read().await;
        self.inner.list(ctx, filter).await
    }

    async fn group(&self, ctx: &CancellationToken, tag: &str) -> Result<Vec<ProcessHandle>> {
        let _guard = self.lock.read().await;
        self.inner.group(ctx, tag).await
    }

    async fn clear(&self, ctx: &CancellationToken) {
        let _guard = self.lock.write().await;
        self.inner.clear(ctx).await
    }

    async fn close(&self, ctx: &CancellationToken) -> Result<()> {
        let _guard = self.lock.write().await;
        self.inner.close(ctx).await
    }
}
