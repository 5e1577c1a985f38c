//! Lock-serialized process adapter

use async_trait::async_trait;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use super::{Process, ProcessHandle, ProcessTrigger, SignalTrigger};
use crate::error::Result;
use crate::info::ProcessInfo;
use crate::signal::Signal;

/// Serializes access to another process: queries share a read lock,
/// mutations take the write lock. `wait` takes no lock so a waiter cannot
/// starve everyone else.
pub struct SynchronizedProcess {
    inner: ProcessHandle,
    lock: RwLock<()>,
}

impl SynchronizedProcess {
    pub fn new(inner: ProcessHandle) -> Self {
        Self {
            inner,
            lock: RwLock::new(()),
        }
    }

    /// The wrapped process
    pub fn inner(&self) -> &ProcessHandle {
        &self.inner
    }
}

#[async_trait]
impl Process for SynchronizedProcess {
    fn id(&self) -> &str {
        self.inner.id()
    }

    async fn info(&self, ctx: &CancellationToken) -> ProcessInfo {
        let _guard = self.lock.read().await;
        self.inner.info(ctx).await
    }

    async fn running(&self, ctx: &CancellationToken) -> bool {
        let _guard = self.lock.read().await;
        self.inner.running(ctx).await
    }

    async fn complete(&self, ctx: &CancellationToken) -> bool {
        let _guard = self.lock.read().await;
        self.inner.complete(ctx).await
    }

    async fn signal(&self, ctx: &CancellationToken, signal: Signal) -> Result<()> {
        let _guard = self.lock.write().await;
        self.inner.signal(ctx, signal).await
    }

    async fn wait(&self, ctx: &CancellationToken) -> Result<i32> {
        self.inner.wait(ctx).await
    }

    async fn respawn(&self, ctx: &CancellationToken) -> Result<ProcessHandle> {
        let _guard = self.lock.read().await;
        self.inner.respawn(ctx).await
    }

    async fn register_trigger(&self, ctx: &CancellationToken, trigger: ProcessTrigger) -> Result<()> {
        let _guard = self.lock.write().await;
        self.inner.register_trigger(ctx, trigger).await
    }

    async fn register_signal_trigger(
        &self,
        ctx: &CancellationToken,
        trigger: SignalTrigger,
    ) -> Result<()> {
        let _guard = self.lock.write().await;
        self.inner.register_signal_trigger(ctx, trigger).await
    }

    async fn register_signal_trigger_id(&self, ctx: &CancellationToken, id: &str) -> Result<()> {
        let _guard = self.lock.write().await;
        self.inner.register_signal_trigger_id(ctx, id).await
    }

    async fn tag(&self, ctx: &CancellationToken, tag: &str) {
        let _guard = self.lock.write().await;
        self.inner.tag(ctx, tag).await
    }

    async fn get_tags(&self, ctx: &CancellationToken) -> Vec<String> {
        let _guard = self.lock.read().await;
        self.inner.get_tags(ctx).await
    }

    async fn reset_tags(&self, ctx: &CancellationToken) {
        let _guard = self.lock.write().await;
        self.inner.reset_tags(ctx).await
    }
}
