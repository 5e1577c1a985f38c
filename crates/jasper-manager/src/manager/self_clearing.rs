//! Manager wrapper bounding how many processes it holds

use std::sync::Arc;

use async_trait::async_trait;
use jasper_process::{CreateOptions, ProcessHandle};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::Manager;
use crate::command::Command;
use crate::error::{ManagerError, Result};
use crate::filter::Filter;

/// Holds at most `max_procs` processes. When full, a create or register
/// first clears completed processes; if that frees nothing it fails.
pub struct SelfClearingManager<M> {
    inner: M,
    max_procs: usize,
    admission: Mutex<()>,
}

impl<M: Manager> SelfClearingManager<M> {
    pub fn new(inner: M, max_procs: usize) -> Self {
        Self {
            inner,
            max_procs,
            admission: Mutex::new(()),
        }
    }

    pub fn inner(&self) -> &M {
        &self.inner
    }

    pub fn max_procs(&self) -> usize {
        self.max_procs
    }

    async fn make_room(&self, ctx: &CancellationToken) -> Result<()> {
        if self.inner.list(ctx, Filter::All).await?.len() < self.max_procs {
            return Ok(());
        }

        self.inner.clear(ctx).await;
        let held = self.inner.list(ctx, Filter::All).await?.len();
        if held < self.max_procs {
            debug!(manager = self.inner.id(), held, "Cleared completed processes to make room");
            return Ok(());
        }
        Err(ManagerError::PreconditionFailed(format!(
            "cannot exceed {} processes",
            self.max_procs
        )))
    }
}

#[async_trait]
impl<M: Manager + 'static> Manager for SelfClearingManager<M> {
    fn id(&self) -> &str {
        self.inner.id()
    }

    async fn create_process(
        &self,
        ctx: &CancellationToken,
        opts: CreateOptions,
    ) -> Result<ProcessHandle> {
        let _admission = self.admission.lock().await;
        self.make_room(ctx).await?;
        self.inner.create_process(ctx, opts).await
    }

    fn create_command(self: Arc<Self>) -> Command {
        Command::with_manager(self)
    }

    async fn register(&self, ctx: &CancellationToken, process: ProcessHandle) -> Result<()> {
        let _admission = self.admission.lock().await;
        self.make_room(ctx).await?;
        self.inner.register(ctx, process).await
    }

    async fn get(&self, ctx: &CancellationToken, id: &str) -> Result<ProcessHandle> {
        self.inner.get(ctx, id).await
    }

    async fn list(&self, ctx: &CancellationToken, filter: Filter) -> Result<Vec<ProcessHandle>> {
        self.inner.list(ctx, filter).await
    }

    async fn group(&self, ctx: &CancellationToken, tag: &str) -> Result<Vec<ProcessHandle>> {
        self.inner.group(ctx, tag).await
    }

    async fn clear(&self, ctx: &CancellationToken) {
        self.inner.clear(ctx).await
    }

    async fn close(&self, ctx: &CancellationToken) -> Result<()> {
        self.inner.close(ctx).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manager::BasicManager;
    use jasper_process::{ErrorKind, MockProcess};

    #[tokio::test]
    async fn test_full_manager_clears_completed_then_rejects() {
        let ctx = CancellationToken::new();
        let manager = SelfClearingManager::new(BasicManager::new(false), 2);

        let first = Arc::new(MockProcess::running());
        manager.register(&ctx, first.clone()).await.unwrap();
        manager
            .register(&ctx, MockProcess::running().into_handle())
            .await
            .unwrap();

        let err = manager
            .register(&ctx, MockProcess::running().into_handle())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PreconditionFailed);

        first.finish(0);
        manager
            .register(&ctx, MockProcess::running().into_handle())
            .await
            .unwrap();
        assert_eq!(manager.list(&ctx, Filter::All).await.unwrap().len(), 2);
        assert_eq!(manager.list(&ctx, Filter::Running).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_clear_and_close_reach_inner() {
        let ctx = CancellationToken::new();
        let basic = BasicManager::new(false);
        let manager = SelfClearingManager::new(basic.clone(), 4);

        let done = Arc::new(MockProcess::running());
        manager.register(&ctx, done.clone()).await.unwrap();
        done.finish(1);

        manager.clear(&ctx).await;
        assert!(basic.is_empty());
        manager.close(&ctx).await.unwrap();
        manager.close(&ctx).await.unwrap();
    }
}
