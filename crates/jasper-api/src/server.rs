//! REST service lifecycle

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use jasper_manager::LoggingCache;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{error::ApiResult, routes::router, state::AppState};

/// Where and how the REST service runs
#[derive(Debug, Clone)]
pub struct ServerOptions {
    pub host: String,
    pub port: u16,
    /// Cached loggers idle longer than this are pruned
    pub logging_cache_ttl: Duration,
    pub prune_interval: Duration,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 2287,
            logging_cache_ttl: Duration::from_secs(600),
            prune_interval: Duration::from_secs(60),
        }
    }
}

/// REST front over one manager. Serving ends when the state's root token
/// is cancelled; the manager is then closed.
pub struct ApiServer {
    state: AppState,
    options: ServerOptions,
}

impl ApiServer {
    pub fn new(state: AppState, options: ServerOptions) -> Self {
        Self { state, options }
    }

    /// Bind the configured address and serve.
    pub async fn serve(self) -> ApiResult<()> {
        let listener =
            TcpListener::bind((self.options.host.as_str(), self.options.port)).await?;
        self.serve_on(listener).await
    }

    /// Serve on an already bound listener.
    pub async fn serve_on(self, listener: TcpListener) -> ApiResult<()> {
        let addr = listener.local_addr()?;
        info!(%addr, manager = self.state.manager.id(), "REST service listening");

        let root = self.state.root.clone();
        let pruner = spawn_pruner(
            Arc::clone(&self.state.logging),
            self.options.logging_cache_ttl,
            self.options.prune_interval,
            root.clone(),
        );

        let shutdown = root.clone();
        axum::serve(listener, router(self.state.clone()))
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await?;

        root.cancel();
        pruner.abort();
        self.shutdown().await;
        Ok(())
    }

    async fn shutdown(&self) {
        let ctx = CancellationToken::new();
        if let Err(err) = self.state.manager.close(&ctx).await {
            warn!(error = %err, "Closing the manager failed");
        }
        if let Err(err) = self.state.logging.clear() {
            warn!(error = %err, "Closing cached loggers failed");
        }
        info!(manager = self.state.manager.id(), "REST service stopped");
    }
}

/// Drop cached loggers idle longer than `ttl`, every `interval`, until
/// `token` is cancelled.
pub fn spawn_pruner(
    logging: Arc<LoggingCache>,
    ttl: Duration,
    interval: Duration,
    token: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = ticker.tick() => {
                    let Ok(ttl) = chrono::Duration::from_std(ttl) else {
                        continue;
                    };
                    let removed = logging.prune(Utc::now() - ttl);
                    if removed > 0 {
                        debug!(removed, "Pruned idle cached loggers");
                    }
                }
            }
        }
    })
}
