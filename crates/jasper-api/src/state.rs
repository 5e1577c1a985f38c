//! Application state for the REST service

use std::sync::Arc;
use std::time::Instant;

use jasper_manager::{LoggingCache, ManagerHandle};
use tokio_util::sync::CancellationToken;

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    /// Manager every process route operates on
    pub manager: ManagerHandle,
    /// Loggers created through the `/logging` routes
    pub logging: Arc<LoggingCache>,
    /// Service lifetime token. Processes created over REST are bound to it
    /// rather than to the request that created them.
    pub root: CancellationToken,
    /// Server start time for uptime calculation
    pub start_time: Instant,
}

impl AppState {
    pub fn new(manager: ManagerHandle, logging: Arc<LoggingCache>, root: CancellationToken) -> Self {
        Self {
            manager,
            logging,
            root,
            start_time: Instant::now(),
        }
    }

    /// Get server uptime in seconds
    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Token for one request's blocking work. It ends with the service.
    pub fn request_ctx(&self) -> CancellationToken {
        self.root.child_token()
    }
}
