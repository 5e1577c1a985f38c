//! Named, long-lived loggers that remote callers write to
//!
//! A cached logger is an [`OutputOptions`] with its writers already
//! configured. Entries record when they were last used so the service can
//! prune idle ones.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use jasper_process::{OutputOptions, OutputWriter};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{ManagerError, Result};

/// A batch of messages for a cached logger.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingPayload {
    pub data: Vec<String>,
    #[serde(default)]
    pub prefer_send_to_error: bool,
    #[serde(default)]
    pub add_metadata: bool,
}

/// Serializable view of a cached logger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedLoggerInfo {
    pub id: String,
    pub manager_id: String,
    pub accessed: DateTime<Utc>,
    pub options: OutputOptions,
}

/// A logger kept alive between requests.
#[derive(Debug)]
pub struct CachedLogger {
    id: String,
    manager_id: String,
    accessed: Mutex<DateTime<Utc>>,
    options: OutputOptions,
    output: OutputWriter,
    error: OutputWriter,
}

impl CachedLogger {
    /// Validate `options` and configure its writers.
    pub fn new(
        id: impl Into<String>,
        manager_id: impl Into<String>,
        options: OutputOptions,
    ) -> Result<Self> {
        options.validate()?;
        let output = options.get_output();
        let error = options.get_error();
        Ok(Self {
            id: id.into(),
            manager_id: manager_id.into(),
            accessed: Mutex::new(Utc::now()),
            options,
            output,
            error,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn manager_id(&self) -> &str {
        &self.manager_id
    }

    pub fn options(&self) -> &OutputOptions {
        &self.options
    }

    /// Last time the logger was looked up or written to.
    pub fn accessed(&self) -> DateTime<Utc> {
        *self.accessed.lock()
    }

    fn touch(&self) {
        *self.accessed.lock() = Utc::now();
    }

    pub fn info(&self) -> CachedLoggerInfo {
        CachedLoggerInfo {
            id: self.id.clone(),
            manager_id: self.manager_id.clone(),
            accessed: self.accessed(),
            options: self.options.clone(),
        }
    }

    /// Write every message in `payload` as one line.
    pub fn send(&self, payload: &LoggingPayload) -> Result<()> {
        self.touch();
        let writer = if payload.prefer_send_to_error {
            &self.error
        } else {
            &self.output
        };

        for message in &payload.data {
            let line = if payload.add_metadata {
                format!(
                    "[{}] [{}/{}] {}\n",
                    Utc::now().to_rfc3339(),
                    self.manager_id,
                    self.id,
                    message
                )
            } else {
                format!("{}\n", message)
            };
            writer
                .write(line.as_bytes())
                .map_err(|e| ManagerError::Process(e.into()))?;
        }
        writer.flush().map_err(|e| ManagerError::Process(e.into()))
    }

    /// Close the configured sinks.
    pub fn close(&self) -> Result<()> {
        Ok(self.options.close()?)
    }
}

/// Registry of cached loggers for one manager.
#[derive(Debug)]
pub struct LoggingCache {
    manager_id: String,
    loggers: RwLock<HashMap<String, Arc<CachedLogger>>>,
}

impl LoggingCache {
    pub fn new(manager_id: impl Into<String>) -> Self {
        Self {
            manager_id: manager_id.into(),
            loggers: RwLock::new(HashMap::new()),
        }
    }

    /// Configure a logger from `options` and cache it under `id`.
    pub fn create(&self, id: &str, options: OutputOptions) -> Result<Arc<CachedLogger>> {
        if id.is_empty() {
            return Err(ManagerError::InvalidInput(
                "cached logger must have an id".to_string(),
            ));
        }
        if self.loggers.read().contains_key(id) {
            return Err(ManagerError::InvalidInput(format!(
                "logger named '{}' already exists",
                id
            )));
        }

        let logger = Arc::new(CachedLogger::new(id, &self.manager_id, options)?);
        self.put(Arc::clone(&logger))?;
        debug!(id, manager = %self.manager_id, "Cached logger created");
        Ok(logger)
    }

    /// Add an already configured logger.
    pub fn put(&self, logger: Arc<CachedLogger>) -> Result<()> {
        let mut loggers = self.loggers.write();
        if loggers.contains_key(logger.id()) {
            return Err(ManagerError::InvalidInput(format!(
                "logger named '{}' already exists",
                logger.id()
            )));
        }
        loggers.insert(logger.id().to_string(), logger);
        Ok(())
    }

    /// Look up a logger and mark it used.
    pub fn get(&self, id: &str) -> Option<Arc<CachedLogger>> {
        let loggers = self.loggers.read();
        let logger = loggers.get(id)?;
        logger.touch();
        Some(Arc::clone(logger))
    }

    /// Drop a logger, closing its sinks. Returns whether it existed.
    pub fn remove(&self, id: &str) -> bool {
        let Some(logger) = self.loggers.write().remove(id) else {
            return false;
        };
        if let Err(e) = logger.close() {
            warn!(id, error = %e, "Closing cached logger failed");
        }
        true
    }

    /// Remove every logger not used since `before`. Returns how many went.
    pub fn prune(&self, before: DateTime<Utc>) -> usize {
        let stale: Vec<Arc<CachedLogger>> = {
            let mut loggers = self.loggers.write();
            let ids: Vec<String> = loggers
                .values()
                .filter(|logger| logger.accessed() < before)
                .map(|logger| logger.id().to_string())
                .collect();
            ids.iter().filter_map(|id| loggers.remove(id)).collect()
        };

        for logger in &stale {
            if let Err(e) = logger.close() {
                warn!(id = logger.id(), error = %e, "Closing pruned logger failed");
            }
        }
        if !stale.is_empty() {
            debug!(count = stale.len(), manager = %self.manager_id, "Pruned cached loggers");
        }
        stale.len()
    }

    pub fn len(&self) -> usize {
        self.loggers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.loggers.read().is_empty()
    }

    /// Remove and close every logger.
    pub fn clear(&self) -> Result<()> {
        let loggers: Vec<Arc<CachedLogger>> =
            self.loggers.write().drain().map(|(_, logger)| logger).collect();
        let errors = loggers.iter().filter_map(|logger| logger.close().err()).collect();
        ManagerError::from_many(errors)
    }
}
