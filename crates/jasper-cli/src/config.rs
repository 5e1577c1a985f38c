//! Service configuration
//!
//! Sources in increasing precedence: built-in defaults, an optional TOML
//! file, `JASPER_*` environment variables, command-line flags.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use config::{Config, Environment, File};
use jasper_api::ServerOptions;
use jasper_manager::{BasicManager, LoggingCache, ManagerHandle, SelfClearingManager};
use serde::{Deserialize, Serialize};

use crate::error::CliResult;

/// Prefix of environment variables read by [`ServiceConfig::load`].
pub const ENV_PREFIX: &str = "JASPER";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub host: String,
    pub rest_port: u16,
    /// Reserved for the binary RPC front.
    pub rpc_port: u16,
    pub track_processes: bool,
    /// Bound the manager to this many processes
    pub max_processes: Option<usize>,
    pub logging_cache_ttl_secs: u64,
    pub prune_interval_secs: u64,
    pub log_level: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            rest_port: 2287,
            rpc_port: 2286,
            track_processes: true,
            max_processes: None,
            logging_cache_ttl_secs: 600,
            prune_interval_secs: 60,
            log_level: "info".to_string(),
        }
    }
}

/// Values given on the command line. Unset flags leave lower layers alone.
#[derive(Debug, Clone, Default)]
pub struct ServiceOverrides {
    pub host: Option<String>,
    pub rest_port: Option<u16>,
}

impl ServiceConfig {
    /// Layer the configuration sources. A config file named explicitly must
    /// exist.
    pub fn load(path: Option<&Path>, overrides: &ServiceOverrides) -> CliResult<Self> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(true));
        }
        builder = builder
            .add_source(Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .set_override_option("host", overrides.host.clone())?
            .set_override_option("rest_port", overrides.rest_port.map(i64::from))?;

        let config: ServiceConfig = builder.build()?.try_deserialize()?;
        Ok(config)
    }

    pub fn server_options(&self) -> ServerOptions {
        ServerOptions {
            host: self.host.clone(),
            port: self.rest_port,
            logging_cache_ttl: Duration::from_secs(self.logging_cache_ttl_secs),
            prune_interval: Duration::from_secs(self.prune_interval_secs.max(1)),
        }
    }

    /// The manager the service fronts, plus its logging cache.
    pub fn build_manager(&self) -> (ManagerHandle, Arc<LoggingCache>) {
        let basic = BasicManager::new(self.track_processes);
        let logging = basic.logging_cache();
        let manager: ManagerHandle = match self.max_processes {
            Some(max) => Arc::new(SelfClearingManager::new(basic, max)),
            None => Arc::new(basic),
        };
        (manager, logging)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jasper_manager::Manager;
    use serial_test::serial;
    use std::io::Write;

    #[test]
    #[serial]
    fn test_defaults() {
        let config = ServiceConfig::load(None, &ServiceOverrides::default()).unwrap();
        assert_eq!(config, ServiceConfig::default());
        assert_eq!(config.server_options().port, 2287);
    }

    #[test]
    #[serial]
    fn test_file_env_and_flag_precedence() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "host = \"0.0.0.0\"\nrest_port = 3000\nmax_processes = 8\nlog_level = \"debug\""
        )
        .unwrap();

        std::env::set_var("JASPER_REST_PORT", "4000");
        std::env::set_var("JASPER_TRACK_PROCESSES", "false");
        let config = ServiceConfig::load(
            Some(file.path()),
            &ServiceOverrides {
                host: Some("127.0.0.1".into()),
                rest_port: None,
            },
        );
        std::env::remove_var("JASPER_REST_PORT");
        std::env::remove_var("JASPER_TRACK_PROCESSES");

        let config = config.unwrap();
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.rest_port, 4000);
        assert!(!config.track_processes);
        assert_eq!(config.max_processes, Some(8));
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.rpc_port, 2286);

        let config = ServiceConfig::load(
            Some(file.path()),
            &ServiceOverrides {
                host: None,
                rest_port: Some(5000),
            },
        )
        .unwrap();
        assert_eq!(config.rest_port, 5000);
    }

    #[test]
    #[serial]
    fn test_missing_named_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent.toml");
        assert!(ServiceConfig::load(Some(&missing), &ServiceOverrides::default()).is_err());
    }

    #[test]
    fn test_self_clearing_manager_when_bounded() {
        let config = ServiceConfig {
            max_processes: Some(2),
            track_processes: false,
            ..Default::default()
        };
        let (manager, logging) = config.build_manager();
        assert!(!manager.id().is_empty());
        assert!(logging.is_empty());
    }
}
