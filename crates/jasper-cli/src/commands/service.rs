// Run the REST service until interrupted

use std::path::PathBuf;

use jasper_api::{ApiServer, AppState};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::Command;
use crate::config::{ServiceConfig, ServiceOverrides};
use crate::error::CliResult;
use crate::logging::init_logging;

/// `jasper service rest`
pub struct RestServiceCommand {
    config: Option<PathBuf>,
    overrides: ServiceOverrides,
}

impl RestServiceCommand {
    pub fn new(config: Option<PathBuf>) -> Self {
        Self {
            config,
            overrides: ServiceOverrides::default(),
        }
    }

    pub fn with_host(mut self, host: Option<String>) -> Self {
        self.overrides.host = host;
        self
    }

    pub fn with_port(mut self, port: Option<u16>) -> Self {
        self.overrides.rest_port = port;
        self
    }

    fn load_config(&self) -> CliResult<ServiceConfig> {
        ServiceConfig::load(self.config.as_deref(), &self.overrides)
    }
}

#[async_trait::async_trait]
impl Command for RestServiceCommand {
    async fn execute(&self) -> CliResult<()> {
        let config = self.load_config()?;
        init_logging(&config.log_level);

        let (manager, logging) = config.build_manager();
        let root = CancellationToken::new();

        let interrupt = root.clone();
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => info!("Interrupt received, shutting down"),
                Err(e) => warn!("Failed to listen for interrupts: {}", e),
            }
            interrupt.cancel();
        });

        let state = AppState::new(manager, logging, root);
        ApiServer::new(state, config.server_options()).serve().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[serial_test::serial]
    fn test_flags_override_config() {
        let cmd = RestServiceCommand::new(None)
            .with_host(Some("127.0.0.1".into()))
            .with_port(Some(9999));
        let config = cmd.load_config().unwrap();
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.server_options().port, 9999);
    }

    #[test]
    #[serial_test::serial]
    fn test_missing_config_file_fails() {
        let cmd = RestServiceCommand::new(Some(PathBuf::from("/nonexistent/jasper.toml")));
        assert!(cmd.load_config().is_err());
    }
}
