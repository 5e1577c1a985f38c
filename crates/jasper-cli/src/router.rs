// Command routing and dispatch

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::commands::{ClientCommand, ClientOp, Command, RestServiceCommand};
use crate::error::CliResult;

/// Jasper - process management service
#[derive(Parser, Debug)]
#[command(name = "jasper")]
#[command(bin_name = "jasper")]
#[command(about = "Launch, supervise and signal processes locally or through a service")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Run a service front-end
    Service {
        #[command(subcommand)]
        service: ServiceKind,
    },

    /// Call a running service. Requests are read from stdin as JSON and
    /// responses written to stdout as JSON.
    Client {
        /// Service host
        #[arg(long, default_value = "localhost", global = true)]
        host: String,

        /// Service REST port
        #[arg(long, default_value_t = 2287, global = true)]
        port: u16,

        #[command(subcommand)]
        op: ClientOp,
    },
}

#[derive(Subcommand, Debug, Clone)]
pub enum ServiceKind {
    /// Serve the REST API
    Rest {
        /// Address to bind (overrides config)
        #[arg(long)]
        host: Option<String>,

        /// Port to bind (overrides config)
        #[arg(long)]
        port: Option<u16>,

        /// TOML configuration file
        #[arg(long, value_name = "PATH")]
        config: Option<PathBuf>,
    },
}

/// Route and execute commands
pub struct CommandRouter;

impl CommandRouter {
    /// Parse CLI arguments and route to the matching handler
    pub async fn route() -> CliResult<()> {
        let cli = Cli::parse();
        Self::execute(&cli).await
    }

    pub async fn execute(cli: &Cli) -> CliResult<()> {
        match &cli.command {
            Commands::Service {
                service: ServiceKind::Rest { host, port, config },
            } => {
                let cmd = RestServiceCommand::new(config.clone())
                    .with_host(host.clone())
                    .with_port(*port);
                cmd.execute().await
            }
            Commands::Client { host, port, op } => {
                let cmd = ClientCommand::new(format!("http://{}:{}", host, port), op.clone());
                cmd.execute().await
            }
        }
    }
}
