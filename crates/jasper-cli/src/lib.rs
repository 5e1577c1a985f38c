//! The `jasper` command line: `jasper service rest` runs the REST service,
//! `jasper client <op>` calls one from scripts.

pub mod commands;
pub mod config;
pub mod error;
pub mod logging;
pub mod router;

pub use config::{ServiceConfig, ServiceOverrides};
pub use error::{CliError, CliResult};
pub use logging::init_logging;
pub use router::{Cli, CommandRouter, Commands};
