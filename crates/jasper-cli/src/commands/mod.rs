// Command handlers for the jasper binary

pub mod client;
pub mod service;

pub use client::{ClientCommand, ClientOp, ClientResponse};
pub use service::RestServiceCommand;

use crate::error::CliResult;

/// Trait for command handlers
#[async_trait::async_trait]
pub trait Command: Send + Sync {
    /// Execute the command
    async fn execute(&self) -> CliResult<()>;
}
