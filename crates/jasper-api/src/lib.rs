//! Jasper REST API
//!
//! Serves any [`jasper_manager::Manager`] over HTTP under `/jasper/v1`, and
//! provides [`RestClient`], a manager implementation that talks to such a
//! service.

pub mod client;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod server;
pub mod state;

pub use client::{RemoteProcess, RestClient};
pub use error::{ApiError, ApiResult};
pub use routes::{router, API_PREFIX};
pub use server::{ApiServer, ServerOptions};
pub use state::AppState;
