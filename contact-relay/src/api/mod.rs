//! HTTP API: contact submission, push subscription and health endpoints.

pub mod error;
pub mod extract;
pub mod middleware;
pub mod models;
pub mod openapi;
pub mod routes;
pub mod server;

pub use server::{ApiServer, ApiServerConfig, AppState};
