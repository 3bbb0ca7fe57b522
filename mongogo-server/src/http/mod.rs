//! HTTP listener
//!
//! Axum server with request tracing and graceful shutdown. No application
//! routes are mounted.

pub mod server;

pub use server::{build_router, run_server, ServerConfig, ServerError};
