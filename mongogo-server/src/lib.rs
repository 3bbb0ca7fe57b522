//! mongogo-server: MongoDB bootstrap, user persistence and HTTP listener
//!
//! Startup order is fixed: [`db::bootstrap`] produces a [`db::Database`],
//! the user repository works against it, and [`db::Database::shutdown`]
//! releases it once the HTTP listener has stopped.

pub mod db;
pub mod http;

pub use db::{bootstrap, BootstrapOptions, Database, StoreError, UserRepo};
pub use http::{run_server, ServerConfig};
