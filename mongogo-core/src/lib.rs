//! mongogo-core: the user entity and MongoDB connection settings
//!
//! Nothing here talks to the network. The server crate turns a
//! [`MongoConfig`] into a live connection and persists [`User`] values.

pub mod config;
pub mod user;

pub use config::{load_dotenv, ConfigError, MongoConfig};
pub use user::{User, UserId};
