//! Store error type
//!
//! Startup failures (`Config`, `Connect`, `Reset`, `IndexSetup`) are fatal to
//! the caller. Everything else is returned from save/get and is recoverable.

use std::time::Duration;

use mongodb::bson::Bson;
use mongodb::error::{Error as DriverError, ErrorKind, WriteFailure};
use mongogo_core::{ConfigError, UserId};
use thiserror::Error;

use super::bootstrap::USER_UNIQUE_FIELDS;

/// Server code for a unique index violation
const DUPLICATE_KEY_CODE: i32 = 11000;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("couldn't connect to MongoDB at {host}: {source}")]
    Connect {
        host: String,
        #[source]
        source: DriverError,
    },

    #[error("failed to reset collection '{collection}': {source}")]
    Reset {
        collection: &'static str,
        #[source]
        source: DriverError,
    },

    #[error("failed to create unique index on '{field}': {source}")]
    IndexSetup {
        field: &'static str,
        #[source]
        source: DriverError,
    },

    /// `field` is `None` when the server message names no known index
    #[error("a user with this {} already exists", .field.unwrap_or("username or email"))]
    Duplicate { field: Option<&'static str> },

    #[error("user {id} not found")]
    NotFound { id: UserId },

    #[error("user has no identifier; save it first")]
    Unsaved,

    /// `id` is set when the operation was reading a specific user
    #[error("{operation} timed out after {after:?}{}", .id.map(|id| format!(" (user {id})")).unwrap_or_default())]
    Timeout {
        operation: &'static str,
        after: Duration,
        id: Option<UserId>,
    },

    #[error("failed to read user {id}: {source}")]
    Read {
        id: UserId,
        #[source]
        source: DriverError,
    },

    #[error("database is shutting down")]
    ShuttingDown,

    #[error("insert returned a non-ObjectId identifier: {0}")]
    UnexpectedId(Bson),

    #[error("database error: {0}")]
    Database(#[source] DriverError),
}

impl StoreError {
    /// Classify a driver error from a save/get call.
    ///
    /// `limit` is the server-selection timeout the client was built with.
    pub fn from_driver(operation: &'static str, limit: Duration, err: DriverError) -> Self {
        if let ErrorKind::Write(WriteFailure::WriteError(write_error)) = err.kind.as_ref() {
            if write_error.code == DUPLICATE_KEY_CODE {
                return Self::Duplicate {
                    field: duplicate_field(&write_error.message),
                };
            }
        }

        if let ErrorKind::ServerSelection { .. } = err.kind.as_ref() {
            return Self::Timeout {
                operation,
                after: limit,
                id: None,
            };
        }

        Self::Database(err)
    }

    /// Attach the identifier being read, so the error names it.
    pub fn for_user(self, id: UserId) -> Self {
        match self {
            Self::Timeout {
                operation, after, ..
            } => Self::Timeout {
                operation,
                after,
                id: Some(id),
            },
            Self::Database(source) => Self::Read { id, source },
            other => other,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    pub fn is_duplicate(&self) -> bool {
        matches!(self, Self::Duplicate { .. })
    }
}

/// Pull the conflicting field out of an E11000 message.
///
/// The server reports `... index: email_1 dup key: { email: "..." }`; the
/// index name is the field name plus the `_1` direction suffix.
pub(crate) fn duplicate_field(message: &str) -> Option<&'static str> {
    let index = message.split("index: ").nth(1)?.split_whitespace().next()?;
    let field = index.strip_suffix("_1").unwrap_or(index);
    USER_UNIQUE_FIELDS.iter().copied().find(|known| *known == field)
}
