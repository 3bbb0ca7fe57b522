//! The user entity
//!
//! A `User` starts out unsaved (no identifier). Saving assigns the
//! database-generated identifier, which never changes afterwards.

use std::fmt;
use std::str::FromStr;

use mongodb::bson::oid::{self, ObjectId};

/// Database-assigned primary key of a user record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UserId(ObjectId);

impl UserId {
    pub fn object_id(&self) -> ObjectId {
        self.0
    }

    /// 24-character hex form
    pub fn to_hex(&self) -> String {
        self.0.to_hex()
    }
}

impl From<ObjectId> for UserId {
    fn from(id: ObjectId) -> Self {
        Self(id)
    }
}

impl FromStr for UserId {
    type Err = oid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ObjectId::parse_str(s).map(Self)
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.to_hex())
    }
}

/// A user record. `username` and `email` are unique across all users.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct User {
    /// `None` until the first successful save
    pub id: Option<UserId>,
    pub username: String,
    pub email: String,
}

impl User {
    /// Create an unsaved user.
    pub fn new(username: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            id: None,
            username: username.into(),
            email: email.into(),
        }
    }

    /// Create a value that only knows its identifier, ready to be loaded.
    pub fn with_id(id: UserId) -> Self {
        Self {
            id: Some(id),
            ..Self::default()
        }
    }

    pub fn is_persisted(&self) -> bool {
        self.id.is_some()
    }
}
