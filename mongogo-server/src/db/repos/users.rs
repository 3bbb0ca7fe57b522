//! User repository
//!
//! - save: single insert, identifier generated by the driver
//! - get: lookup by `_id` into a fresh value, assigned only on success

use mongodb::bson::doc;
use mongodb::bson::oid::ObjectId;
use mongogo_core::{User, UserId};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use crate::db::{with_deadline, Database, StoreError};

/// Stored shape of a user: `{ _id, username, email }`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct UserDocument {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub username: String,
    pub email: String,
}

impl UserDocument {
    fn from_user(user: &User) -> Self {
        Self {
            id: None,
            username: user.username.clone(),
            email: user.email.clone(),
        }
    }

    fn into_user(self, fallback_id: UserId) -> User {
        User {
            id: Some(self.id.map(UserId::from).unwrap_or(fallback_id)),
            username: self.username,
            email: self.email,
        }
    }
}

/// User repository
pub struct UserRepo<'a> {
    db: &'a Database,
}

impl<'a> UserRepo<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Insert `user` as a new record and assign the generated identifier.
    ///
    /// Any identifier already on `user` is ignored. On failure `user` is
    /// left untouched; a username or email clash is `StoreError::Duplicate`.
    pub async fn save(&self, user: &mut User) -> Result<UserId, StoreError> {
        let _in_flight = self.db.begin()?;
        let document = UserDocument::from_user(user);

        let limit = self.db.op_timeout();
        let result = with_deadline("save user", limit, async {
            self.db
                .users_collection()
                .insert_one(&document)
                .await
                .map_err(|e| StoreError::from_driver("save user", limit, e))
        })
        .await
        .inspect_err(|e| log_save_failure(&user.username, e))?;

        let id = result
            .inserted_id
            .as_object_id()
            .map(UserId::from)
            .ok_or(StoreError::UnexpectedId(result.inserted_id))?;

        user.id = Some(id);
        debug!(user_id = %id, "User saved");
        Ok(id)
    }

    /// Load the user stored under `id`.
    ///
    /// Every read failure names `id`: `NotFound`, `Timeout` with the id
    /// attached, or `Read` wrapping the driver error.
    pub async fn find(&self, id: UserId) -> Result<User, StoreError> {
        let _in_flight = self.db.begin()?;

        let limit = self.db.op_timeout();
        let document = with_deadline("get user", limit, async {
            self.db
                .users_collection()
                .find_one(doc! { "_id": id.object_id() })
                .await
                .map_err(|e| StoreError::from_driver("get user", limit, e))
        })
        .await
        .map_err(|e| e.for_user(id))?
        .ok_or(StoreError::NotFound { id })?;

        Ok(document.into_user(id))
    }

    /// Overwrite `user.username` and `user.email` from the stored record.
    ///
    /// Both fields are assigned together after a full read; on any error
    /// `user` is unchanged.
    pub async fn get(&self, user: &mut User) -> Result<(), StoreError> {
        let id = user.id.ok_or(StoreError::Unsaved)?;
        let stored = self.find(id).await?;

        user.username = stored.username;
        user.email = stored.email;
        debug!(user_id = %id, "User loaded");
        Ok(())
    }
}

/// Uniqueness clashes are an expected outcome; only real failures are errors.
fn log_save_failure(username: &str, err: &StoreError) {
    if err.is_duplicate() {
        warn!(username, "User not saved: {}", err);
    } else {
        error!(username, "Failed to save user: {}", err);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mongodb::bson;
    use std::io;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    #[derive(Clone, Default)]
    struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

    impl io::Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl CapturedLogs {
        fn capture(&self, f: impl FnOnce()) -> String {
            let writer = self.clone();
            let subscriber = tracing_subscriber::fmt()
                .with_writer(move || writer.clone())
                .with_ansi(false)
                .finish();
            tracing::subscriber::with_default(subscriber, f);
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    #[test]
    fn duplicate_save_is_logged_as_warning() {
        let logs = CapturedLogs::default().capture(|| {
            log_save_failure(
                "imjoshellis",
                &StoreError::Duplicate {
                    field: Some("email"),
                },
            )
        });
        assert!(logs.contains("WARN"));
        assert!(!logs.contains("ERROR"));
    }

    #[test]
    fn other_save_failures_are_logged_as_errors() {
        let logs = CapturedLogs::default().capture(|| {
            log_save_failure(
                "imjoshellis",
                &StoreError::Timeout {
                    operation: "save user",
                    after: Duration::from_secs(2),
                    id: None,
                },
            )
        });
        assert!(logs.contains("ERROR"));
    }

    #[tokio::test]
    async fn unreachable_read_names_the_identifier() {
        let limit = Duration::from_millis(200);
        let db = Database::unreachable(limit);
        let id = UserId::from(ObjectId::new());
        let mut user = User::with_id(id);
        user.username = "untouched".to_string();

        let err = db.users().get(&mut user).await.unwrap_err();

        assert!(err.is_timeout(), "unexpected error: {err:?}");
        assert!(matches!(err, StoreError::Timeout { after, id: Some(failed), .. } if after == limit && failed == id));
        assert!(err.to_string().contains(&id.to_hex()));
        assert_eq!(user.username, "untouched");
        assert_eq!(db.in_flight(), 0);
    }

    #[test]
    fn unsaved_document_omits_id() {
        let user = User::new("imjoshellis", "josh@imjoshlis.com");
        let stored = bson::to_document(&UserDocument::from_user(&user)).unwrap();
        assert_eq!(
            stored,
            doc! { "username": "imjoshellis", "email": "josh@imjoshlis.com" }
        );
    }

    #[test]
    fn stored_record_maps_back_to_user() {
        let oid = ObjectId::new();
        let stored = doc! { "_id": oid, "username": "imjoshellis", "email": "josh@imjoshlis.com" };
        let document: UserDocument = bson::from_document(stored).unwrap();
        let user = document.into_user(UserId::from(ObjectId::new()));

        assert_eq!(user.id, Some(UserId::from(oid)));
        assert_eq!(user.username, "imjoshellis");
        assert_eq!(user.email, "josh@imjoshlis.com");
    }

    #[test]
    fn record_missing_email_fails_to_decode() {
        let stored = doc! { "_id": ObjectId::new(), "username": "imjoshellis" };
        assert!(bson::from_document::<UserDocument>(stored).is_err());
    }
}
