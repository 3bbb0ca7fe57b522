//! Database layer - bootstrap, shared handle and repositories
//!
//! # Design Principles
//!
//! - One client per process, created by [`bootstrap`] and shared by clone
//! - Rely on unique indexes, handle conflicts - no check-then-insert
//! - Every operation runs under its own deadline

pub mod bootstrap;
pub mod error;
pub mod repos;

use std::future::Future;
use std::time::Duration;

pub use bootstrap::{bootstrap, BootstrapOptions, Database, USERS_COLLECTION, USER_UNIQUE_FIELDS};
pub use error::StoreError;
pub use repos::UserRepo;

/// Deadline for connect, reset, index creation, save and get.
pub const OPERATION_TIMEOUT: Duration = Duration::from_secs(2);

/// Deadline for draining and releasing the connection at shutdown.
pub const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// Run `fut`, failing with [`StoreError::Timeout`] once `limit` elapses.
pub(crate) async fn with_deadline<T, F>(
    operation: &'static str,
    limit: Duration,
    fut: F,
) -> Result<T, StoreError>
where
    F: Future<Output = Result<T, StoreError>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(StoreError::Timeout {
            operation,
            after: limit,
            id: None,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn deadline_expiry_is_a_timeout() {
        let err = with_deadline("save user", OPERATION_TIMEOUT, async {
            std::future::pending::<Result<(), StoreError>>().await
        })
        .await
        .unwrap_err();

        assert!(err.is_timeout());
        assert!(!err.is_not_found());
        assert_eq!(err.to_string(), "save user timed out after 2s");
    }

    #[tokio::test(start_paused = true)]
    async fn completion_before_deadline_passes_through() {
        let value = with_deadline("get user", OPERATION_TIMEOUT, async {
            tokio::time::sleep(Duration::from_millis(1500)).await;
            Ok::<_, StoreError>(7)
        })
        .await
        .unwrap();

        assert_eq!(value, 7);
    }

    #[tokio::test(start_paused = true)]
    async fn inner_errors_are_not_rewritten() {
        let err = with_deadline("get user", OPERATION_TIMEOUT, async {
            Err::<(), _>(StoreError::Unsaved)
        })
        .await
        .unwrap_err();

        assert!(matches!(err, StoreError::Unsaved));
    }
}
