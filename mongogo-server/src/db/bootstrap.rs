//! Connection bootstrap
//!
//! Runs once at startup: connect and ping, optionally reset the users
//! collection, then install the unique indexes. Either every step succeeds
//! and a [`Database`] is returned, or nothing is.

use std::time::Duration;

use mongodb::bson::doc;
use mongodb::options::{ClientOptions, IndexOptions};
use mongodb::{Client, Collection, IndexModel};
use mongogo_core::MongoConfig;
use tokio_util::task::task_tracker::TaskTrackerToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use super::repos::users::UserDocument;
use super::repos::UserRepo;
use super::{with_deadline, StoreError, OPERATION_TIMEOUT, SHUTDOWN_TIMEOUT};

/// Name of the collection holding user records
pub const USERS_COLLECTION: &str = "users";

/// Fields carrying a unique ascending index
pub const USER_UNIQUE_FIELDS: [&str; 2] = ["email", "username"];

const APP_NAME: &str = "mongogo";

/// Bootstrap options
#[derive(Debug, Clone)]
pub struct BootstrapOptions {
    /// Delete every user record before serving.
    ///
    /// WARNING: destructive. Only meant for throwaway deployments.
    pub reset_collection: bool,

    /// Deadline applied to each bootstrap step
    pub timeout: Duration,
}

impl Default for BootstrapOptions {
    fn default() -> Self {
        Self {
            reset_collection: false,
            timeout: OPERATION_TIMEOUT,
        }
    }
}

/// Shared database handle.
///
/// Cheap to clone; all clones share one client and one drain tracker.
#[derive(Debug, Clone)]
pub struct Database {
    client: Client,
    users: Collection<UserDocument>,
    tracker: TaskTracker,
    op_timeout: Duration,
}

impl Database {
    /// Repository for the users collection
    pub fn users(&self) -> UserRepo<'_> {
        UserRepo::new(self)
    }

    pub(crate) fn users_collection(&self) -> &Collection<UserDocument> {
        &self.users
    }

    pub(crate) fn op_timeout(&self) -> Duration {
        self.op_timeout
    }

    /// Register an in-flight operation; held until the operation finishes.
    ///
    /// The token is taken before the closed check so that `shutdown` either
    /// refuses the operation or waits for it.
    pub(crate) fn begin(&self) -> Result<TaskTrackerToken, StoreError> {
        let token = self.tracker.token();
        if self.tracker.is_closed() {
            return Err(StoreError::ShuttingDown);
        }
        Ok(token)
    }

    /// Handle on a lazy client pointed at a closed port. Nothing connects
    /// until an operation runs, and every operation fails within `limit`.
    #[cfg(test)]
    pub(crate) fn unreachable(limit: Duration) -> Self {
        use mongodb::options::ServerAddress;

        let mut client_options = ClientOptions::builder()
            .hosts(vec![ServerAddress::parse("127.0.0.1:1").unwrap()])
            .build();
        client_options.connect_timeout = Some(limit);
        client_options.server_selection_timeout = Some(limit);
        let client = Client::with_options(client_options).unwrap();
        let users = client
            .database("mongogo_test")
            .collection::<UserDocument>(USERS_COLLECTION);

        Self {
            client,
            users,
            tracker: TaskTracker::new(),
            op_timeout: limit,
        }
    }

    /// Number of operations currently running
    pub fn in_flight(&self) -> usize {
        self.tracker.len()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.tracker.is_closed()
    }

    /// Stop accepting operations, wait for in-flight ones, then release
    /// the client. Only the first call does anything.
    pub async fn shutdown(&self) -> Result<(), StoreError> {
        if !self.tracker.close() {
            debug!("Shutdown already requested; ignoring");
            return Ok(());
        }

        info!(in_flight = self.tracker.len(), "Disconnecting from MongoDB...");
        let client = self.client.clone();
        let tracker = self.tracker.clone();
        with_deadline("disconnect", SHUTDOWN_TIMEOUT, async move {
            tracker.wait().await;
            client.shutdown().await;
            Ok(())
        })
        .await?;

        info!("Disconnected from MongoDB");
        Ok(())
    }
}

/// Connect, optionally reset, and install unique indexes.
pub async fn bootstrap(
    config: &MongoConfig,
    options: &BootstrapOptions,
) -> Result<Database, StoreError> {
    let client = connect(config, options.timeout).await?;
    let users = client
        .database(&config.database)
        .collection::<UserDocument>(USERS_COLLECTION);

    if options.reset_collection {
        reset_collection(&users, options.timeout).await?;
    }

    for field in USER_UNIQUE_FIELDS {
        create_unique_index(&users, field, options.timeout).await?;
    }

    info!(database = %config.database, "Successfully connected to MongoDB");

    Ok(Database {
        client,
        users,
        tracker: TaskTracker::new(),
        op_timeout: options.timeout,
    })
}

async fn connect(config: &MongoConfig, timeout: Duration) -> Result<Client, StoreError> {
    let connect_err = |source| StoreError::Connect {
        host: config.host.clone(),
        source,
    };

    with_deadline("connect", timeout, async {
        let mut client_options = ClientOptions::parse(config.connection_uri())
            .await
            .map_err(connect_err)?;
        client_options.app_name = Some(APP_NAME.to_string());
        client_options.connect_timeout = Some(timeout);
        client_options.server_selection_timeout = Some(timeout);

        let client = Client::with_options(client_options).map_err(connect_err)?;

        // Client construction is lazy; ping to surface auth and reachability
        client
            .database(&config.database)
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(connect_err)?;

        debug!(host = %config.host, "MongoDB ping succeeded");
        Ok(client)
    })
    .await
}

async fn reset_collection(
    users: &Collection<UserDocument>,
    timeout: Duration,
) -> Result<(), StoreError> {
    let result = with_deadline("reset collection", timeout, async {
        users
            .delete_many(doc! {})
            .await
            .map_err(|source| StoreError::Reset {
                collection: USERS_COLLECTION,
                source,
            })
    })
    .await?;

    warn!(
        collection = USERS_COLLECTION,
        deleted = result.deleted_count,
        "Users collection was reset! You probably don't want this to happen in production..."
    );
    Ok(())
}

/// Single-field ascending unique index. Re-creating an equivalent index is
/// a no-op on the server.
pub(crate) fn unique_index(field: &str) -> IndexModel {
    IndexModel::builder()
        .keys(doc! { field: 1 })
        .options(IndexOptions::builder().unique(true).build())
        .build()
}

async fn create_unique_index(
    users: &Collection<UserDocument>,
    field: &'static str,
    timeout: Duration,
) -> Result<(), StoreError> {
    let created = with_deadline("create index", timeout, async {
        users
            .create_index(unique_index(field))
            .await
            .map_err(|source| StoreError::IndexSetup { field, source })
    })
    .await?;

    debug!(field, index = %created.index_name, "Unique index ready");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_options_do_not_reset() {
        let options = BootstrapOptions::default();
        assert!(!options.reset_collection);
        assert_eq!(options.timeout, Duration::from_secs(2));
    }

    #[test]
    fn unique_index_is_single_ascending_field() {
        let model = unique_index("email");
        assert_eq!(model.keys, doc! { "email": 1 });
        let options = model.options.expect("index options");
        assert_eq!(options.unique, Some(true));
    }

    #[tokio::test]
    async fn shutdown_waits_for_in_flight_operations() {
        let db = Database::unreachable(Duration::from_millis(200));
        let in_flight = db.begin().unwrap();

        let shutdown = tokio::spawn({
            let db = db.clone();
            async move { db.shutdown().await }
        });
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(!shutdown.is_finished());
        assert!(db.is_shutting_down());
        assert!(matches!(db.begin(), Err(StoreError::ShuttingDown)));
        assert_eq!(db.in_flight(), 1);

        drop(in_flight);
        shutdown.await.unwrap().unwrap();
        assert_eq!(db.in_flight(), 0);

        // Already released; nothing left to do
        db.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn shutdown_refuses_new_operations() {
        let db = Database::unreachable(Duration::from_millis(200));
        db.shutdown().await.unwrap();

        let mut user = mongogo_core::User::new("late", "late@example.com");
        let err = db.users().save(&mut user).await.unwrap_err();
        assert!(matches!(err, StoreError::ShuttingDown));
        assert!(user.id.is_none());
    }

    #[test]
    fn indexed_fields_are_email_and_username() {
        assert_eq!(USER_UNIQUE_FIELDS, ["email", "username"]);
        assert_eq!(USERS_COLLECTION, "users");
    }
}
