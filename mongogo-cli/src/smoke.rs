//! Startup smoke test: save one user, read it back by identifier

use anyhow::{bail, Context, Result};
use mongogo_core::User;
use mongogo_server::{Database, StoreError};
use tracing::{info, warn};

const SMOKE_USERNAME: &str = "imjoshellis";
const SMOKE_EMAIL: &str = "josh@imjoshlis.com";

/// Save a known user and read it back into a separate value.
///
/// An existing smoke user (left over from a run without
/// `--reset-collection`) is logged and skipped; any other failure is fatal.
pub async fn run(db: &Database) -> Result<()> {
    let mut user = User::new(SMOKE_USERNAME, SMOKE_EMAIL);
    if !user.is_persisted() {
        info!("User has no identifier. Attempting to save...");
    }

    match db.users().save(&mut user).await {
        Ok(id) => info!(user_id = %id, "User has a generated identifier. Save was successful."),
        Err(StoreError::Duplicate { field }) => {
            warn!(
                field = field.unwrap_or("unknown"),
                "Smoke test user already exists; run with --reset-collection to start clean"
            );
            return Ok(());
        }
        Err(e) => return Err(e).context("Error saving user to db"),
    }

    let id = user.id.context("save returned without an identifier")?;
    let mut read_user = User::with_id(id);
    if read_user.email.is_empty() {
        info!("New user value created with matching identifier. Attempting to read...");
    }

    db.users()
        .get(&mut read_user)
        .await
        .context("Error reading user from db")?;

    if read_user.email != user.email || read_user.username != user.username {
        bail!(
            "read back {}/{} but saved {}/{}",
            read_user.username,
            read_user.email,
            user.username,
            user.email
        );
    }

    info!("Read user matches the saved one. Read was successful.");
    Ok(())
}
