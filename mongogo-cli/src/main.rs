//! mongogo - MongoDB-backed user service
//!
//! Startup sequence:
//! - Load `.env` files and the `MONGO_*` connection settings
//! - Connect, optionally reset the users collection, install unique indexes
//! - Save and read back one user as a smoke test
//! - Serve HTTP until Ctrl+C/SIGTERM, then release the connection

use std::net::SocketAddr;

use anyhow::{Context, Result};
use clap::Parser;
use mongogo_core::{load_dotenv, MongoConfig};
use mongogo_server::{bootstrap, run_server, BootstrapOptions, ServerConfig};
use tracing::{error, info};

mod smoke;
mod tracing_setup;

#[derive(Parser, Debug)]
#[command(
    name = "mongogo",
    author,
    version,
    about = "User service backed by MongoDB",
    long_about = "Connects to MongoDB using MONGO_HOST, MONGO_USERNAME, MONGO_PASSWORD and \
                  MONGO_DATABASE, prepares the users collection, and serves HTTP."
)]
struct Cli {
    /// Address to bind the HTTP listener to
    #[arg(long, short = 'b', env = "MONGOGO_BIND", default_value = "127.0.0.1:8080")]
    bind: SocketAddr,

    /// Delete every user record at startup (destructive, not for production)
    #[arg(long, env = "MONGOGO_RESET_COLLECTION")]
    reset_collection: bool,

    /// Skip the save/read-back check after connecting
    #[arg(long)]
    skip_smoke_test: bool,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    tracing_setup::init(&tracing_setup::TracingConfig { debug: cli.debug }).ok();

    if let Err(e) = run(cli).await {
        error!("{:#}", e);
        return Err(e);
    }
    Ok(())
}

async fn run(cli: Cli) -> Result<()> {
    load_dotenv();
    let config = MongoConfig::from_env().context("Database configuration failed")?;

    let options = BootstrapOptions {
        reset_collection: cli.reset_collection,
        ..BootstrapOptions::default()
    };
    let db = bootstrap(&config, &options)
        .await
        .context("Database bootstrap failed")?;

    if cli.skip_smoke_test {
        info!("Skipping startup smoke test");
    } else if let Err(e) = smoke::run(&db).await {
        db.shutdown().await.ok();
        return Err(e);
    }

    let served = run_server(ServerConfig { bind_addr: cli.bind })
        .await
        .context("Server error");

    db.shutdown()
        .await
        .context("Failed to disconnect from MongoDB")?;

    served
}
