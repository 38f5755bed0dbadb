#![forbid(unsafe_code)]
//! Rollup backend: loops on `/finish` and applies inputs to the ledger

use clap::Parser;
use std::time::Duration;
use tracing::info;
use yieldstream::config::load_config;
use yieldstream::handlers::Dapp;
use yieldstream::logging::init_logging;
use yieldstream::persistence::Database;
use yieldstream::rollup::{RollupClient, RollupLoop};

#[derive(Parser)]
#[command(name = "yieldstream-dapp", about = "Native-yield streaming token dapp backend")]
struct Args {
    /// Path to the configuration file
    #[arg(long)]
    config: Option<String>,

    /// Keep an existing ledger instead of starting from an empty one
    #[arg(long)]
    keep_db: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let config = load_config(args.config.as_deref())?;
    init_logging(&config.logging)?;

    let db = if config.database.reset_on_start && !args.keep_db {
        Database::reset(&config.database.path)?
    } else {
        Database::open(&config.database.path)?
    };
    info!(path = %config.database.path, "ledger ready");

    let client = RollupClient::new(&config.rollup.url)?;
    let mut rollup = RollupLoop::new(
        client,
        Dapp::new(db),
        Duration::from_millis(config.rollup.idle_backoff_ms),
    );
    rollup.run().await?;
    Ok(())
}
