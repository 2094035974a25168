//! # Keystone Side-Effect Worker
//!
//! Drains the side-effect queue (ledger posts, loyalty awards) of a Keystone
//! database until interrupted.
//!
//! ## Usage
//! ```bash
//! # Platform config file, or defaults
//! cargo run -p keystone-txn --bin keystone-worker
//!
//! # Explicit config file
//! cargo run -p keystone-txn --bin keystone-worker -- --config ./keystone.toml
//!
//! # Environment overrides
//! KEYSTONE_DATABASE_PATH=./keystone_dev.db RUST_LOG=debug cargo run -p keystone-txn --bin keystone-worker
//! ```

use std::env;
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use keystone_txn::{Keystone, KeystoneConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,keystone=debug,sqlx=warn")),
        )
        .with_target(true)
        .init();

    let args: Vec<String> = env::args().collect();
    let mut config_path: Option<PathBuf> = None;
    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--config" | "-c" => {
                if i + 1 < args.len() {
                    config_path = Some(PathBuf::from(&args[i + 1]));
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Usage: keystone-worker [--config <path>]");
                return Ok(());
            }
            other => {
                eprintln!("Unknown argument: {other}");
                std::process::exit(2);
            }
        }
        i += 1;
    }

    let config = KeystoneConfig::load(config_path)?;
    info!(database = ?config.database.path, "Starting keystone worker");

    let (keystone, processor) = Keystone::open(&config).await?;
    let pending = keystone.db.side_effects().count_pending().await?;
    info!(pending, "Side-effect queue opened");

    let worker = tokio::spawn(processor.run());

    shutdown_signal().await;

    if let Err(e) = keystone.effects.shutdown().await {
        error!(error = %e, "Failed to signal side-effect processor");
    }
    worker.await?;
    keystone.db.close().await;

    info!("Keystone worker stopped");
    Ok(())
}

/// Resolves on Ctrl+C or, on Unix, SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
