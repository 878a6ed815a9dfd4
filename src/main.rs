//! minikv server entry point.
//!
//! Sets up logging, the storage engine and optional append log, binds the
//! TCP listener and runs the accept loop until Ctrl+C.

use anyhow::Context;
use clap::Parser;
use minikv::commands::CommandHandler;
use minikv::config::Config;
use minikv::storage::{AppendLog, StorageEngine};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    info!(version = minikv::VERSION, "Starting minikv");

    let storage = Arc::new(StorageEngine::new());
    let mut handler = CommandHandler::new(Arc::clone(&storage));

    if let Some(path) = &config.append_log {
        let replayed = AppendLog::replay(path, &storage)
            .with_context(|| format!("failed to replay append log {}", path.display()))?;
        info!(
            path = %path.display(),
            keys = storage.len(),
            records = replayed.applied,
            expired = replayed.expired,
            "Append log replayed"
        );

        let log = AppendLog::open(path)
            .with_context(|| format!("failed to open append log {}", path.display()))?;
        handler = handler.with_persistence(Arc::new(log));
    }

    let listener = TcpListener::bind(config.bind_address())
        .await
        .with_context(|| format!("failed to bind to {}", config.bind_address()))?;

    let shutdown = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
        info!("Shutdown signal received, stopping server...");
    };

    tokio::select! {
        _ = minikv::server::run(listener, handler) => {}
        _ = shutdown => {}
    }

    info!("Server shutdown complete");
    Ok(())
}
