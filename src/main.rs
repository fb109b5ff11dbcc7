//! DuoKV - An In-Memory Key-Value Store for Strings and Dictionaries
//!
//! This is the main entry point for the DuoKV server.
//! It sets up logging, the storage engine, the expiry sweeper and the TCP
//! listener, then serves connections until Ctrl+C.

use clap::Parser;
use duokv::commands::CommandHandler;
use duokv::connection::{handle_connection, ConnectionStats};
use duokv::storage::{ExpirySweeper, StorageEngine};
use duokv::Config;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

fn print_banner(config: &Config) {
    println!(
        r#"
DuoKV v{} - In-Memory Key-Value Store
──────────────────────────────────────────────────────────────
Server started on {}
Ready to accept connections.

Use Ctrl+C to shutdown gracefully.
"#,
        duokv::VERSION,
        config.bind_address()
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse command-line arguments
    let config = Config::parse();
    config.validate()?;

    // Set up logging, RUST_LOG wins over --log-level
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();

    // Create the storage engine (shared across all connections)
    let storage = Arc::new(StorageEngine::new());
    info!("Storage engine initialized");

    // Start the background expiry sweeper
    let sweeper = match config.expiry_config() {
        Some(expiry) => Some(ExpirySweeper::start(Arc::clone(&storage), expiry)),
        None => {
            warn!("TTL sweeping disabled, expired keys will never be evicted");
            None
        }
    };

    // Create connection statistics
    let stats = Arc::new(ConnectionStats::new());

    // Bind the TCP listener
    let listener = TcpListener::bind(config.bind_address()).await?;
    info!(address = %config.bind_address(), "Listening");

    print_banner(&config);

    // Main accept loop, until Ctrl+C
    tokio::select! {
        _ = accept_loop(listener, Arc::clone(&storage), Arc::clone(&stats)) => {}
        result = signal::ctrl_c() => {
            match result {
                Ok(()) => info!("Shutdown signal received, stopping server..."),
                Err(e) => error!(error = %e, "Failed to listen for Ctrl+C, stopping server..."),
            }
        }
    }

    if let Some(sweeper) = sweeper {
        sweeper.shutdown().await;
    }

    let storage_stats = storage.stats();
    info!(
        keys = storage_stats.keys,
        volatile_keys = storage_stats.volatile_keys,
        expired = storage_stats.expired,
        connections = stats.connections_accepted.load(Ordering::Relaxed),
        commands = stats.commands_processed.load(Ordering::Relaxed),
        "Server shutdown complete"
    );
    Ok(())
}

/// Main loop that accepts incoming connections
async fn accept_loop(
    listener: TcpListener,
    storage: Arc<StorageEngine>,
    stats: Arc<ConnectionStats>,
) {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                // Create a command handler for this connection
                let handler = CommandHandler::new(Arc::clone(&storage));
                let stats = Arc::clone(&stats);

                // Spawn a task to handle this connection
                tokio::spawn(async move {
                    handle_connection(stream, addr, handler, stats).await;
                });
            }
            Err(e) => {
                error!(error = %e, "Failed to accept connection");
            }
        }
    }
}
