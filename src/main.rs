//! Rivulet server entry point.
//!
//! Parses the configuration, builds the shared store, starts the expiry
//! reaper and accepts clients until Ctrl+C.

use anyhow::Context;
use clap::Parser;
use rivulet::commands::CommandHandler;
use rivulet::connection::{handle_connection, ConnectionStats};
use rivulet::storage::{ExpiryReaper, Store, NUM_SHARDS};
use rivulet::Config;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn print_banner(config: &Config) {
    println!(
        r#"
Rivulet v{} - In-Memory Key-Value and Stream Store
──────────────────────────────────────────────────────────────
Server started on {}
Ready to accept connections.

Use Ctrl+C to shutdown gracefully.
"#,
        rivulet::VERSION,
        config.bind_address()
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::parse();

    let filter = EnvFilter::try_new(&config.log_level)
        .with_context(|| format!("invalid log level '{}'", config.log_level))?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();

    // Shared by every connection
    let store = Arc::new(Store::new());
    info!(shards = NUM_SHARDS, "Store initialized");

    let reaper = ExpiryReaper::start(Arc::clone(&store), config.expiry());

    let stats = Arc::new(ConnectionStats::new());

    let listener = TcpListener::bind(config.bind_address())
        .await
        .with_context(|| format!("failed to bind {}", config.bind_address()))?;
    info!(address = %config.bind_address(), "Listening");

    print_banner(&config);

    tokio::select! {
        _ = accept_loop(listener, Arc::clone(&store), Arc::clone(&stats)) => {}
        result = signal::ctrl_c() => {
            result.context("failed to listen for Ctrl+C")?;
            info!("Shutdown signal received, stopping server...");
        }
    }

    reaper.shutdown().await;

    let keyspace = store.keyspace().stats();
    info!(
        connections = stats.connections_accepted.load(Ordering::Relaxed),
        commands = stats.commands_processed.load(Ordering::Relaxed),
        protocol_errors = stats.protocol_errors.load(Ordering::Relaxed),
        keys = keyspace.keys,
        expired = keyspace.expired,
        streams = store.streams().stream_count(),
        "Server shutdown complete"
    );
    Ok(())
}

/// Accepts clients forever, one task per connection.
async fn accept_loop(listener: TcpListener, store: Arc<Store>, stats: Arc<ConnectionStats>) {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let handler = CommandHandler::new(Arc::clone(&store));
                let stats = Arc::clone(&stats);

                tokio::spawn(handle_connection(stream, addr, handler, stats));
            }
            Err(e) => {
                error!(error = %e, "Failed to accept connection");
            }
        }
    }
}
