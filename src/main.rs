//! SQLRelay server binary
//!
//! Opens the store, starts listening, and runs until Ctrl+C. On shutdown the
//! listener is closed first, then the store is committed and closed.

use anyhow::Context;
use clap::Parser;
use sqlrelay::{Config, ConnectionStats, Server, Store};
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn print_banner(config: &Config, store: &Store) {
    println!(
        r#"
SQLRelay v{}
──────────────────────────────────────────────────────────────
Listening on   {}
Database       {}
Limits         {} connections, read timeout {}, statement timeout {}

Use Ctrl+C to shutdown gracefully.
"#,
        sqlrelay::VERSION,
        config.bind_address(),
        store.location(),
        config.max_connections,
        describe_timeout(config.read_timeout_ms),
        describe_timeout(config.statement_timeout_ms),
    );
}

fn describe_timeout(ms: u64) -> String {
    if ms == 0 {
        "off".to_string()
    } else {
        format!("{}ms", ms)
    }
}

/// Resolves on Ctrl+C. If the handler cannot be installed, never resolves.
async fn shutdown_signal() {
    if let Err(e) = signal::ctrl_c().await {
        error!("Failed to install Ctrl+C handler: {}", e);
        std::future::pending::<()>().await;
    }
}

fn log_stats(stats: &ConnectionStats) {
    let snapshot = stats.snapshot();
    info!(
        connections = snapshot.connections_accepted,
        active = snapshot.active_connections,
        statements = snapshot.statements_executed,
        failed = snapshot.statements_failed,
        empty = snapshot.empty_requests,
        bytes_in = snapshot.bytes_read,
        bytes_out = snapshot.bytes_written,
        "Connection statistics"
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::parse();
    config.validate()?;

    // Set up logging; RUST_LOG overrides the default level
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    // Create the store (shared across all connections)
    let store = Arc::new(
        Store::open(&config.db_path)
            .with_context(|| format!("failed to open store at {}", config.db_path.display()))?,
    );

    let server = Server::bind(&config, Arc::clone(&store))
        .await
        .with_context(|| format!("failed to bind {}", config.bind_address()))?;
    info!("Listening on {}", server.local_addr()?);

    print_banner(&config, &store);

    let stats = server.stats();
    server.run_until(shutdown_signal()).await;

    log_stats(&stats);
    // Closing aborts a statement that is still running, then commits.
    tokio::task::spawn_blocking(move || store.close())
        .await
        .context("store close task failed")?
        .context("failed to close store")?;

    info!("Server shutdown complete");
    Ok(())
}
