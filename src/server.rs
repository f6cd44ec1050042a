//! Connection Acceptor
//!
//! The server owns the listening socket and hands every accepted connection
//! to its own task. The number of connections served at once is capped by a
//! semaphore: a permit is taken before `accept()` and released when the
//! connection's task ends, so clients beyond the cap wait in the listen
//! backlog instead of piling up as tasks.

use crate::commands::CommandHandler;
use crate::config::Config;
use crate::connection::{handle_connection, ConnectionConfig, ConnectionStats};
use crate::storage::Store;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::Semaphore;
use tracing::{error, info};

/// Pause after a failed `accept()` (e.g. out of file descriptors).
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// The relay server.
pub struct Server {
    listener: TcpListener,
    command_handler: CommandHandler,
    connection_config: ConnectionConfig,
    limit: Arc<Semaphore>,
    stats: Arc<ConnectionStats>,
}

impl Server {
    /// Binds to the configured address.
    pub async fn bind(config: &Config, store: Arc<Store>) -> std::io::Result<Self> {
        let listener = TcpListener::bind(config.bind_address()).await?;
        Ok(Self::new(listener, store, config))
    }

    /// Wraps an already bound listener.
    pub fn new(listener: TcpListener, store: Arc<Store>, config: &Config) -> Self {
        let command_handler =
            CommandHandler::new(store).with_statement_timeout(config.statement_timeout());

        Self {
            listener,
            command_handler,
            connection_config: config.connection_config(),
            limit: Arc::new(Semaphore::new(config.max_connections.max(1))),
            stats: Arc::new(ConnectionStats::new()),
        }
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Shared connection statistics.
    pub fn stats(&self) -> Arc<ConnectionStats> {
        Arc::clone(&self.stats)
    }

    /// Accepts connections until `shutdown` completes.
    ///
    /// The listener is closed when this returns. Connections already being
    /// served keep running on their own tasks.
    pub async fn run_until<F>(self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tokio::select! {
            _ = self.accept_loop() => {}
            _ = shutdown => {
                info!("Shutdown signal received, stopping server...");
            }
        }
    }

    /// Main loop that accepts incoming connections
    async fn accept_loop(&self) {
        loop {
            let permit = match Arc::clone(&self.limit).acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => return,
            };

            match self.listener.accept().await {
                Ok((stream, addr)) => {
                    let handler = self.command_handler.clone();
                    let stats = Arc::clone(&self.stats);
                    let config = self.connection_config;

                    // Spawn a task to handle this connection
                    tokio::spawn(async move {
                        handle_connection(stream, addr, handler, stats, config).await;
                        drop(permit);
                    });
                }
                Err(e) => {
                    error!("Failed to accept connection: {}", e);
                    tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
                }
            }
        }
    }
}
