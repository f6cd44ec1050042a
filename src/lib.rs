//! # SQLRelay - SQL over a NUL-terminated TCP protocol
//!
//! SQLRelay is the persistence backend of a message router. The router
//! does not link a database driver; it opens a TCP connection, writes one
//! SQL statement terminated by a NUL byte, and reads back one reply.
//!
//! ## Features
//!
//! - **Tiny protocol**: one request, one reply, one connection
//! - **Shared store**: every statement runs on a single SQLite connection
//! - **Bounded**: connection cap, read timeout, statement timeout with
//!   cancellation, maximum request size
//! - **Async I/O**: built on Tokio; SQLite calls run on the blocking pool
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                              SQLRelay                                   │
//! │                                                                         │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐                  │
//! │  │   Server    │───>│ Connection  │───>│  Command    │                  │
//! │  │ (Listener + │    │  Handler    │    │  Handler    │                  │
//! │  │  Semaphore) │    └──────┬──────┘    └──────┬──────┘                  │
//! │  └─────────────┘           │                  │                         │
//! │                            ▼                  ▼                         │
//! │                     ┌─────────────┐    ┌──────────────────────────────┐ │
//! │                     │ FrameParser │    │            Store             │ │
//! │                     │  Outcome    │    │  Mutex<rusqlite::Connection> │ │
//! │                     └─────────────┘    └──────────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```ignore
//! use sqlrelay::{Config, Server, Store};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::default();
//!     let store = Arc::new(Store::open(&config.db_path)?);
//!
//!     let server = Server::bind(&config, Arc::clone(&store)).await?;
//!     server.run_until(async { tokio::signal::ctrl_c().await.unwrap() }).await;
//!
//!     store.close()?;
//!     Ok(())
//! }
//! ```
//!
//! ## Replies
//!
//! - `SUCCESS` - the statement succeeded with nothing to report
//! - `SUCCESS|<id>` - an insert created row `<id>`
//! - `SUCCESS|(...)|(...)` - a select returned rows
//! - `ERROR:<message>` - anything failed; the message is SQLite's own
//!
//! ## Module Overview
//!
//! - [`protocol`]: request framing and reply encoding
//! - [`storage`]: the shared SQLite store and schema
//! - [`commands`]: statement execution and row rendering
//! - [`connection`]: per-connection request handling
//! - [`server`]: the accept loop
//! - [`config`]: command-line / environment configuration
//! - [`client`]: the caller side of the protocol

pub mod client;
pub mod commands;
pub mod config;
pub mod connection;
pub mod protocol;
pub mod server;
pub mod storage;

// Re-export commonly used types for convenience
pub use client::{ClientError, Reply, SqlClient};
pub use commands::{CommandHandler, StatementKind};
pub use config::{Config, ConfigError};
pub use connection::{handle_connection, ConnectionConfig, ConnectionStats, StatsSnapshot};
pub use protocol::{FrameParser, Outcome, ParseError, Request};
pub use server::Server;
pub use storage::{Store, StoreError};

/// The default port the relay listens on
pub const DEFAULT_PORT: u16 = 7778;

/// The default host the relay binds to
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// The default database file
pub const DEFAULT_DB_PATH: &str = "data/db.sqlite";

/// Version of SQLRelay
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
