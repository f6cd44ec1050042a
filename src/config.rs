//! Server configuration
//!
//! Every setting can come from a command-line flag or an environment
//! variable. The defaults are the fixed address and database path the
//! message router expects.

use crate::connection::ConnectionConfig;
use crate::{DEFAULT_DB_PATH, DEFAULT_HOST, DEFAULT_PORT};
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

/// Errors found while validating a configuration.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("--max-connections must be at least 1")]
    NoConnections,

    #[error("--max-frame-bytes must be at least 1")]
    NoFrameBytes,
}

/// Relay configuration.
#[derive(Parser, Debug, Clone, PartialEq, Eq)]
#[command(
    name = "sqlrelay",
    version,
    about = "Executes NUL-terminated SQL statements received over TCP against a shared SQLite store"
)]
pub struct Config {
    /// Host to bind to
    #[arg(long, env = "SQLRELAY_HOST", default_value = DEFAULT_HOST)]
    pub host: String,

    /// Port to listen on
    #[arg(short, long, env = "SQLRELAY_PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// SQLite database file (parent directories are created)
    #[arg(long = "db", env = "SQLRELAY_DB", default_value = DEFAULT_DB_PATH)]
    pub db_path: PathBuf,

    /// Maximum number of connections served at once
    #[arg(long, env = "SQLRELAY_MAX_CONNECTIONS", default_value_t = 128)]
    pub max_connections: usize,

    /// Time allowed to receive a request, in milliseconds (0 = no limit)
    #[arg(long, env = "SQLRELAY_READ_TIMEOUT_MS", default_value_t = 30_000)]
    pub read_timeout_ms: u64,

    /// Time allowed to execute a statement, in milliseconds (0 = no limit)
    #[arg(long, env = "SQLRELAY_STATEMENT_TIMEOUT_MS", default_value_t = 30_000)]
    pub statement_timeout_ms: u64,

    /// Largest accepted request in bytes
    #[arg(long, env = "SQLRELAY_MAX_FRAME_BYTES", default_value_t = 1024 * 1024)]
    pub max_frame_bytes: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            db_path: PathBuf::from(DEFAULT_DB_PATH),
            max_connections: 128,
            read_timeout_ms: 30_000,
            statement_timeout_ms: 30_000,
            max_frame_bytes: 1024 * 1024,
        }
    }
}

impl Config {
    /// Checks limits that clap cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_connections == 0 {
            return Err(ConfigError::NoConnections);
        }
        if self.max_frame_bytes == 0 {
            return Err(ConfigError::NoFrameBytes);
        }
        Ok(())
    }

    /// Returns the bind address as a string
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn read_timeout(&self) -> Option<Duration> {
        millis(self.read_timeout_ms)
    }

    pub fn statement_timeout(&self) -> Option<Duration> {
        millis(self.statement_timeout_ms)
    }

    /// Limits applied to every connection.
    pub fn connection_config(&self) -> ConnectionConfig {
        ConnectionConfig {
            read_timeout: self.read_timeout(),
            max_frame_bytes: self.max_frame_bytes,
        }
    }
}

fn millis(ms: u64) -> Option<Duration> {
    (ms > 0).then(|| Duration::from_millis(ms))
}
