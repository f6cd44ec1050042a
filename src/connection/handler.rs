//! Connection Handler
//!
//! This module handles individual client connections. Each connection
//! carries exactly one request and one reply, then the server closes it.
//!
//! ## Connection Lifecycle
//!
//! ```text
//! 1. Accepted
//!        │
//!        ▼
//! 2. Reading ── read until NUL or EOF (bounded by read timeout / size)
//!        │
//!        ├── empty ──────> reply "ERROR:Empty query"
//!        │
//!        ▼
//! 3. Executing ── CommandHandler (bounded by statement timeout)
//!        │
//!        ▼
//! 4. Responding ── one NUL-terminated reply
//!        │
//!        ▼
//! 5. Closed (always, also after errors)
//! ```
//!
//! ## Buffer Management
//!
//! Incoming bytes accumulate in a `BytesMut` until the frame parser sees a
//! terminator. TCP may deliver the request in any number of pieces.

use crate::commands::CommandHandler;
use crate::protocol::{
    FrameParser, Outcome, ParseError, Request, DEFAULT_MAX_FRAME_BYTES, QUERY_TOO_LARGE,
};
use bytes::BytesMut;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, info, trace, warn};

/// Initial buffer capacity
const INITIAL_BUFFER_SIZE: usize = 4096;

/// Statistics for connection handling
#[derive(Debug, Default)]
pub struct ConnectionStats {
    /// Total number of connections accepted
    pub connections_accepted: AtomicU64,
    /// Currently active connections
    pub active_connections: AtomicU64,
    /// Statements that reached the store
    pub statements_executed: AtomicU64,
    /// Statements that ended in a failure reply
    pub statements_failed: AtomicU64,
    /// Requests rejected as empty
    pub empty_requests: AtomicU64,
    /// Total bytes read
    pub bytes_read: AtomicU64,
    /// Total bytes written
    pub bytes_written: AtomicU64,
}

impl ConnectionStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connection_opened(&self) {
        self.connections_accepted.fetch_add(1, Ordering::Relaxed);
        self.active_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_closed(&self) {
        self.active_connections.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn statement_executed(&self, outcome: &Outcome) {
        self.statements_executed.fetch_add(1, Ordering::Relaxed);
        if outcome.is_failure() {
            self.statements_failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn empty_request(&self) {
        self.empty_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn bytes_read(&self, count: usize) {
        self.bytes_read.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn bytes_written(&self, count: usize) {
        self.bytes_written.fetch_add(count as u64, Ordering::Relaxed);
    }

    /// Reads every counter.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            connections_accepted: self.connections_accepted.load(Ordering::Relaxed),
            active_connections: self.active_connections.load(Ordering::Relaxed),
            statements_executed: self.statements_executed.load(Ordering::Relaxed),
            statements_failed: self.statements_failed.load(Ordering::Relaxed),
            empty_requests: self.empty_requests.load(Ordering::Relaxed),
            bytes_read: self.bytes_read.load(Ordering::Relaxed),
            bytes_written: self.bytes_written.load(Ordering::Relaxed),
        }
    }
}

/// Counter values read from [`ConnectionStats`] at one moment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub connections_accepted: u64,
    pub active_connections: u64,
    pub statements_executed: u64,
    pub statements_failed: u64,
    pub empty_requests: u64,
    pub bytes_read: u64,
    pub bytes_written: u64,
}

/// Per-connection limits.
#[derive(Debug, Clone, Copy)]
pub struct ConnectionConfig {
    /// Upper bound on receiving the whole request. `None` waits forever.
    pub read_timeout: Option<Duration>,
    /// Largest accepted request, excluding the terminator.
    pub max_frame_bytes: usize,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            read_timeout: None,
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
        }
    }
}

/// Handles a single client connection.
pub struct ConnectionHandler {
    /// The TCP stream for this connection
    stream: TcpStream,

    /// Client's address (for logging)
    addr: SocketAddr,

    /// Buffer for incoming data
    buffer: BytesMut,

    /// The command handler (shared store inside)
    command_handler: CommandHandler,

    /// Request framer
    parser: FrameParser,

    read_timeout: Option<Duration>,

    /// Connection statistics (shared)
    stats: Arc<ConnectionStats>,
}

impl ConnectionHandler {
    /// Creates a new connection handler.
    pub fn new(
        stream: TcpStream,
        addr: SocketAddr,
        command_handler: CommandHandler,
        stats: Arc<ConnectionStats>,
        config: ConnectionConfig,
    ) -> Self {
        stats.connection_opened();

        Self {
            stream,
            addr,
            buffer: BytesMut::with_capacity(INITIAL_BUFFER_SIZE),
            command_handler,
            parser: FrameParser::new(config.max_frame_bytes),
            read_timeout: config.read_timeout,
            stats,
        }
    }

    /// Serves the connection's single request and closes it.
    ///
    /// The socket is shut down on every path, including errors.
    pub async fn run(mut self) -> Result<(), ConnectionError> {
        debug!(client = %self.addr, "Client connected");

        let result = self.serve().await;

        match &result {
            Ok(()) => trace!(client = %self.addr, "Request served"),
            Err(e) => match e {
                ConnectionError::Io(io_err)
                    if io_err.kind() == std::io::ErrorKind::ConnectionReset =>
                {
                    debug!(client = %self.addr, "Connection reset by client")
                }
                _ => warn!(client = %self.addr, error = %e, "Connection error"),
            },
        }

        // Best effort: the peer may already be gone.
        let _ = self.stream.shutdown().await;

        self.stats.connection_closed();
        result
    }

    /// Read one request, execute it, send one reply.
    async fn serve(&mut self) -> Result<(), ConnectionError> {
        let request = match self.read_request().await {
            Ok(request) => request,
            Err(e @ ConnectionError::Frame(ParseError::MessageTooLarge { .. })) => {
                self.send_response(&Outcome::failure(QUERY_TOO_LARGE)).await?;
                return Err(e);
            }
            Err(e) => return Err(e),
        };

        let outcome = match request {
            Request::Empty => {
                self.stats.empty_request();
                debug!(client = %self.addr, "Empty request");
                Outcome::empty_query()
            }
            Request::Statement(sql) => {
                debug!(client = %self.addr, sql = %sql, "Executing statement");
                let outcome = self.command_handler.execute(sql).await;
                self.stats.statement_executed(&outcome);
                if let Outcome::Failure(message) = &outcome {
                    info!(client = %self.addr, error = %message, "Statement failed");
                }
                outcome
            }
        };

        self.send_response(&outcome).await
    }

    /// Reads the request, bounded by the read timeout.
    async fn read_request(&mut self) -> Result<Request, ConnectionError> {
        match self.read_timeout {
            Some(limit) => tokio::time::timeout(limit, self.read_frame())
                .await
                .map_err(|_| ConnectionError::ReadTimeout(limit))?,
            None => self.read_frame().await,
        }
    }

    /// Reads until a terminator arrives or the client stops sending.
    async fn read_frame(&mut self) -> Result<Request, ConnectionError> {
        loop {
            if let Some(request) = self.parser.parse(&self.buffer)? {
                return Ok(request);
            }

            // Ensure we have some capacity
            if self.buffer.capacity() - self.buffer.len() < 1024 {
                self.buffer.reserve(INITIAL_BUFFER_SIZE);
            }

            let n = self.stream.read_buf(&mut self.buffer).await?;

            if n == 0 {
                // Client closed its side; whatever arrived is the request.
                trace!(client = %self.addr, buffered = self.buffer.len(), "Read EOF");
                return Ok(self.parser.finish(&self.buffer)?);
            }

            self.stats.bytes_read(n);
            trace!(client = %self.addr, bytes = n, "Read data");
        }
    }

    /// Sends the reply frame.
    async fn send_response(&mut self, outcome: &Outcome) -> Result<(), ConnectionError> {
        let bytes = outcome.encode();
        self.stream.write_all(&bytes).await?;
        self.stream.flush().await?;
        self.stats.bytes_written(bytes.len());
        trace!(
            client = %self.addr,
            bytes = bytes.len(),
            "Sent response"
        );
        Ok(())
    }
}

/// Errors that can occur while handling a connection.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    /// I/O error (network issue)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Request framing error
    #[error("Frame error: {0}")]
    Frame(#[from] ParseError),

    /// The client did not finish its request in time
    #[error("Read timed out after {0:?}")]
    ReadTimeout(Duration),
}

/// Handles a client connection.
///
/// This is a convenience function that creates a ConnectionHandler
/// and runs it to completion. Errors are logged by the handler itself.
pub async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    command_handler: CommandHandler,
    stats: Arc<ConnectionStats>,
    config: ConnectionConfig,
) {
    let handler = ConnectionHandler::new(stream, addr, command_handler, stats, config);
    let _ = handler.run().await;
}
