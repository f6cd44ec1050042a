//! Relay client
//!
//! The caller side of the protocol: open a connection, write one statement
//! followed by a NUL byte, read the reply up to the next NUL (or until the
//! server closes), done.
//!
//! ```ignore
//! use sqlrelay::client::{Reply, SqlClient};
//!
//! let client = SqlClient::new("127.0.0.1:7778");
//! let reply = client.send("SELECT username FROM users").await?;
//! if let Reply::Success(rows) = reply {
//!     for row in rows {
//!         println!("{}", row);
//!     }
//! }
//! ```

use crate::protocol::{ERROR_PREFIX, FIELD_SEPARATOR, SUCCESS, TERMINATOR};
use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

/// Errors raised by [`SqlClient`].
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed reply: {0:?}")]
    MalformedReply(String),
}

/// A decoded reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// `SUCCESS`, with the `|`-separated fields that followed it.
    Success(Vec<String>),
    /// `ERROR:<message>`
    Error(String),
}

impl Reply {
    /// Decodes reply text (without the terminator).
    ///
    /// Fields are split on every `|`, so a rendered value that itself
    /// contains `|` spans more than one field.
    pub fn parse(text: &str) -> Result<Self, ClientError> {
        if let Some(message) = text.strip_prefix(ERROR_PREFIX) {
            return Ok(Reply::Error(message.to_string()));
        }

        match text.strip_prefix(SUCCESS) {
            Some("") => Ok(Reply::Success(Vec::new())),
            Some(rest) => match rest.strip_prefix(FIELD_SEPARATOR) {
                Some(fields) => Ok(Reply::Success(
                    fields.split(FIELD_SEPARATOR).map(str::to_string).collect(),
                )),
                None => Err(ClientError::MalformedReply(text.to_string())),
            },
            None => Err(ClientError::MalformedReply(text.to_string())),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Reply::Success(_))
    }

    /// The fields of a successful reply; empty for errors.
    pub fn fields(&self) -> &[String] {
        match self {
            Reply::Success(fields) => fields,
            Reply::Error(_) => &[],
        }
    }

    /// The inserted rowid, for a reply to an insert.
    pub fn insert_id(&self) -> Option<i64> {
        match self.fields() {
            [id] => id.parse().ok(),
            _ => None,
        }
    }
}

/// One-statement-per-connection client.
#[derive(Debug, Clone)]
pub struct SqlClient {
    addr: String,
}

impl SqlClient {
    pub fn new(addr: impl Into<String>) -> Self {
        Self { addr: addr.into() }
    }

    /// Sends one statement and decodes the reply.
    pub async fn send(&self, sql: &str) -> Result<Reply, ClientError> {
        let mut payload = Vec::with_capacity(sql.len() + 1);
        payload.extend_from_slice(sql.as_bytes());
        payload.push(TERMINATOR);

        let text = self.send_raw(&payload).await?;
        Reply::parse(&text)
    }

    /// Writes `payload` verbatim and returns the reply text.
    ///
    /// The server may reply and close before the whole payload is written
    /// (an oversized request). A failed write is only reported when no reply
    /// can be read afterwards.
    pub async fn send_raw(&self, payload: &[u8]) -> Result<String, ClientError> {
        let mut stream = TcpStream::connect(&self.addr).await?;

        let written = match stream.write_all(payload).await {
            Ok(()) => stream.flush().await,
            Err(e) => Err(e),
        };

        let mut buf = BytesMut::with_capacity(256);
        let read = read_reply(&mut stream, &mut buf).await;

        match (written, read) {
            (Ok(()), Ok(())) => {}
            (Ok(()), Err(e)) => return Err(e.into()),
            (Err(e), _) if buf.is_empty() => return Err(e.into()),
            (Err(_), _) => {}
        }

        Ok(String::from_utf8_lossy(&buf).into_owned())
    }
}

/// Reads into `buf` up to the first terminator (dropped) or EOF.
async fn read_reply(stream: &mut TcpStream, buf: &mut BytesMut) -> std::io::Result<()> {
    loop {
        if let Some(end) = buf.iter().position(|&b| b == TERMINATOR) {
            buf.truncate(end);
            return Ok(());
        }
        if stream.read_buf(buf).await? == 0 {
            return Ok(());
        }
    }
}
