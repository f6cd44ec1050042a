//! Execution Outcomes and Reply Encoding
//!
//! Every statement the relay runs ends in exactly one [`Outcome`]. The
//! outcome is the only thing that crosses from the executor to the wire,
//! and [`Outcome::encode`] is the only place that knows the reply format.
//!
//! ## Reply Format
//!
//! | Outcome       | Reply                          |
//! |---------------|--------------------------------|
//! | `Empty`       | `SUCCESS`                      |
//! | `InsertId(n)` | `SUCCESS\|n`                   |
//! | `Rows(rows)`  | `SUCCESS\|row1\|row2...`       |
//! | `Failure(m)`  | `ERROR:m`                      |
//!
//! Every reply is terminated by a single NUL byte.

use std::fmt;

/// Byte that terminates both request and reply frames.
pub const TERMINATOR: u8 = 0;

/// Leading word of every successful reply.
pub const SUCCESS: &str = "SUCCESS";

/// Prefix of every failed reply.
pub const ERROR_PREFIX: &str = "ERROR:";

/// Separator between the status word and each field of a successful reply.
pub const FIELD_SEPARATOR: char = '|';

/// Failure message for a request that is empty after trimming.
pub const EMPTY_QUERY: &str = "Empty query";

/// Failure message for a request larger than the configured frame limit.
pub const QUERY_TOO_LARGE: &str = "Query too large";

/// Failure message for a statement that exceeded the statement timeout.
pub const STATEMENT_TIMED_OUT: &str = "Statement timed out";

/// The result of executing one statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The statement succeeded and produced nothing to report.
    Empty,

    /// A read statement returned rows, each already rendered as a tuple.
    Rows(Vec<String>),

    /// A write statement inserted a row with this rowid.
    InsertId(i64),

    /// The statement failed; carries the store's own error text.
    Failure(String),
}

impl Outcome {
    /// Creates a failure outcome.
    pub fn failure(message: impl Into<String>) -> Self {
        Outcome::Failure(message.into())
    }

    /// The fixed reply for an empty request.
    pub fn empty_query() -> Self {
        Outcome::Failure(EMPTY_QUERY.to_string())
    }

    /// Collapses an empty row set into [`Outcome::Empty`].
    pub fn rows(rows: Vec<String>) -> Self {
        if rows.is_empty() {
            Outcome::Empty
        } else {
            Outcome::Rows(rows)
        }
    }

    /// Returns true if this outcome is a failure.
    pub fn is_failure(&self) -> bool {
        matches!(self, Outcome::Failure(_))
    }

    /// Encodes the outcome as a complete, NUL-terminated reply frame.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        self.encode_into(&mut buf);
        buf
    }

    /// Encodes the outcome into an existing buffer.
    pub fn encode_into(&self, buf: &mut Vec<u8>) {
        match self {
            Outcome::Empty => {
                buf.extend_from_slice(SUCCESS.as_bytes());
            }
            Outcome::InsertId(id) => {
                buf.extend_from_slice(SUCCESS.as_bytes());
                push_field(buf, id.to_string().as_bytes());
            }
            Outcome::Rows(rows) => {
                buf.extend_from_slice(SUCCESS.as_bytes());
                for row in rows {
                    push_field(buf, row.as_bytes());
                }
            }
            Outcome::Failure(message) => {
                buf.extend_from_slice(ERROR_PREFIX.as_bytes());
                // A stray NUL would end the frame early on the client side.
                buf.extend(message.bytes().filter(|&b| b != TERMINATOR));
            }
        }
        buf.push(TERMINATOR);
    }
}

fn push_field(buf: &mut Vec<u8>, field: &[u8]) {
    let mut sep = [0u8; 4];
    buf.extend_from_slice(FIELD_SEPARATOR.encode_utf8(&mut sep).as_bytes());
    buf.extend_from_slice(field);
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Empty => write!(f, "empty"),
            Outcome::Rows(rows) => write!(f, "{} row(s)", rows.len()),
            Outcome::InsertId(id) => write!(f, "insert id {}", id),
            Outcome::Failure(message) => write!(f, "failure: {}", message),
        }
    }
}
