//! Relay Wire Protocol
//!
//! The protocol is one request and one reply per connection, both plain
//! UTF-8 text terminated by a NUL byte:
//!
//! ```text
//! client ──  SELECT username FROM users\0  ──> server
//! client <── SUCCESS|('bob',)\0            ─── server
//!            (server closes the socket)
//! ```
//!
//! ## Modules
//!
//! - `parser`: incremental framing of the request
//! - `types`: the `Outcome` enum and reply encoding
//!
//! ## Example
//!
//! ```
//! use sqlrelay::protocol::{FrameParser, Outcome, Request};
//!
//! let mut parser = FrameParser::default();
//! let request = parser.parse(b"SELECT 1\0").unwrap().unwrap();
//! assert_eq!(request, Request::Statement("SELECT 1".to_string()));
//!
//! let reply = Outcome::Rows(vec!["(1,)".to_string()]).encode();
//! assert_eq!(reply, b"SUCCESS|(1,)\0");
//! ```

pub mod parser;
pub mod types;

// Re-export commonly used types for convenience
pub use parser::{FrameParser, ParseError, ParseResult, Request, DEFAULT_MAX_FRAME_BYTES};
pub use types::{
    Outcome, EMPTY_QUERY, ERROR_PREFIX, FIELD_SEPARATOR, QUERY_TOO_LARGE, STATEMENT_TIMED_OUT,
    SUCCESS, TERMINATOR,
};
