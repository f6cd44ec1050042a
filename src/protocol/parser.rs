//! Request Frame Parser
//!
//! A request is the text a client writes before the first NUL byte. The
//! parser is fed the connection's growing read buffer and reports when a
//! complete frame is available:
//!
//! - `Ok(Some(request))` - a terminator was found, the frame is complete
//! - `Ok(None)` - no terminator yet, read more data
//! - `Err(ParseError)` - the frame grew past the size limit
//!
//! When the peer closes its side before sending a terminator, whatever was
//! received is treated as the frame (see [`FrameParser::finish`]).
//!
//! Anything after the first NUL is ignored: one connection carries exactly
//! one request.

use crate::protocol::types::TERMINATOR;
use thiserror::Error;

/// Errors that can occur while framing a request.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// The frame exceeds the maximum allowed size
    #[error("message too large: {size} bytes (max: {max})")]
    MessageTooLarge { size: usize, max: usize },
}

/// Result type for framing operations.
pub type ParseResult<T> = Result<T, ParseError>;

/// Default upper bound for a single request frame (1 MB).
pub const DEFAULT_MAX_FRAME_BYTES: usize = 1024 * 1024;

/// A decoded request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    /// Statement text, trimmed and never empty.
    Statement(String),

    /// No bytes, or only whitespace, before the terminator.
    Empty,
}

impl Request {
    /// Decodes raw frame bytes.
    ///
    /// The bytes are cut at the first NUL, decoded as UTF-8 with invalid
    /// sequences replaced, and trimmed.
    pub fn from_bytes(raw: &[u8]) -> Self {
        let end = raw
            .iter()
            .position(|&b| b == TERMINATOR)
            .unwrap_or(raw.len());
        let text = String::from_utf8_lossy(&raw[..end]);
        let trimmed = text.trim();

        if trimmed.is_empty() {
            Request::Empty
        } else {
            Request::Statement(trimmed.to_string())
        }
    }

    /// Returns the statement text, if any.
    pub fn statement(&self) -> Option<&str> {
        match self {
            Request::Statement(sql) => Some(sql),
            Request::Empty => None,
        }
    }
}

/// Incremental parser for NUL-terminated request frames.
///
/// The parser remembers how much of the buffer it has already scanned, so
/// feeding it the same growing buffer never rescans old bytes.
#[derive(Debug, Clone)]
pub struct FrameParser {
    max_frame_bytes: usize,
    scanned: usize,
}

impl FrameParser {
    /// Creates a parser that rejects frames longer than `max_frame_bytes`.
    pub fn new(max_frame_bytes: usize) -> Self {
        Self {
            max_frame_bytes,
            scanned: 0,
        }
    }

    /// Returns the configured frame limit.
    pub fn max_frame_bytes(&self) -> usize {
        self.max_frame_bytes
    }

    /// Looks for a complete frame in `buf`.
    ///
    /// `buf` must be the same buffer on every call, only ever appended to.
    pub fn parse(&mut self, buf: &[u8]) -> ParseResult<Option<Request>> {
        let start = self.scanned.min(buf.len());

        match buf[start..].iter().position(|&b| b == TERMINATOR) {
            Some(offset) => {
                let end = start + offset;
                self.check_size(end)?;
                self.scanned = end;
                Ok(Some(Request::from_bytes(&buf[..end])))
            }
            None => {
                self.scanned = buf.len();
                self.check_size(buf.len())?;
                Ok(None)
            }
        }
    }

    /// Produces the frame for a peer that closed without a terminator.
    pub fn finish(&mut self, buf: &[u8]) -> ParseResult<Request> {
        match self.parse(buf)? {
            Some(request) => Ok(request),
            None => Ok(Request::from_bytes(buf)),
        }
    }

    fn check_size(&self, size: usize) -> ParseResult<()> {
        if size > self.max_frame_bytes {
            return Err(ParseError::MessageTooLarge {
                size,
                max: self.max_frame_bytes,
            });
        }
        Ok(())
    }
}

impl Default for FrameParser {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FRAME_BYTES)
    }
}
