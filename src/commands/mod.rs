//! Command Execution Module
//!
//! This module implements the execution layer of the relay. It receives the
//! statement text of one request, runs it against the shared store, and
//! returns the [`Outcome`](crate::protocol::Outcome) to encode.
//!
//! ## Architecture
//!
//! ```text
//! Client Request
//!       │
//!       ▼
//! ┌─────────────────┐
//! │  Frame Parser   │  (protocol module)
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │ CommandHandler  │  (this module)
//! │                 │
//! │  - Classify     │
//! │  - Execute      │
//! │  - Render rows  │
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │     Store       │  (storage module)
//! └─────────────────┘
//! ```

pub mod handler;
pub mod render;

// Re-export the main command handler
pub use handler::{CommandHandler, StatementKind};
pub use render::{render_row, render_value};
