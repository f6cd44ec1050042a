//! Storage Module
//!
//! This module provides the shared SQLite store every client statement runs
//! against, plus the bookkeeping schema created at startup.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         Store                               │
//! │  ┌──────────────────────┐    ┌────────────────────────┐     │
//! │  │ Mutex<Connection>    │    │ running ticket + abort │     │
//! │  │ (one statement at a  │    │ flag (cancellation)    │     │
//! │  │  time)               │    │                        │     │
//! │  └──────────┬───────────┘    └────────────────────────┘     │
//! └─────────────┼───────────────────────────────────────────────┘
//!               ▼
//!          db.sqlite (users, login_history, file_tracking)
//! ```
//!
//! ## Example
//!
//! ```
//! use sqlrelay::storage::Store;
//!
//! let store = Store::open_in_memory().unwrap();
//! let users: i64 = store
//!     .run(|conn| conn.query_row("SELECT count(*) FROM users", [], |row| row.get(0)))
//!     .unwrap();
//! assert_eq!(users, 0);
//! store.close().unwrap();
//! ```

pub mod engine;
pub mod schema;

// Re-export commonly used types
pub use engine::{Store, StoreError, StoreResult, Ticket};
