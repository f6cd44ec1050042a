//! Shared SQLite Store
//!
//! This module owns the single SQLite connection every client statement
//! runs on. Handlers never touch the connection directly; they borrow it
//! through [`Store::with_connection`], which serializes access with a mutex.
//!
//! ## Concurrency Model
//!
//! ```text
//!   handler ─┐
//!   handler ─┼──> Mutex<Connection> ──> db.sqlite
//!   handler ─┘         │
//!                      └── progress handler (aborts the running statement)
//! ```
//!
//! SQLite already serializes writers, but one `Connection` cannot be used
//! from two threads at once, so the mutex is what actually orders statements.
//! There is no fairness among waiting handlers.
//!
//! ## Cancellation
//!
//! Every statement is tied to a [`Ticket`]. Cancelling a ticket either
//! stops the statement from starting (it is still waiting for the lock) or
//! raises the abort flag that SQLite's progress handler polls while the
//! statement runs, which fails it with `interrupted`. The running ticket and
//! the abort flag only change under their own small lock, so a cancel can
//! never hit a different statement.

use crate::storage::schema;
use rusqlite::Connection;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info, warn};

/// Errors returned by the store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Error reported by SQLite; the message is passed through untouched
    #[error("{}", sqlite_message(.0))]
    Sqlite(#[from] rusqlite::Error),

    /// Could not prepare the directory holding the database file
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The store has been closed
    #[error("store is closed")]
    Closed,

    /// The statement was cancelled before it started
    #[error("statement cancelled")]
    Cancelled,

    /// A previous statement panicked while holding the connection
    #[error("store connection lock poisoned")]
    Poisoned,
}

/// SQLite's own message, without the statement text and offset rusqlite
/// attaches to errors raised while preparing.
fn sqlite_message(err: &rusqlite::Error) -> String {
    match err {
        rusqlite::Error::SqliteFailure(_, Some(msg)) => msg.clone(),
        rusqlite::Error::SqlInputError { msg, .. } => msg.clone(),
        other => other.to_string(),
    }
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Number of SQLite VM instructions between abort checks.
const PROGRESS_INTERVAL_OPS: i32 = 1000;

/// Identifies one statement for cancellation.
#[derive(Debug)]
pub struct Ticket {
    id: u64,
    cancelled: AtomicBool,
}

impl Ticket {
    /// Returns the ticket's identifier.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Returns true once the ticket has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

/// The process-wide handle to the persistent store.
pub struct Store {
    /// `None` once the store has been closed
    connection: Mutex<Option<Connection>>,

    /// Polled by SQLite while a statement runs; `true` aborts it
    abort: Arc<AtomicBool>,

    /// Ticket of the statement currently holding the connection
    running: Mutex<Option<u64>>,

    next_ticket: AtomicU64,

    /// Set once [`Store::close`] starts; no statement may start after it
    closing: AtomicBool,

    /// Path of the database file, or `:memory:`
    location: String,
}

impl Store {
    /// Opens (or creates) the database file and makes sure the schema exists.
    ///
    /// Missing parent directories are created.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let connection = Connection::open(path)?;
        Self::from_connection(connection, path.display().to_string())
    }

    /// Opens a private in-memory store with the schema applied.
    pub fn open_in_memory() -> StoreResult<Self> {
        let connection = Connection::open_in_memory()?;
        Self::from_connection(connection, ":memory:".to_string())
    }

    fn from_connection(connection: Connection, location: String) -> StoreResult<Self> {
        schema::initialize(&connection)?;

        let abort = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&abort);
        connection.progress_handler(
            PROGRESS_INTERVAL_OPS,
            Some(move || flag.load(Ordering::Acquire)),
        );

        info!(location = %location, "Store opened");

        Ok(Self {
            abort,
            connection: Mutex::new(Some(connection)),
            running: Mutex::new(None),
            next_ticket: AtomicU64::new(1),
            closing: AtomicBool::new(false),
            location,
        })
    }

    /// Returns where the store lives.
    pub fn location(&self) -> &str {
        &self.location
    }

    /// Issues a new ticket for one statement.
    pub fn ticket(&self) -> Arc<Ticket> {
        Arc::new(Ticket {
            id: self.next_ticket.fetch_add(1, Ordering::Relaxed),
            cancelled: AtomicBool::new(false),
        })
    }

    /// Runs `f` with exclusive access to the connection.
    ///
    /// Blocks until the connection is free. Returns [`StoreError::Cancelled`]
    /// without calling `f` if the ticket was cancelled while waiting.
    pub fn with_connection<T, F>(&self, ticket: &Ticket, f: F) -> StoreResult<T>
    where
        F: FnOnce(&Connection) -> rusqlite::Result<T>,
    {
        let guard = self.connection.lock().map_err(|_| StoreError::Poisoned)?;
        let connection = guard.as_ref().ok_or(StoreError::Closed)?;

        {
            let mut running = self.running.lock().unwrap_or_else(PoisonError::into_inner);
            if self.closing.load(Ordering::Acquire) {
                return Err(StoreError::Closed);
            }
            if ticket.is_cancelled() {
                debug!(ticket = ticket.id, "Skipping cancelled statement");
                return Err(StoreError::Cancelled);
            }
            *running = Some(ticket.id);
            self.abort.store(false, Ordering::Release);
        }

        let result = f(connection);

        {
            let mut running = self.running.lock().unwrap_or_else(PoisonError::into_inner);
            *running = None;
            if !self.closing.load(Ordering::Acquire) {
                self.abort.store(false, Ordering::Release);
            }
        }

        Ok(result?)
    }

    /// Runs `f` under a fresh ticket that is never cancelled.
    pub fn run<T, F>(&self, f: F) -> StoreResult<T>
    where
        F: FnOnce(&Connection) -> rusqlite::Result<T>,
    {
        let ticket = self.ticket();
        self.with_connection(&ticket, f)
    }

    /// Cancels the statement tied to `ticket`.
    ///
    /// A statement still waiting for the connection will not run. A statement
    /// that is running is aborted and fails with SQLite's `interrupted` error.
    pub fn cancel(&self, ticket: &Ticket) {
        let running = self.running.lock().unwrap_or_else(PoisonError::into_inner);
        ticket.cancelled.store(true, Ordering::Release);

        if *running == Some(ticket.id) {
            debug!(ticket = ticket.id, "Aborting running statement");
            self.abort.store(true, Ordering::Release);
        }
    }

    /// Returns true once [`Store::close`] has succeeded.
    pub fn is_closed(&self) -> bool {
        self.connection
            .lock()
            .map(|guard| guard.is_none())
            .unwrap_or(true)
    }

    /// Commits any open transaction and closes the connection.
    ///
    /// A statement that is still running is aborted, and statements waiting
    /// for the connection never start. Later statements fail with
    /// [`StoreError::Closed`]. Closing twice is a no-op.
    pub fn close(&self) -> StoreResult<()> {
        {
            let running = self.running.lock().unwrap_or_else(PoisonError::into_inner);
            self.closing.store(true, Ordering::Release);
            if let Some(id) = *running {
                debug!(ticket = id, "Aborting running statement for close");
                self.abort.store(true, Ordering::Release);
            }
        }

        let mut guard = self.connection.lock().map_err(|_| StoreError::Poisoned)?;

        let Some(connection) = guard.take() else {
            return Ok(());
        };

        // Nothing can start any more; let the final commit run.
        self.abort.store(false, Ordering::Release);

        if !connection.is_autocommit() {
            if let Err(e) = connection.execute_batch("COMMIT") {
                warn!(error = %e, "Failed to commit open transaction on close");
            }
        }

        match connection.close() {
            Ok(()) => {
                info!(location = %self.location, "Store closed");
                Ok(())
            }
            Err((connection, e)) => {
                *guard = Some(connection);
                Err(StoreError::Sqlite(e))
            }
        }
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("location", &self.location)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn count_users(store: &Store) -> i64 {
        store
            .run(|conn| conn.query_row("SELECT count(*) FROM users", [], |row| row.get(0)))
            .unwrap()
    }

    #[test]
    fn test_open_in_memory_has_schema() {
        let store = Store::open_in_memory().unwrap();
        assert_eq!(store.location(), ":memory:");
        assert_eq!(count_users(&store), 0);
    }

    #[test]
    fn test_open_creates_parent_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("db.sqlite");

        let store = Store::open(&path).unwrap();
        assert!(path.exists());
        store.close().unwrap();
    }

    #[test]
    fn test_sqlite_error_passes_through() {
        let store = Store::open_in_memory().unwrap();
        let err = store
            .run(|conn| conn.execute("INSERT INTO nope VALUES (1)", []))
            .unwrap_err();

        assert!(matches!(err, StoreError::Sqlite(_)));
        assert_eq!(err.to_string(), "no such table: nope");
    }

    #[test]
    fn test_tickets_are_unique() {
        let store = Store::open_in_memory().unwrap();
        let a = store.ticket();
        let b = store.ticket();
        assert_ne!(a.id(), b.id());
        assert!(!a.is_cancelled());
    }

    #[test]
    fn test_cancelled_ticket_never_runs() {
        let store = Store::open_in_memory().unwrap();
        let ticket = store.ticket();
        store.cancel(&ticket);

        let mut called = false;
        let result = store.with_connection(&ticket, |_| {
            called = true;
            Ok(())
        });

        assert!(matches!(result, Err(StoreError::Cancelled)));
        assert!(!called);
    }

    #[test]
    fn test_cancel_interrupts_running_statement() {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let ticket = store.ticket();

        let worker = {
            let store = Arc::clone(&store);
            let ticket = Arc::clone(&ticket);
            std::thread::spawn(move || {
                store.with_connection(&ticket, |conn| {
                    conn.query_row(
                        "WITH RECURSIVE c(x) AS (SELECT 1 UNION ALL SELECT x + 1 FROM c) \
                         SELECT count(*) FROM c",
                        [],
                        |row| row.get::<_, i64>(0),
                    )
                })
            })
        };

        // Wait until the statement holds the connection.
        while *store.running.lock().unwrap() != Some(ticket.id()) {
            std::thread::sleep(std::time::Duration::from_millis(5));
        }
        store.cancel(&ticket);

        let err = worker.join().unwrap().unwrap_err();
        assert!(matches!(err, StoreError::Sqlite(_)));
        assert_eq!(err.to_string(), "interrupted");

        // The connection is usable again afterwards.
        assert_eq!(count_users(&store), 0);
    }

    #[test]
    fn test_close_rejects_later_statements() {
        let store = Store::open_in_memory().unwrap();
        store.close().unwrap();

        assert!(store.is_closed());
        assert!(matches!(
            store.run(|conn| conn.execute("SELECT 1", [])),
            Err(StoreError::Closed)
        ));

        // Closing again is fine.
        store.close().unwrap();
    }

    #[test]
    fn test_close_aborts_running_statement() {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let ticket = store.ticket();

        let worker = {
            let store = Arc::clone(&store);
            let ticket = Arc::clone(&ticket);
            std::thread::spawn(move || {
                store.with_connection(&ticket, |conn| {
                    conn.query_row(
                        "WITH RECURSIVE c(x) AS (SELECT 1 UNION ALL SELECT x + 1 FROM c) \
                         SELECT count(*) FROM c",
                        [],
                        |row| row.get::<_, i64>(0),
                    )
                })
            })
        };

        while *store.running.lock().unwrap() != Some(ticket.id()) {
            std::thread::sleep(std::time::Duration::from_millis(5));
        }
        store.close().unwrap();

        let err = worker.join().unwrap().unwrap_err();
        assert_eq!(err.to_string(), "interrupted");
        assert!(store.is_closed());
        assert!(matches!(
            store.run(|conn| conn.execute("SELECT 1", [])),
            Err(StoreError::Closed)
        ));
    }

    #[test]
    fn test_close_commits_open_transaction() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("db.sqlite");

        let store = Store::open(&path).unwrap();
        store
            .run(|conn| {
                conn.execute_batch(
                    "BEGIN; INSERT INTO users (username, password) VALUES ('carol', 'pw');",
                )
            })
            .unwrap();
        store.close().unwrap();

        let reopened = Store::open(&path).unwrap();
        assert_eq!(count_users(&reopened), 1);
    }
}
