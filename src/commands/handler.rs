//! Command Executor
//!
//! This module turns one statement into one [`Outcome`]. It does not parse
//! SQL; the only distinction it makes is whether the text starts with
//! `select`:
//!
//! - **Query path**: run the statement and render every returned row.
//! - **Write path**: run the statement, commit right away, and report the
//!   new rowid when the statement inserted one.
//!
//! Every error from SQLite becomes [`Outcome::Failure`] with SQLite's own
//! message. Nothing is retried.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     CommandHandler                          │
//! │                                                             │
//! │  ┌─────────────┐    ┌───────────────┐    ┌─────────────┐    │
//! │  │ classify()  │───>│ spawn_blocking│───>│ run_query / │    │
//! │  │             │    │ + timeout     │    │ run_write   │    │
//! │  └─────────────┘    └───────────────┘    └─────────────┘    │
//! │                                                 │           │
//! │                                                 ▼           │
//! │                                               Store         │
//! └─────────────────────────────────────────────────────────────┘
//! ```

use crate::commands::render::render_row;
use crate::protocol::{Outcome, STATEMENT_TIMED_OUT};
use crate::storage::{Store, StoreError, Ticket};
use rusqlite::{ffi, Batch, Connection, Statement};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};

/// How a statement is executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    /// Starts with `select`: rows are fetched and returned.
    Query,
    /// Anything else: executed and committed.
    Write,
}

impl StatementKind {
    /// Classifies statement text by its leading word.
    pub fn classify(sql: &str) -> Self {
        if starts_with_ignore_case(sql.trim_start(), "select") {
            StatementKind::Query
        } else {
            StatementKind::Write
        }
    }
}

/// Executes client statements against the shared store.
#[derive(Debug, Clone)]
pub struct CommandHandler {
    /// The shared store
    store: Arc<Store>,
    /// Upper bound on one statement, including time spent waiting for the store
    statement_timeout: Option<Duration>,
}

impl CommandHandler {
    /// Creates a command handler with no statement timeout.
    pub fn new(store: Arc<Store>) -> Self {
        Self {
            store,
            statement_timeout: None,
        }
    }

    /// Sets the statement timeout. `None` disables it.
    pub fn with_statement_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.statement_timeout = timeout;
        self
    }

    /// Returns the shared store.
    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    /// Executes a statement on the blocking pool.
    ///
    /// If the statement timeout elapses first, the statement is cancelled and
    /// the caller gets a timeout failure right away.
    pub async fn execute(&self, sql: String) -> Outcome {
        let ticket = self.store.ticket();

        let job = {
            let store = Arc::clone(&self.store);
            let ticket = Arc::clone(&ticket);
            tokio::task::spawn_blocking(move || execute_with(&store, &ticket, &sql))
        };

        let joined = match self.statement_timeout {
            Some(limit) => match tokio::time::timeout(limit, job).await {
                Ok(joined) => joined,
                Err(_) => {
                    self.store.cancel(&ticket);
                    warn!(
                        ticket = ticket.id(),
                        timeout_ms = limit.as_millis() as u64,
                        "Statement timed out"
                    );
                    return Outcome::failure(STATEMENT_TIMED_OUT);
                }
            },
            None => job.await,
        };

        joined.unwrap_or_else(|e| {
            error!(error = %e, "Statement task failed");
            Outcome::failure(format!("statement task failed: {}", e))
        })
    }

    /// Executes a statement on the current thread.
    pub fn execute_blocking(&self, sql: &str) -> Outcome {
        let ticket = self.store.ticket();
        execute_with(&self.store, &ticket, sql)
    }
}

fn execute_with(store: &Store, ticket: &Ticket, sql: &str) -> Outcome {
    let kind = StatementKind::classify(sql);

    let result = store.with_connection(ticket, |conn| match kind {
        StatementKind::Query => run_query(conn, sql),
        StatementKind::Write => run_write(conn, sql),
    });

    match result {
        Ok(outcome) => {
            debug!(ticket = ticket.id(), ?kind, %outcome, "Statement executed");
            outcome
        }
        Err(StoreError::Cancelled) => Outcome::failure(STATEMENT_TIMED_OUT),
        Err(e) => {
            debug!(ticket = ticket.id(), ?kind, error = %e, "Statement failed");
            Outcome::failure(e.to_string())
        }
    }
}

/// Prepares `sql`, refusing text that holds more than one statement.
///
/// Returns `None` when the text is only comments or semicolons.
fn prepare_single<'c>(
    conn: &'c Connection,
    sql: &str,
) -> rusqlite::Result<Option<Statement<'c>>> {
    let mut batch = Batch::new(conn, sql);
    let Some(first) = batch.next()? else {
        return Ok(None);
    };

    // Anything but comments after the first statement is a second one, even
    // if it cannot be prepared yet (it may depend on the first).
    match batch.next() {
        Ok(None) => Ok(Some(first)),
        Ok(Some(_)) | Err(_) => Err(rusqlite::Error::SqliteFailure(
            ffi::Error::new(ffi::SQLITE_MISUSE),
            Some("You can only execute one statement at a time.".to_string()),
        )),
    }
}

fn run_query(conn: &Connection, sql: &str) -> rusqlite::Result<Outcome> {
    let Some(mut stmt) = prepare_single(conn, sql)? else {
        return Ok(Outcome::Empty);
    };
    let columns = stmt.column_count();
    let mut rows = stmt.query([])?;

    let mut rendered = Vec::new();
    while let Some(row) = rows.next()? {
        rendered.push(render_row(row, columns)?);
    }

    Ok(Outcome::rows(rendered))
}

fn run_write(conn: &Connection, sql: &str) -> rusqlite::Result<Outcome> {
    {
        let Some(mut stmt) = prepare_single(conn, sql)? else {
            return Ok(Outcome::Empty);
        };
        let mut rows = stmt.query([])?;
        // RETURNING clauses and PRAGMAs may yield rows; they are not reported.
        while rows.next()?.is_some() {}
    }

    let inserted = is_insert(sql) && conn.changes() > 0;

    // One commit per statement, including a transaction the statement opened.
    if !conn.is_autocommit() {
        if let Err(e) = conn.execute_batch("COMMIT") {
            // A failed COMMIT leaves the transaction open for the next client.
            if !conn.is_autocommit() {
                if let Err(rollback) = conn.execute_batch("ROLLBACK") {
                    error!(error = %rollback, "Rollback after failed commit failed");
                }
            }
            return Err(e);
        }
    }

    if inserted {
        Ok(Outcome::InsertId(conn.last_insert_rowid()))
    } else {
        Ok(Outcome::Empty)
    }
}

fn is_insert(sql: &str) -> bool {
    let sql = sql.trim_start();
    starts_with_ignore_case(sql, "insert") || starts_with_ignore_case(sql, "replace")
}

fn starts_with_ignore_case(text: &str, prefix: &str) -> bool {
    text.len() >= prefix.len()
        && text.as_bytes()[..prefix.len()].eq_ignore_ascii_case(prefix.as_bytes())
}
