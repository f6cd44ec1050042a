//! Bookkeeping schema used by the message router.
//!
//! The relay never looks inside these tables; it only makes sure they exist
//! before the first client connects.

use rusqlite::Connection;

/// Tables created at startup.
pub const TABLES: [&str; 3] = ["users", "login_history", "file_tracking"];

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS users (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    username TEXT NOT NULL UNIQUE,
    password TEXT NOT NULL,
    registration_date TEXT
);

CREATE TABLE IF NOT EXISTS login_history (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    username TEXT NOT NULL,
    login_time TEXT,
    logout_time TEXT
);

CREATE TABLE IF NOT EXISTS file_tracking (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    username TEXT NOT NULL,
    filename TEXT NOT NULL,
    upload_time TEXT,
    game_channel TEXT
);
";

/// Creates the schema if it is missing. Safe to call on every startup.
pub fn initialize(connection: &Connection) -> rusqlite::Result<()> {
    connection.execute_batch(&format!("BEGIN;{SCHEMA}COMMIT;"))
}
