//! Idempotent schema creation
//!
//! Safe to run against the same file any number of times: the directory,
//! file, tables and indexes are only created when missing.

use crate::error::StoreError;
use rusqlite::Connection;
use std::path::Path;
use std::time::Duration;
use tracing::info;

/// Readers (reporting scripts) may hold the file briefly.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

pub const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS aggregate_events (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    category      TEXT NOT NULL,
    count         INTEGER NOT NULL,
    size_bytes    INTEGER,
    outgoing      INTEGER,
    collected_at  INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_aggregate_category_time
    ON aggregate_events(category, collected_at);

CREATE TABLE IF NOT EXISTS category_direction (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    category      TEXT NOT NULL,
    outgoing      INTEGER NOT NULL
);
CREATE UNIQUE INDEX IF NOT EXISTS idx_direction_category
    ON category_direction(category);
";

/// Open a connection to an existing or new storage file.
pub fn open(path: &Path) -> Result<Connection, StoreError> {
    let conn = Connection::open(path)?;
    conn.busy_timeout(BUSY_TIMEOUT)?;
    Ok(conn)
}

/// Create the containing directory, the file and both tables if absent.
pub fn ensure_ready(path: &Path) -> Result<(), StoreError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|e| StoreError::io(parent, e))?;
        }
    }

    let conn = open(path)?;
    let mode: String =
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
    conn.execute_batch(SCHEMA)?;

    info!(path = %path.display(), journal_mode = %mode, "Storage schema ready");
    Ok(())
}
