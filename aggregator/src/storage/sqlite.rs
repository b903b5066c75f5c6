//! SQLite storage backend
//!
//! Each call opens its own connection and closes it before returning, so the
//! daily layout can move to a new file between flushes. A window is written
//! as multi-row INSERTs of at most `chunk_size` rows inside one transaction.

use super::{bootstrap, AggregateStore, LocationResolver, Prepared};
use crate::config::AggregatorConfig;
use crate::error::StoreError;
use chrono::{DateTime, Local};
use packetlog_shared::{DirectionRecord, PersistedBatchRow};
use rusqlite::{params, ToSql, Transaction};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, warn};

const INSERT_PREFIX: &str =
    "INSERT INTO aggregate_events (category, count, size_bytes, outgoing, collected_at) VALUES ";
const ROW_PLACEHOLDERS: &str = "(?, ?, ?, ?, ?)";

pub struct SqliteStore {
    resolver: LocationResolver,
    chunk_size: usize,
    /// Last location whose schema was verified
    current: Mutex<Option<PathBuf>>,
}

impl SqliteStore {
    pub fn new(resolver: LocationResolver, chunk_size: usize) -> Self {
        Self {
            resolver,
            chunk_size: chunk_size.max(1),
            current: Mutex::new(None),
        }
    }

    pub fn from_config(config: &AggregatorConfig) -> Self {
        Self::new(
            LocationResolver::new(&config.data_dir, config.layout),
            config.chunk_size,
        )
    }

    /// Resolve the location for `now`, bootstrapping it when it changed or vanished.
    pub fn prepare_at(&self, now: &DateTime<Local>) -> Result<Prepared, StoreError> {
        let path = self.resolver.path_at(now);
        let mut current = self
            .current
            .lock()
            .map_err(|_| StoreError::Worker("storage location lock poisoned".to_string()))?;

        if current.as_deref() == Some(path.as_path()) && path.exists() {
            return Ok(Prepared { path, fresh: false });
        }

        if let Some(previous) = current.as_deref() {
            tracing::info!(
                from = %previous.display(),
                to = %path.display(),
                "Storage location changed"
            );
        }
        bootstrap::ensure_ready(&path)?;
        *current = Some(path.clone());
        Ok(Prepared { path, fresh: true })
    }
}

impl AggregateStore for SqliteStore {
    fn prepare(&self) -> Result<Prepared, StoreError> {
        self.prepare_at(&Local::now())
    }

    fn write_rows(&self, location: &Path, rows: &[PersistedBatchRow]) -> Result<usize, StoreError> {
        if rows.is_empty() {
            return Ok(0);
        }

        let mut conn = bootstrap::open(location)?;
        let tx = conn.transaction()?;
        if let Err(e) = insert_chunked(&tx, rows, self.chunk_size) {
            if let Err(rollback_err) = tx.rollback() {
                warn!("Rollback after failed insert also failed: {}", rollback_err);
            }
            return Err(e.into());
        }
        tx.commit()?;

        debug!(
            path = %location.display(),
            rows = rows.len(),
            chunks = rows.len().div_ceil(self.chunk_size),
            "Committed aggregate rows"
        );
        Ok(rows.len())
    }

    fn write_directions(
        &self,
        location: &Path,
        records: &[DirectionRecord],
    ) -> Result<usize, StoreError> {
        if records.is_empty() {
            return Ok(0);
        }

        let mut conn = bootstrap::open(location)?;
        let tx = conn.transaction()?;
        let mut inserted = 0;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT OR IGNORE INTO category_direction (category, outgoing) VALUES (?1, ?2)",
            )?;
            for record in records {
                inserted += stmt.execute(params![record.category, record.outgoing])?;
            }
        }
        tx.commit()?;
        Ok(inserted)
    }
}

fn insert_sql(rows: usize) -> String {
    let mut sql = String::with_capacity(INSERT_PREFIX.len() + rows * (ROW_PLACEHOLDERS.len() + 2));
    sql.push_str(INSERT_PREFIX);
    for i in 0..rows {
        if i > 0 {
            sql.push_str(", ");
        }
        sql.push_str(ROW_PLACEHOLDERS);
    }
    sql
}

/// Submit `rows` as one statement per chunk. Does not commit.
fn insert_chunked(
    tx: &Transaction<'_>,
    rows: &[PersistedBatchRow],
    chunk_size: usize,
) -> rusqlite::Result<()> {
    for chunk in rows.chunks(chunk_size) {
        let mut stmt = tx.prepare_cached(&insert_sql(chunk.len()))?;
        let mut values: Vec<&dyn ToSql> = Vec::with_capacity(chunk.len() * 5);
        for row in chunk {
            values.push(&row.category);
            values.push(&row.count);
            values.push(&row.size_bytes);
            values.push(&row.outgoing);
            values.push(&row.collected_at_ms);
        }
        stmt.execute(values.as_slice())?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{StorageLayout, DEFAULT_CHUNK_SIZE};
    use chrono::TimeZone;
    use rusqlite::Connection;
    use tempfile::tempdir;

    fn row(category: &str, count: i64, collected_at_ms: i64) -> PersistedBatchRow {
        PersistedBatchRow {
            category: category.to_string(),
            count,
            size_bytes: Some(count * 10),
            outgoing: Some(count % 2 == 0),
            collected_at_ms,
        }
    }

    fn session_store(root: &Path, chunk_size: usize) -> SqliteStore {
        SqliteStore::new(LocationResolver::new(root, StorageLayout::Session), chunk_size)
    }

    fn count_rows(path: &Path, table: &str) -> i64 {
        let conn = Connection::open(path).unwrap();
        conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |r| r.get(0))
            .unwrap()
    }

    #[test]
    fn test_insert_sql_shape() {
        assert_eq!(
            insert_sql(2),
            format!("{}(?, ?, ?, ?, ?), (?, ?, ?, ?, ?)", INSERT_PREFIX)
        );
    }

    #[test]
    fn test_write_rows_across_chunks() {
        let dir = tempdir().unwrap();
        let store = session_store(dir.path(), DEFAULT_CHUNK_SIZE);
        let prepared = store.prepare().unwrap();
        assert!(prepared.fresh);

        let rows: Vec<_> = (0..40).map(|i| row(&format!("cat-{:02}", i), i + 1, 1_000)).collect();
        assert_eq!(store.write_rows(&prepared.path, &rows).unwrap(), 40);
        assert_eq!(count_rows(&prepared.path, "aggregate_events"), 40);

        let conn = Connection::open(&prepared.path).unwrap();
        let (count, size, outgoing): (i64, Option<i64>, Option<bool>) = conn
            .query_row(
                "SELECT count, size_bytes, outgoing FROM aggregate_events WHERE category = 'cat-03'",
                [],
                |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
            )
            .unwrap();
        assert_eq!((count, size, outgoing), (4, Some(40), Some(true)));
    }

    #[test]
    fn test_failed_chunk_rolls_back_whole_window() {
        let dir = tempdir().unwrap();
        let store = session_store(dir.path(), 15);
        let prepared = store.prepare().unwrap();

        // Abort on a category that sorts into the third chunk.
        let conn = Connection::open(&prepared.path).unwrap();
        conn.execute_batch(
            "CREATE TRIGGER reject_poison BEFORE INSERT ON aggregate_events
             WHEN NEW.category = 'zz-poison'
             BEGIN SELECT RAISE(ABORT, 'poisoned row'); END;",
        )
        .unwrap();
        drop(conn);

        let mut rows: Vec<_> = (0..35).map(|i| row(&format!("cat-{:02}", i), 1, 2_000)).collect();
        rows.push(row("zz-poison", 1, 2_000));

        let result = store.write_rows(&prepared.path, &rows);
        assert!(matches!(result, Err(StoreError::Sqlite(_))));
        assert_eq!(count_rows(&prepared.path, "aggregate_events"), 0);
    }

    #[test]
    fn test_directions_are_written_once() {
        let dir = tempdir().unwrap();
        let store = session_store(dir.path(), DEFAULT_CHUNK_SIZE);
        let prepared = store.prepare().unwrap();

        let record = DirectionRecord {
            category: "Handshake".to_string(),
            outgoing: true,
            recorded_at_ms: 1,
        };
        assert_eq!(store.write_directions(&prepared.path, &[record.clone()]).unwrap(), 1);
        assert_eq!(store.write_directions(&prepared.path, &[record]).unwrap(), 0);
        assert_eq!(count_rows(&prepared.path, "category_direction"), 1);
    }

    #[test]
    fn test_prepare_only_bootstraps_on_change() {
        let dir = tempdir().unwrap();
        let resolver = LocationResolver::with_start(
            dir.path(),
            StorageLayout::Daily,
            Local.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap(),
        );
        let store = SqliteStore::new(resolver, DEFAULT_CHUNK_SIZE);

        let day_one = Local.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap();
        let day_two = Local.with_ymd_and_hms(2024, 5, 2, 0, 0, 1).unwrap();

        let first = store.prepare_at(&day_one).unwrap();
        assert!(first.fresh);
        assert!(!store.prepare_at(&day_one).unwrap().fresh);

        let rotated = store.prepare_at(&day_two).unwrap();
        assert!(rotated.fresh);
        assert_ne!(first.path, rotated.path);
        assert!(rotated.path.ends_with("2024-05-02/packets.sqlite"));
    }

    #[test]
    fn test_prepare_recreates_deleted_file() {
        let dir = tempdir().unwrap();
        let store = session_store(dir.path(), DEFAULT_CHUNK_SIZE);
        let first = store.prepare().unwrap();
        std::fs::remove_file(&first.path).unwrap();

        let again = store.prepare().unwrap();
        assert!(again.fresh);
        assert!(again.path.exists());
    }
}
