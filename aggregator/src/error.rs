//! Error types for the storage layer and the service facade

use std::path::PathBuf;
use thiserror::Error;

/// Failures raised while bootstrapping or writing to a store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("storage worker failed: {0}")]
    Worker(String),
}

impl StoreError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        StoreError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Failures surfaced by [`crate::service::AggregationService`].
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Storage could not be prepared at startup; the service must not run.
    #[error("storage bootstrap failed: {0}")]
    Bootstrap(#[source] StoreError),

    #[error("flush failed: {0}")]
    Flush(#[source] StoreError),

    #[error("aggregation service is stopped")]
    Stopped,
}
