//! Storage backends
//!
//! The aggregation worker talks to storage only through [`AggregateStore`].
//! Every call happens on the single flush worker, so implementations never see
//! two transactions at once.

pub mod bootstrap;
pub mod layout;
pub mod sqlite;

use crate::error::StoreError;
use packetlog_shared::{DirectionRecord, PersistedBatchRow};
use std::path::{Path, PathBuf};

pub use layout::LocationResolver;
pub use sqlite::SqliteStore;

/// Location resolved (and bootstrapped if needed) for the next write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prepared {
    pub path: PathBuf,
    /// The schema was just created or re-verified at `path`, e.g. after a
    /// daily rotation. Callers re-seed direction rows when this is set.
    pub fresh: bool,
}

/// Durable destination for window aggregates and direction records.
pub trait AggregateStore: Send + Sync {
    /// Resolve the current location and make sure its schema exists.
    fn prepare(&self) -> Result<Prepared, StoreError>;

    /// Insert all `rows` in a single transaction. Either every row commits or none does.
    fn write_rows(&self, location: &Path, rows: &[PersistedBatchRow]) -> Result<usize, StoreError>;

    /// Insert direction records, ignoring categories already present.
    fn write_directions(
        &self,
        location: &Path,
        records: &[DirectionRecord],
    ) -> Result<usize, StoreError>;
}
