//! Window aggregates and the rows they are persisted as
//!
//! An [`Aggregate`] lives in memory for one flush window. At flush time the
//! whole window becomes a [`WindowSnapshot`], which is tagged with directions
//! and turned into [`PersistedBatchRow`]s sharing one `collected_at` stamp.

use serde::{Deserialize, Serialize};

use super::category::CategoryKey;

/// Count (and optional byte total) of one category within a window
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Aggregate {
    pub category: CategoryKey,
    pub count: u64,
    /// `None` when byte-size tracking is disabled
    pub total_bytes: Option<u64>,
}

/// First observed direction of a category. Write-once per process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectionRecord {
    pub category: CategoryKey,
    pub outgoing: bool,
    /// Milliseconds since Unix epoch
    pub recorded_at_ms: i64,
}

/// One row of the `aggregate_events` table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedBatchRow {
    pub category: CategoryKey,
    pub count: i64,
    pub size_bytes: Option<i64>,
    pub outgoing: Option<bool>,
    /// Milliseconds since Unix epoch, shared by every row of a window
    pub collected_at_ms: i64,
}

/// Everything captured for one window, ready to be persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WindowSnapshot {
    pub collected_at_ms: i64,
    pub aggregates: Vec<Aggregate>,
}

impl WindowSnapshot {
    pub fn new(collected_at_ms: i64, aggregates: Vec<Aggregate>) -> Self {
        Self {
            collected_at_ms,
            aggregates,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.aggregates.is_empty()
    }

    /// Total number of events across all categories of the window.
    pub fn total_events(&self) -> u64 {
        self.aggregates.iter().map(|a| a.count).sum()
    }

    /// Build storage rows, attributing each category a direction via `direction_of`.
    ///
    /// Counts above `i64::MAX` saturate; SQLite integers are signed.
    pub fn to_rows<F>(&self, direction_of: F) -> Vec<PersistedBatchRow>
    where
        F: Fn(&str) -> Option<bool>,
    {
        self.aggregates
            .iter()
            .map(|agg| PersistedBatchRow {
                category: agg.category.clone(),
                count: saturating_i64(agg.count),
                size_bytes: agg.total_bytes.map(saturating_i64),
                outgoing: direction_of(&agg.category),
                collected_at_ms: self.collected_at_ms,
            })
            .collect()
    }
}

fn saturating_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}
