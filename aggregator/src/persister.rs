//! Window persistence
//!
//! Turns a [`WindowSnapshot`] into tagged rows and hands them to the store as
//! one transaction. A failed window is logged and dropped; it is never merged
//! back into the live counters.

use crate::direction::BoundKnowledgeCache;
use crate::error::StoreError;
use crate::metrics;
use crate::storage::{AggregateStore, Prepared};
use packetlog_shared::utils::time::system_time_millis;
use packetlog_shared::{DirectionRecord, WindowSnapshot};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, warn};

/// Outcome of one flush cycle
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlushReport {
    pub collected_at_ms: i64,
    /// Rows committed; zero for an empty window
    pub rows: usize,
    /// Sum of counts across the committed rows
    pub events: u64,
}

pub struct Persister {
    store: Arc<dyn AggregateStore>,
    directions: Arc<BoundKnowledgeCache>,
    last_collected_at: AtomicI64,
}

impl Persister {
    pub fn new(store: Arc<dyn AggregateStore>, directions: Arc<BoundKnowledgeCache>) -> Self {
        Self {
            store,
            directions,
            last_collected_at: AtomicI64::new(i64::MIN),
        }
    }

    /// Timestamp for the next window, never earlier than the previous one.
    pub fn next_collected_at(&self) -> i64 {
        let now = system_time_millis();
        let previous = self.last_collected_at.fetch_max(now, Ordering::AcqRel);
        previous.max(now)
    }

    /// Verify the current location exists, e.g. at startup. Fails if storage is unusable.
    pub fn bootstrap(&self) -> Result<Prepared, StoreError> {
        let prepared = self.store.prepare()?;
        if prepared.fresh {
            self.sync_directions(&prepared);
        }
        Ok(prepared)
    }

    /// Persist one window in a single transaction.
    pub fn write_batch(&self, snapshot: WindowSnapshot) -> Result<FlushReport, StoreError> {
        let mut report = FlushReport {
            collected_at_ms: snapshot.collected_at_ms,
            ..FlushReport::default()
        };
        if snapshot.is_empty() {
            debug!(collected_at_ms = snapshot.collected_at_ms, "Empty window, nothing to flush");
            metrics::FLUSH_TOTAL.with_label_values(&["empty"]).inc();
            return Ok(report);
        }

        let rows = snapshot.to_rows(|category| self.directions.lookup(category));
        let start = Instant::now();
        let result = self.store.prepare().and_then(|prepared| {
            self.sync_directions(&prepared);
            self.store.write_rows(&prepared.path, &rows)
        });

        match result {
            Ok(written) => {
                metrics::FLUSH_TOTAL.with_label_values(&["ok"]).inc();
                metrics::FLUSH_ROWS.inc_by(written as f64);
                metrics::FLUSH_DURATION.observe(start.elapsed().as_secs_f64());
                report.rows = written;
                report.events = snapshot.total_events();
                debug!(
                    collected_at_ms = report.collected_at_ms,
                    rows = report.rows,
                    events = report.events,
                    "Flushed window"
                );
                Ok(report)
            }
            Err(e) => {
                metrics::FLUSH_TOTAL.with_label_values(&["error"]).inc();
                metrics::DROPPED_WINDOWS.inc();
                error!(
                    collected_at_ms = snapshot.collected_at_ms,
                    rows = rows.len(),
                    events = snapshot.total_events(),
                    "Flush failed, window dropped: {}",
                    e
                );
                Err(e)
            }
        }
    }

    /// Durably record a first sighting. Failures are logged and retried on the next flush.
    pub fn record_direction(&self, record: &DirectionRecord) {
        match self.store.prepare() {
            Ok(prepared) if prepared.fresh => self.sync_directions(&prepared),
            Ok(prepared) => self.write_directions(&prepared, std::slice::from_ref(record)),
            Err(e) => {
                metrics::DIRECTION_WRITES.with_label_values(&["error"]).inc();
                warn!(category = %record.category, "Direction write skipped: {}", e);
            }
        }
    }

    /// Write whatever the location is missing: everything after a rotation,
    /// otherwise only records whose earlier write failed.
    fn sync_directions(&self, prepared: &Prepared) {
        let pending = if prepared.fresh {
            self.directions.records()
        } else {
            self.directions.unpersisted()
        };
        if !pending.is_empty() {
            self.write_directions(prepared, &pending);
        }
    }

    fn write_directions(&self, prepared: &Prepared, records: &[DirectionRecord]) {
        match self.store.write_directions(&prepared.path, records) {
            Ok(inserted) => {
                metrics::DIRECTION_WRITES.with_label_values(&["ok"]).inc();
                for record in records {
                    self.directions.mark_persisted(&record.category);
                }
                debug!(records = records.len(), inserted, "Direction records written");
            }
            Err(e) => {
                metrics::DIRECTION_WRITES.with_label_values(&["error"]).inc();
                warn!(records = records.len(), "Direction write failed: {}", e);
            }
        }
    }
}
