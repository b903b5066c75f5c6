//! First-seen direction per category
//!
//! The first `note_direction` call for a category wins. Entries also remember
//! whether their record has reached storage so failed writes can be retried
//! on the next flush instead of being rewritten on every sighting.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use packetlog_shared::utils::time::system_time_millis;
use packetlog_shared::DirectionRecord;
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug)]
struct Known {
    record: DirectionRecord,
    persisted: AtomicBool,
}

#[derive(Debug, Default)]
pub struct BoundKnowledgeCache {
    known: DashMap<String, Known>,
}

impl BoundKnowledgeCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remember `outgoing` for `category` unless it was already seen.
    ///
    /// Returns the new record on first sighting so the caller can queue a
    /// durable write; returns `None` otherwise.
    pub fn note_direction(&self, category: &str, outgoing: bool) -> Option<DirectionRecord> {
        if self.known.contains_key(category) {
            return None;
        }
        match self.known.entry(category.to_owned()) {
            Entry::Occupied(_) => None,
            Entry::Vacant(slot) => {
                let record = DirectionRecord {
                    category: category.to_owned(),
                    outgoing,
                    recorded_at_ms: system_time_millis(),
                };
                slot.insert(Known {
                    record: record.clone(),
                    persisted: AtomicBool::new(false),
                });
                Some(record)
            }
        }
    }

    /// `Some(true)` for outgoing, `Some(false)` for incoming, `None` if never seen.
    pub fn lookup(&self, category: &str) -> Option<bool> {
        self.known.get(category).map(|k| k.record.outgoing)
    }

    pub fn mark_persisted(&self, category: &str) {
        if let Some(known) = self.known.get(category) {
            known.persisted.store(true, Ordering::Release);
        }
    }

    /// Records whose durable write has not succeeded yet.
    pub fn unpersisted(&self) -> Vec<DirectionRecord> {
        let mut records: Vec<DirectionRecord> = self
            .known
            .iter()
            .filter(|k| !k.persisted.load(Ordering::Acquire))
            .map(|k| k.record.clone())
            .collect();
        records.sort_by(|a, b| a.category.cmp(&b.category));
        records
    }

    /// Every known record, sorted by category.
    pub fn records(&self) -> Vec<DirectionRecord> {
        let mut records: Vec<DirectionRecord> =
            self.known.iter().map(|k| k.record.clone()).collect();
        records.sort_by(|a, b| a.category.cmp(&b.category));
        records
    }

    pub fn len(&self) -> usize {
        self.known.len()
    }

    pub fn is_empty(&self) -> bool {
        self.known.is_empty()
    }
}
