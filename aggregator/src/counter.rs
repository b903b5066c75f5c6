//! Concurrent per-category counters for the current window
//!
//! Producers increment atomics inside a [`DashMap`] that is published through
//! an [`ArcSwap`]. A snapshot swaps in a fresh map and waits for producers that
//! still hold the retired one, so every increment lands in exactly one window.

use arc_swap::ArcSwap;
use dashmap::DashMap;
use packetlog_shared::Aggregate;
use std::sync::atomic::{fence, AtomicU64, Ordering};
use std::sync::Arc;

/// Spins before falling back to `yield_now` while draining producers.
const SPINS_BEFORE_YIELD: u32 = 64;

#[derive(Debug, Default)]
struct Bucket {
    count: AtomicU64,
    bytes: AtomicU64,
}

impl Bucket {
    #[inline]
    fn add(&self, size_bytes: u64) {
        self.count.fetch_add(1, Ordering::Relaxed);
        if size_bytes > 0 {
            self.bytes.fetch_add(size_bytes, Ordering::Relaxed);
        }
    }
}

type Table = DashMap<String, Bucket>;

/// Category -> running count for the live window.
#[derive(Debug)]
pub struct CounterTable {
    live: ArcSwap<Table>,
    track_sizes: bool,
}

impl CounterTable {
    pub fn new(track_sizes: bool) -> Self {
        Self {
            live: ArcSwap::from_pointee(DashMap::new()),
            track_sizes,
        }
    }

    /// Count one event. Never touches storage; only shard-level locks are taken.
    pub fn record(&self, category: &str, size_bytes: u64) {
        let size_bytes = if self.track_sizes { size_bytes } else { 0 };
        // Held until the increment is done so a concurrent snapshot waits for it.
        let table = self.live.load_full();
        if let Some(bucket) = table.get(category) {
            bucket.add(size_bytes);
            return;
        }
        table
            .entry(category.to_owned())
            .or_default()
            .add(size_bytes);
    }

    /// Swap in an empty table and return everything the old one counted,
    /// sorted by category.
    pub fn snapshot_and_reset(&self) -> Vec<Aggregate> {
        let retired = self.live.swap(Arc::new(DashMap::new()));

        let mut spins = 0u32;
        while Arc::strong_count(&retired) > 1 {
            if spins < SPINS_BEFORE_YIELD {
                std::hint::spin_loop();
                spins += 1;
            } else {
                std::thread::yield_now();
            }
        }
        // Pairs with the Release decrement of each producer's dropped handle,
        // so their increments are visible to the loads below.
        fence(Ordering::Acquire);

        let mut aggregates: Vec<Aggregate> = retired
            .iter()
            .map(|entry| Aggregate {
                category: entry.key().clone(),
                count: entry.value().count.load(Ordering::Acquire),
                total_bytes: self
                    .track_sizes
                    .then(|| entry.value().bytes.load(Ordering::Acquire)),
            })
            .collect();
        aggregates.sort_by(|a, b| a.category.cmp(&b.category));
        aggregates
    }

    /// Number of categories counted so far in the live window.
    pub fn len(&self) -> usize {
        self.live.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Live count for `category`, without resetting anything.
    pub fn count_of(&self, category: &str) -> u64 {
        self.live
            .load()
            .get(category)
            .map(|b| b.count.load(Ordering::Acquire))
            .unwrap_or(0)
    }
}

impl Default for CounterTable {
    fn default() -> Self {
        Self::new(true)
    }
}
