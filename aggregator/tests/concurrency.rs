//! Concurrency properties: serialized transactions and exact totals.

use packetlog_aggregator::storage::{AggregateStore, Prepared};
use packetlog_aggregator::{AggregationService, AggregatorConfig, FlushState, StoreError};
use packetlog_shared::{DirectionRecord, PersistedBatchRow};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

/// Store that holds every transaction open for a while and tracks overlap.
#[derive(Default)]
struct SlowStore {
    active: AtomicUsize,
    max_active: AtomicUsize,
    row_transactions: AtomicUsize,
    rows: Mutex<Vec<PersistedBatchRow>>,
}

impl SlowStore {
    fn enter(&self) {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);
    }

    fn leave(&self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }

    fn totals(&self) -> HashMap<String, i64> {
        let mut totals = HashMap::new();
        for row in self.rows.lock().unwrap().iter() {
            *totals.entry(row.category.clone()).or_insert(0) += row.count;
        }
        totals
    }
}

impl AggregateStore for SlowStore {
    fn prepare(&self) -> Result<Prepared, StoreError> {
        Ok(Prepared {
            path: PathBuf::from("slow"),
            fresh: false,
        })
    }

    fn write_rows(&self, _: &Path, rows: &[PersistedBatchRow]) -> Result<usize, StoreError> {
        self.enter();
        self.row_transactions.fetch_add(1, Ordering::SeqCst);
        thread::sleep(Duration::from_millis(80));
        self.rows.lock().unwrap().extend_from_slice(rows);
        self.leave();
        Ok(rows.len())
    }

    fn write_directions(&self, _: &Path, records: &[DirectionRecord]) -> Result<usize, StoreError> {
        self.enter();
        thread::sleep(Duration::from_millis(5));
        self.leave();
        Ok(records.len())
    }
}

fn config() -> AggregatorConfig {
    AggregatorConfig {
        flush_seconds: 3600,
        ..AggregatorConfig::default()
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn back_to_back_triggers_never_overlap() {
    let store = Arc::new(SlowStore::default());
    let service = Arc::new(AggregationService::start(&config(), store.clone()).await.unwrap());

    service.record("A", true, 0);
    let first = {
        let service = service.clone();
        tokio::spawn(async move { service.flush_now().await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;

    service.record("B", false, 0);
    let second = {
        let service = service.clone();
        tokio::spawn(async move { service.flush_now().await })
    };
    service.request_flush();
    service.request_flush();

    let first = first.await.unwrap().unwrap();
    let second = second.await.unwrap().unwrap();
    service.shutdown().await.unwrap();

    assert_eq!(store.max_active.load(Ordering::SeqCst), 1);
    assert!(second.collected_at_ms >= first.collected_at_ms);
    assert!(store.row_transactions.load(Ordering::SeqCst) >= 1);

    let totals = store.totals();
    assert_eq!(totals.get("A"), Some(&1));
    assert_eq!(totals.get("B"), Some(&1));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_producers_and_flushes_count_exactly() {
    const PRODUCERS: usize = 6;
    const PER_PRODUCER: usize = 5_000;

    let store = Arc::new(SlowStore::default());
    let service = Arc::new(AggregationService::start(&config(), store.clone()).await.unwrap());

    let producers: Vec<_> = (0..PRODUCERS)
        .map(|p| {
            let service = service.clone();
            thread::spawn(move || {
                for i in 0..PER_PRODUCER {
                    let category = format!("Packet{}", (i + p) % 5);
                    service.record(&category, i % 2 == 0, 1);
                }
            })
        })
        .collect();

    for _ in 0..5 {
        service.request_flush();
        let _ = service.flush_now().await;
    }

    for producer in producers {
        producer.join().unwrap();
    }
    service.shutdown().await.unwrap();

    let total: i64 = store.totals().values().sum();
    assert_eq!(total, (PRODUCERS * PER_PRODUCER) as i64);
    assert_eq!(store.max_active.load(Ordering::SeqCst), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn state_follows_the_flush_lifecycle() {
    let store = Arc::new(SlowStore::default());
    let service = Arc::new(AggregationService::start(&config(), store.clone()).await.unwrap());
    assert_eq!(service.state(), FlushState::Idle);

    service.record("Handshake", true, 0);
    let flush = {
        let service = service.clone();
        tokio::spawn(async move { service.flush_now().await })
    };

    let observed = tokio::time::timeout(Duration::from_secs(5), async {
        while service.state() != FlushState::Flushing {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    })
    .await;
    assert!(observed.is_ok(), "never observed a flush in progress");

    let report = flush.await.unwrap().unwrap();
    assert_eq!(report.rows, 1);
    assert_eq!(service.state(), FlushState::Idle);

    service.shutdown().await.unwrap();
    assert_eq!(service.state(), FlushState::Stopped);
}
