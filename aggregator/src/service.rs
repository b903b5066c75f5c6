//! Aggregation service facade
//!
//! One instance per process, constructed by the host and passed to whatever
//! observes packets. `record` is the only hot-path call; it never touches
//! storage and has no error channel. Lifecycle is explicit:
//! [`AggregationService::start`] (or [`AggregationService::open`]),
//! [`AggregationService::start_publish`], and [`AggregationService::shutdown`].

use crate::config::AggregatorConfig;
use crate::counter::CounterTable;
use crate::direction::BoundKnowledgeCache;
use crate::error::ServiceError;
use crate::metrics;
use crate::persister::{FlushReport, Persister};
use crate::scheduler::{run_timer, FlushScheduler, FlushState, Job};
use crate::storage::{AggregateStore, SqliteStore};
use packetlog_shared::normalize_category;
use std::sync::atomic::AtomicU8;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, Notify};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, trace, warn};

type WorkerHandle = JoinHandle<Result<FlushReport, crate::error::StoreError>>;

pub struct AggregationService {
    counters: Arc<CounterTable>,
    directions: Arc<BoundKnowledgeCache>,
    jobs: mpsc::UnboundedSender<Job>,
    trigger: Arc<Notify>,
    cancel: CancellationToken,
    state: Arc<AtomicU8>,
    worker: Mutex<Option<WorkerHandle>>,
    timer: Mutex<Option<JoinHandle<()>>>,
}

impl AggregationService {
    /// Bootstrap `store` and spawn the flush worker.
    ///
    /// Fails with [`ServiceError::Bootstrap`] when the storage location cannot
    /// be prepared; the host should not start packet collection in that case.
    /// Must be called from within a Tokio runtime.
    pub async fn start(
        config: &AggregatorConfig,
        store: Arc<dyn AggregateStore>,
    ) -> Result<Self, ServiceError> {
        let counters = Arc::new(CounterTable::new(config.track_sizes));
        let directions = Arc::new(BoundKnowledgeCache::new());
        let persister = Arc::new(Persister::new(store, directions.clone()));

        let bootstrap = persister.clone();
        let prepared = tokio::task::spawn_blocking(move || bootstrap.bootstrap())
            .await
            .map_err(|e| ServiceError::Bootstrap(crate::error::StoreError::Worker(e.to_string())))?
            .map_err(ServiceError::Bootstrap)?;
        info!(path = %prepared.path.display(), "Aggregation storage ready");

        let (jobs, receiver) = mpsc::unbounded_channel();
        let trigger = Arc::new(Notify::new());
        let cancel = CancellationToken::new();
        let state = Arc::new(AtomicU8::new(FlushState::Idle as u8));

        let scheduler = FlushScheduler::new(counters.clone(), persister, state.clone());
        let worker = tokio::spawn(scheduler.run(receiver, trigger.clone(), cancel.clone()));

        Ok(Self {
            counters,
            directions,
            jobs,
            trigger,
            cancel,
            state,
            worker: Mutex::new(Some(worker)),
            timer: Mutex::new(None),
        })
    }

    /// Start against the SQLite store described by `config` and begin
    /// publishing every `flush_seconds`.
    pub async fn open(config: &AggregatorConfig) -> Result<Self, ServiceError> {
        let store = Arc::new(SqliteStore::from_config(config));
        let service = Self::start(config, store).await?;
        service.start_publish(config.flush_interval())?;
        Ok(service)
    }

    /// Count one packet. Returns immediately; cannot fail.
    pub fn record(&self, category: &str, outgoing: bool, size_bytes: u64) {
        let category = normalize_category(category);
        self.note_direction(category, outgoing);
        self.counters.record(category, size_bytes);
        metrics::RECORDED_EVENTS.inc();
    }

    /// Remember the first-seen direction of `category`, queueing a durable write on first sighting.
    pub fn note_direction(&self, category: &str, outgoing: bool) {
        let category = normalize_category(category);
        if let Some(record) = self.directions.note_direction(category, outgoing) {
            if self.jobs.send(Job::Direction(record)).is_err() {
                trace!(category, "Worker stopped, direction kept in memory only");
            }
        }
    }

    /// Arm (or re-arm) the periodic flush trigger.
    pub fn start_publish(&self, period: Duration) -> Result<(), ServiceError> {
        if self.cancel.is_cancelled() {
            return Err(ServiceError::Stopped);
        }
        let period = period.max(Duration::from_millis(1));
        let handle = tokio::spawn(run_timer(
            period,
            self.trigger.clone(),
            self.cancel.child_token(),
        ));

        let mut timer = self.timer.lock().map_err(|_| ServiceError::Stopped)?;
        if let Some(previous) = timer.replace(handle) {
            previous.abort();
        }
        info!(period_ms = period.as_millis() as u64, "Periodic flush armed");
        Ok(())
    }

    /// Ask for a flush without waiting. Requests made while one is pending coalesce.
    pub fn request_flush(&self) {
        self.trigger.notify_one();
    }

    /// Flush the current window and wait for the transaction to finish.
    pub async fn flush_now(&self) -> Result<FlushReport, ServiceError> {
        let (reply, result) = oneshot::channel();
        self.jobs
            .send(Job::Flush(reply))
            .map_err(|_| ServiceError::Stopped)?;
        result
            .await
            .map_err(|_| ServiceError::Stopped)?
            .map_err(ServiceError::Flush)
    }

    /// Stop the timer, let the worker drain, and run the final flush.
    ///
    /// Any flush already in progress completes first. Calling this twice
    /// returns [`ServiceError::Stopped`].
    pub async fn shutdown(&self) -> Result<FlushReport, ServiceError> {
        self.cancel.cancel();

        let timer = self.timer.lock().map_err(|_| ServiceError::Stopped)?.take();
        if let Some(timer) = timer {
            if let Err(e) = timer.await {
                if !e.is_cancelled() {
                    warn!("Flush timer ended abnormally: {}", e);
                }
            }
        }

        let worker = self
            .worker
            .lock()
            .map_err(|_| ServiceError::Stopped)?
            .take()
            .ok_or(ServiceError::Stopped)?;
        let report = match worker.await {
            Ok(result) => result.map_err(ServiceError::Flush)?,
            Err(e) => {
                return Err(ServiceError::Flush(crate::error::StoreError::Worker(
                    e.to_string(),
                )))
            }
        };
        info!(rows = report.rows, events = report.events, "Aggregation service stopped");
        Ok(report)
    }

    pub fn state(&self) -> FlushState {
        FlushScheduler::state_of(&self.state)
    }

    pub fn is_running(&self) -> bool {
        !self.cancel.is_cancelled()
    }

    pub fn counters(&self) -> &CounterTable {
        &self.counters
    }
}

impl Drop for AggregationService {
    fn drop(&mut self) {
        // The worker still runs its final flush if the runtime stays alive.
        self.cancel.cancel();
    }
}
