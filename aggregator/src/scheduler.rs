//! Single flush worker
//!
//! One task owns all storage access. It consumes direction writes and explicit
//! flush requests from a channel, and periodic triggers from a [`Notify`] that
//! holds at most one pending permit, so triggers arriving during a flush
//! collapse into a single follow-up flush. Blocking SQLite work runs on the
//! blocking pool, but the loop awaits it, so only one transaction is ever open.

use crate::counter::CounterTable;
use crate::error::StoreError;
use crate::metrics;
use crate::persister::{FlushReport, Persister};
use packetlog_shared::{DirectionRecord, WindowSnapshot};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, Notify};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub(crate) type FlushReply = oneshot::Sender<Result<FlushReport, StoreError>>;

pub(crate) enum Job {
    Direction(DirectionRecord),
    Flush(FlushReply),
}

/// Worker state as seen from outside
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushState {
    Idle,
    Flushing,
    Stopped,
}

impl FlushState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => FlushState::Idle,
            1 => FlushState::Flushing,
            _ => FlushState::Stopped,
        }
    }
}

pub(crate) struct FlushScheduler {
    counters: Arc<CounterTable>,
    persister: Arc<Persister>,
    state: Arc<AtomicU8>,
}

impl FlushScheduler {
    pub(crate) fn new(
        counters: Arc<CounterTable>,
        persister: Arc<Persister>,
        state: Arc<AtomicU8>,
    ) -> Self {
        Self {
            counters,
            persister,
            state,
        }
    }

    pub(crate) fn state_of(state: &AtomicU8) -> FlushState {
        FlushState::from_u8(state.load(Ordering::Acquire))
    }

    /// Run until `cancel` fires, then drain queued jobs and flush one last time.
    pub(crate) async fn run(
        self,
        mut jobs: mpsc::UnboundedReceiver<Job>,
        trigger: Arc<Notify>,
        cancel: CancellationToken,
    ) -> Result<FlushReport, StoreError> {
        info!("Flush worker started");
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                job = jobs.recv() => match job {
                    Some(job) => self.handle(job).await,
                    None => break,
                },
                _ = trigger.notified() => {
                    // Failures are already logged by the persister.
                    let _ = self.flush().await;
                }
            }
        }

        jobs.close();
        while let Ok(job) = jobs.try_recv() {
            self.handle(job).await;
        }
        let result = self.flush().await;
        self.state.store(FlushState::Stopped as u8, Ordering::Release);
        info!(
            rows = result.as_ref().map(|r| r.rows).unwrap_or(0),
            "Flush worker stopped after final flush"
        );
        result
    }

    async fn handle(&self, job: Job) {
        match job {
            Job::Direction(record) => {
                let persister = self.persister.clone();
                let write = tokio::task::spawn_blocking(move || persister.record_direction(&record));
                if let Err(e) = write.await {
                    warn!("Direction write task failed: {}", e);
                }
            }
            Job::Flush(reply) => {
                let result = self.flush().await;
                if reply.send(result).is_err() {
                    debug!("Flush requester went away before the result was ready");
                }
            }
        }
    }

    async fn flush(&self) -> Result<FlushReport, StoreError> {
        self.state.store(FlushState::Flushing as u8, Ordering::Release);
        let counters = self.counters.clone();
        let persister = self.persister.clone();
        let task = tokio::task::spawn_blocking(move || {
            let collected_at_ms = persister.next_collected_at();
            let snapshot = WindowSnapshot::new(collected_at_ms, counters.snapshot_and_reset());
            metrics::LIVE_CATEGORIES.set(snapshot.aggregates.len() as f64);
            persister.write_batch(snapshot)
        });
        let result = match task.await {
            Ok(result) => result,
            Err(e) => Err(StoreError::Worker(e.to_string())),
        };
        self.state.store(FlushState::Idle as u8, Ordering::Release);
        result
    }
}

/// Fire `trigger` every `period` until `cancel` fires. The first tick is
/// one full period after the call.
pub(crate) async fn run_timer(period: Duration, trigger: Arc<Notify>, cancel: CancellationToken) {
    let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = interval.tick() => trigger.notify_one(),
        }
    }
    debug!("Flush timer stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_round_trip() {
        for state in [FlushState::Idle, FlushState::Flushing, FlushState::Stopped] {
            assert_eq!(FlushState::from_u8(state as u8), state);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_coalesces_into_one_permit() {
        let trigger = Arc::new(Notify::new());
        let cancel = CancellationToken::new();
        let timer = tokio::spawn(run_timer(
            Duration::from_secs(5),
            trigger.clone(),
            cancel.clone(),
        ));

        // Three periods elapse with nobody waiting.
        tokio::time::sleep(Duration::from_secs(16)).await;
        cancel.cancel();
        timer.await.unwrap();

        trigger.notified().await;
        let second = tokio::time::timeout(Duration::from_millis(10), trigger.notified()).await;
        assert!(second.is_err());
    }
}
