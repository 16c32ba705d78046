//! Expiry Sweeper Background Task
//!
//! The in-memory driver reclaims expired records lazily when the cache reads
//! them, but a key that is never read again would stay forever. This task
//! wakes on a fixed interval and removes every record past its expiry
//! horizon.
//!
//! The task is owned by exactly one [`MemoryDriver`](super::MemoryDriver):
//! it is spawned when the driver is built and stopped by `end()` (or when
//! the driver is dropped, which closes the shutdown channel).

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use revalidate_core::Clock;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use super::memory_backend::RecordMap;

/// Counters for the sweeper.
#[derive(Debug, Default)]
pub struct SweepMetrics {
    /// Number of sweep cycles run by the background task.
    pub cycles: AtomicU64,
    /// Number of expired records removed, by the task or by a manual prune.
    pub records_pruned: AtomicU64,
}

impl SweepMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> SweepMetricsSnapshot {
        SweepMetricsSnapshot {
            cycles: self.cycles.load(Ordering::Relaxed),
            records_pruned: self.records_pruned.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`SweepMetrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepMetricsSnapshot {
    pub cycles: u64,
    pub records_pruned: u64,
}

/// Handle to a running sweeper.
pub(crate) struct SweeperHandle {
    shutdown_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl SweeperHandle {
    /// Spawn the sweep loop on `runtime`.
    pub fn spawn<T>(
        runtime: &tokio::runtime::Handle,
        records: RecordMap<T>,
        clock: Arc<dyn Clock>,
        sweep_interval: Duration,
        metrics: Arc<SweepMetrics>,
    ) -> Self
    where
        T: Send + Sync + 'static,
    {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = runtime.spawn(sweep_task(
            records,
            clock,
            sweep_interval,
            metrics,
            shutdown_rx,
        ));

        Self {
            shutdown_tx,
            handle,
        }
    }

    /// Signal the loop to exit and wait for it.
    pub async fn stop(self) {
        let _ = self.shutdown_tx.send(true);
        let _ = self.handle.await;
    }
}

/// Run the sweep loop until shutdown is signalled or the sender is dropped.
async fn sweep_task<T>(
    records: RecordMap<T>,
    clock: Arc<dyn Clock>,
    sweep_interval: Duration,
    metrics: Arc<SweepMetrics>,
    mut shutdown_rx: watch::Receiver<bool>,
) where
    T: Send + Sync + 'static,
{
    // First sweep one full interval after start, not immediately.
    let mut ticker = interval_at(Instant::now() + sweep_interval, sweep_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    tracing::info!(
        sweep_interval_ms = sweep_interval.as_millis() as u64,
        "Expiry sweeper started"
    );

    loop {
        tokio::select! {
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    break;
                }
            }

            _ = ticker.tick() => {
                sweep_once(&records, clock.as_ref(), &metrics);
            }
        }
    }

    let snapshot = metrics.snapshot();
    tracing::info!(
        cycles = snapshot.cycles,
        records_pruned = snapshot.records_pruned,
        "Expiry sweeper stopped"
    );
}

/// Perform one sweep cycle.
fn sweep_once<T>(records: &RecordMap<T>, clock: &dyn Clock, metrics: &SweepMetrics) {
    metrics.cycles.fetch_add(1, Ordering::Relaxed);

    match super::memory_backend::prune_expired(records, clock.now(), metrics) {
        Ok(0) => tracing::trace!("Sweep cycle completed with no expired records"),
        Ok(count) => tracing::debug!(pruned = count, "Sweep cycle removed expired records"),
        Err(e) => tracing::error!(error = %e, "Sweep cycle failed"),
    }
}
