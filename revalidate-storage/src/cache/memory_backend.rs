//! In-memory storage driver with periodic expiry sweeping.
//!
//! Records live in a `HashMap` behind a `std::sync::RwLock`. Every driver
//! operation takes the lock exactly once, and a sweep holds the write lock
//! for its whole pass, so no operation can observe a sweep half-way through
//! a key.
//!
//! # Thread Safety
//!
//! - `fetch` takes the read lock
//! - `store`, `delete`, `end` and sweeps take the write lock
//! - `end` raises the ended flag under the write lock and `store` checks it
//!   under the same lock, so no store can land after `end` has cleared
//! - Sweep statistics are atomic counters

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use async_trait::async_trait;
use revalidate_core::{
    CacheConfig, CacheRecord, Clock, DriverError, EpochSeconds, RevalidateResult, SystemClock,
};

use super::sweeper::{SweepMetrics, SweepMetricsSnapshot, SweeperHandle};
use super::traits::StorageDriver;

/// Shared record map, also held by the sweeper task.
pub(crate) type RecordMap<T> = Arc<RwLock<HashMap<String, CacheRecord<T>>>>;

/// Remove every record that is expired at `now`. Returns how many were removed.
pub(crate) fn prune_expired<T>(
    records: &RecordMap<T>,
    now: EpochSeconds,
    metrics: &SweepMetrics,
) -> RevalidateResult<usize> {
    let mut records = records.write().map_err(|_| DriverError::LockPoisoned)?;
    let before = records.len();
    records.retain(|_, record| !record.is_expired(now));
    let pruned = before - records.len();

    metrics
        .records_pruned
        .fetch_add(pruned as u64, Ordering::Relaxed);
    Ok(pruned)
}

/// In-memory storage driver.
///
/// # Example
///
/// ```ignore
/// use revalidate_storage::cache::MemoryDriver;
///
/// // Must be called from inside a tokio runtime.
/// let driver = MemoryDriver::<String>::with_defaults()?;
/// let cache = Cache::new(driver);
/// ```
pub struct MemoryDriver<T> {
    records: RecordMap<T>,
    clock: Arc<dyn Clock>,
    metrics: Arc<SweepMetrics>,
    sweeper: Mutex<Option<SweeperHandle>>,
    ended: AtomicBool,
}

impl<T> MemoryDriver<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Create a driver and start its sweeper on the current tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The config is invalid (zero sweep interval)
    /// - No tokio runtime is running on this thread
    pub fn spawn(clock: Arc<dyn Clock>, config: &CacheConfig) -> RevalidateResult<Self> {
        config.validate()?;
        let runtime =
            tokio::runtime::Handle::try_current().map_err(|_| DriverError::RuntimeUnavailable)?;

        let records: RecordMap<T> = Arc::new(RwLock::new(HashMap::new()));
        let metrics = Arc::new(SweepMetrics::new());
        let sweeper = SweeperHandle::spawn(
            &runtime,
            Arc::clone(&records),
            Arc::clone(&clock),
            config.sweep_interval,
            Arc::clone(&metrics),
        );

        Ok(Self {
            records,
            clock,
            metrics,
            sweeper: Mutex::new(Some(sweeper)),
            ended: AtomicBool::new(false),
        })
    }

    /// Create a driver on the system clock with default configuration.
    pub fn with_defaults() -> RevalidateResult<Self> {
        Self::spawn(Arc::new(SystemClock), &CacheConfig::default())
    }

    /// Remove every expired record now, without waiting for the sweeper.
    pub fn prune(&self) -> RevalidateResult<usize> {
        prune_expired(&self.records, self.clock.now(), &self.metrics)
    }

    /// Number of stored records, expired or not.
    pub fn len(&self) -> RevalidateResult<usize> {
        Ok(self
            .records
            .read()
            .map_err(|_| DriverError::LockPoisoned)?
            .len())
    }

    /// Whether no records are stored, expired or not.
    pub fn is_empty(&self) -> RevalidateResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Whether the background sweeper is still running.
    pub fn is_sweeping(&self) -> bool {
        self.sweeper
            .lock()
            .map(|sweeper| sweeper.is_some())
            .unwrap_or(false)
    }

    /// Snapshot of sweep cycles run and records pruned so far.
    pub fn sweep_metrics(&self) -> SweepMetricsSnapshot {
        self.metrics.snapshot()
    }
}

#[async_trait]
impl<T> StorageDriver<T> for MemoryDriver<T>
where
    T: Clone + Send + Sync + 'static,
{
    async fn store(&self, key: &str, record: CacheRecord<T>) -> RevalidateResult<CacheRecord<T>> {
        let mut records = self.records.write().map_err(|_| DriverError::LockPoisoned)?;
        if self.ended.load(Ordering::SeqCst) {
            return Err(DriverError::Ended.into());
        }
        records.insert(key.to_string(), record.clone());
        Ok(record)
    }

    async fn fetch(&self, key: &str) -> RevalidateResult<Option<CacheRecord<T>>> {
        let records = self.records.read().map_err(|_| DriverError::LockPoisoned)?;
        Ok(records.get(key).cloned())
    }

    async fn delete(&self, key: &str) -> RevalidateResult<bool> {
        let mut records = self.records.write().map_err(|_| DriverError::LockPoisoned)?;
        Ok(records.remove(key).is_some())
    }

    async fn end(&self) -> RevalidateResult<()> {
        {
            let mut records = self.records.write().map_err(|_| DriverError::LockPoisoned)?;
            self.ended.store(true, Ordering::SeqCst);
            records.clear();
        }

        let sweeper = self
            .sweeper
            .lock()
            .map_err(|_| DriverError::LockPoisoned)?
            .take();
        if let Some(sweeper) = sweeper {
            sweeper.stop().await;
        }

        Ok(())
    }
}
