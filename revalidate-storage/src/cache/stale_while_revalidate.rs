//! Stale-while-revalidate cache.
//!
//! This module implements the read/write protocol: classify the stored
//! record, serve it when fresh or stale, drop it when expired, and refresh
//! stale values in the background.

use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use revalidate_core::{
    CacheConfig, CacheRecord, Clock, Freshness, Horizons, RevalidateError, RevalidateResult,
    SystemClock,
};

use super::memory_backend::MemoryDriver;
use super::refresh::{RefreshTracker, SpawnOutcome};
use super::traits::{CacheCounters, CacheStats, StorageDriver, ValueProvider};

/// What a read found, after expiry and staleness handling.
enum Lookup<T> {
    Fresh(CacheRecord<T>),
    /// Already rewritten with a bumped timestamp; carries the stale flag.
    Stale(CacheRecord<T>),
    /// Nothing stored, or the stored record was expired and has been deleted.
    Missing,
}

/// Stale-while-revalidate cache over a pluggable [`StorageDriver`].
///
/// Reads classify the stored record against the clock:
///
/// - **Fresh**: returned as-is.
/// - **Stale**: its timestamp is bumped and written back before anything
///   else happens, the caller gets it with `stale = true`, and if a provider
///   was given a refresh runs in the background.
/// - **Expired**: deleted and treated as missing. Never returned.
/// - **Missing**: `None`, or the provider's value stored and returned.
///
/// Cloning is cheap and yields a handle to the same cache.
///
/// # Shutdown
///
/// [`end`](Self::end) cancels every in-flight refresh and waits for them
/// before releasing the driver, so a refresh can never write a key back
/// after shutdown.
///
/// # Example
///
/// ```ignore
/// let cache = Cache::<String, _>::in_memory()?;
///
/// cache.set("greeting", "hello".to_string(), Horizons::new(30, 300)).await?;
///
/// let record = cache
///     .get_with("greeting", || async { Ok(fetch_greeting().await) }, Horizons::new(30, 300))
///     .await?;
/// if record.stale {
///     // served from cache while a refresh runs
/// }
/// ```
pub struct Cache<T, D>
where
    T: Clone + Send + Sync + 'static,
    D: StorageDriver<T> + 'static,
{
    driver: Arc<D>,
    clock: Arc<dyn Clock>,
    config: CacheConfig,
    refreshes: Arc<RefreshTracker>,
    counters: Arc<CacheCounters>,
    closed: Arc<AtomicBool>,
    _payload: PhantomData<fn() -> T>,
}

impl<T, D> Cache<T, D>
where
    T: Clone + Send + Sync + 'static,
    D: StorageDriver<T> + 'static,
{
    /// Create a cache over `driver` using the system clock and default config.
    pub fn new(driver: D) -> Self {
        Self::build(driver, Arc::new(SystemClock), CacheConfig::default())
    }

    /// Create a cache with an explicit clock and configuration.
    pub fn with_config(
        driver: D,
        clock: Arc<dyn Clock>,
        config: CacheConfig,
    ) -> RevalidateResult<Self> {
        config.validate()?;
        Ok(Self::build(driver, clock, config))
    }

    fn build(driver: D, clock: Arc<dyn Clock>, config: CacheConfig) -> Self {
        Self {
            driver: Arc::new(driver),
            clock,
            config,
            refreshes: Arc::new(RefreshTracker::new()),
            counters: Arc::new(CacheCounters::default()),
            closed: Arc::new(AtomicBool::new(false)),
            _payload: PhantomData,
        }
    }

    /// Get a reference to the storage driver.
    pub fn driver(&self) -> &D {
        &self.driver
    }

    /// Get the cache configuration.
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Snapshot of the cache counters.
    pub fn stats(&self) -> CacheStats {
        self.counters.snapshot()
    }

    /// Number of background refreshes still running.
    pub fn refreshes_in_flight(&self) -> usize {
        self.refreshes.in_flight()
    }

    /// Whether [`end`](Self::end) has been called on this cache or a clone.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// A driver call that fails because `end` ran meanwhile reports `Closed`.
    fn closed_or(&self, err: RevalidateError) -> RevalidateError {
        if self.is_closed() {
            RevalidateError::Closed
        } else {
            err
        }
    }

    fn ensure_open(&self) -> RevalidateResult<()> {
        if self.is_closed() {
            Err(RevalidateError::Closed)
        } else {
            Ok(())
        }
    }

    /// Store `value` under `key`, stamped with the current time.
    ///
    /// Horizons are not validated; see [`Horizons`].
    pub async fn set(
        &self,
        key: &str,
        value: T,
        horizons: Horizons,
    ) -> RevalidateResult<CacheRecord<T>> {
        self.ensure_open()?;
        let record = CacheRecord::new(value, self.clock.now(), horizons);
        self.driver
            .store(key, record)
            .await
            .map_err(|e| self.closed_or(e))
    }

    /// Read `key` without a provider.
    ///
    /// Returns `None` when nothing is stored or the stored record expired.
    /// A stale record is returned with `stale = true`; nothing refreshes it.
    pub async fn get(&self, key: &str) -> RevalidateResult<Option<CacheRecord<T>>> {
        self.ensure_open()?;
        let lookup = self.read(key).await.map_err(|e| self.closed_or(e))?;
        Ok(match lookup {
            Lookup::Fresh(record) | Lookup::Stale(record) => Some(record),
            Lookup::Missing => None,
        })
    }

    /// Read `key`, falling back to `provider`.
    ///
    /// On a miss (or expiry) the provider runs before returning and its value
    /// is stored with `horizons`; a provider error is returned to the caller.
    /// On a stale read the stale record is returned immediately and the
    /// provider runs in a background task whose errors are only logged.
    pub async fn get_with<P>(
        &self,
        key: &str,
        provider: P,
        horizons: Horizons,
    ) -> RevalidateResult<CacheRecord<T>>
    where
        P: ValueProvider<T> + 'static,
    {
        self.ensure_open()?;
        let lookup = self.read(key).await.map_err(|e| self.closed_or(e))?;
        match lookup {
            Lookup::Fresh(record) => Ok(record),
            Lookup::Stale(record) => {
                self.schedule_refresh(key, provider, horizons);
                Ok(record)
            }
            Lookup::Missing => {
                let value = provider.provide().await?;
                self.set(key, value, horizons).await
            }
        }
    }

    /// Shut the cache down.
    ///
    /// Marks the cache closed, cancels and awaits in-flight refreshes, then
    /// ends the driver. Safe to call more than once.
    pub async fn end(&self) -> RevalidateResult<()> {
        self.closed.store(true, Ordering::SeqCst);

        let cancelled = self.refreshes.shutdown().await;
        if cancelled > 0 {
            tracing::debug!(cancelled, "Cancelled in-flight refreshes on shutdown");
        }

        self.driver.end().await
    }

    /// Fetch and classify, applying the side effects of expiry and staleness.
    async fn read(&self, key: &str) -> RevalidateResult<Lookup<T>> {
        let Some(record) = self.driver.fetch(key).await? else {
            CacheCounters::bump(&self.counters.misses);
            return Ok(Lookup::Missing);
        };

        let now = self.clock.now();
        match record.classify(now) {
            Freshness::Fresh => {
                CacheCounters::bump(&self.counters.hits);
                Ok(Lookup::Fresh(record.unmarked()))
            }
            Freshness::Expired => {
                tracing::debug!(
                    key,
                    age = record.age(now),
                    expire_after = record.expire_after,
                    "Deleting expired record on read"
                );
                self.driver.delete(key).await?;
                CacheCounters::bump(&self.counters.expirations);
                CacheCounters::bump(&self.counters.misses);
                Ok(Lookup::Missing)
            }
            Freshness::Stale => {
                // Rewrite before any refresh is scheduled so that reads
                // arriving meanwhile see a fresh timestamp.
                let bumped = CacheRecord {
                    timestamp: now,
                    ..record
                }
                .unmarked();
                let stored = self.driver.store(key, bumped).await?;
                CacheCounters::bump(&self.counters.stale_hits);
                Ok(Lookup::Stale(stored.marked_stale()))
            }
        }
    }

    fn schedule_refresh<P>(&self, key: &str, provider: P, horizons: Horizons)
    where
        P: ValueProvider<T> + 'static,
    {
        let cache = self.clone();
        let owned_key = key.to_string();
        let outcome = self
            .refreshes
            .spawn(key, self.config.dedupe_refreshes, async move {
                cache.refresh(&owned_key, provider, horizons).await;
            });

        match outcome {
            SpawnOutcome::Spawned => {
                CacheCounters::bump(&self.counters.refreshes_started);
                tracing::debug!(key, "Scheduled background refresh");
            }
            SpawnOutcome::AlreadyInFlight => {
                CacheCounters::bump(&self.counters.refreshes_skipped);
                tracing::trace!(key, "Refresh already in flight");
            }
            SpawnOutcome::RuntimeUnavailable => {
                CacheCounters::bump(&self.counters.refreshes_skipped);
                tracing::warn!(key, "No tokio runtime to run background refresh; serving stale");
            }
            SpawnOutcome::Closed => {}
        }
    }

    /// Body of a background refresh. Errors end here.
    async fn refresh<P>(&self, key: &str, provider: P, horizons: Horizons)
    where
        P: ValueProvider<T>,
    {
        let value = match provider.provide().await {
            Ok(value) => value,
            Err(e) => {
                CacheCounters::bump(&self.counters.refresh_failures);
                tracing::warn!(key, error = %e, "Background refresh failed");
                return;
            }
        };

        match self.set(key, value, horizons).await {
            Ok(_) => {
                CacheCounters::bump(&self.counters.refreshes_completed);
                tracing::debug!(key, "Background refresh stored new value");
            }
            Err(RevalidateError::Closed) => {
                tracing::warn!(key, "Cache closed before background refresh could store");
            }
            Err(e) => {
                CacheCounters::bump(&self.counters.refresh_failures);
                tracing::warn!(key, error = %e, "Background refresh could not store value");
            }
        }
    }
}

impl<T> Cache<T, MemoryDriver<T>>
where
    T: Clone + Send + Sync + 'static,
{
    /// Cache over a new [`MemoryDriver`] with the system clock and defaults.
    ///
    /// Must be called from inside a tokio runtime.
    pub fn in_memory() -> RevalidateResult<Self> {
        Self::in_memory_with(Arc::new(SystemClock), CacheConfig::default())
    }

    /// Cache over a new [`MemoryDriver`] sharing `clock` and `config`.
    pub fn in_memory_with(clock: Arc<dyn Clock>, config: CacheConfig) -> RevalidateResult<Self> {
        let driver = MemoryDriver::spawn(Arc::clone(&clock), &config)?;
        Self::with_config(driver, clock, config)
    }
}

impl<T, D> Clone for Cache<T, D>
where
    T: Clone + Send + Sync + 'static,
    D: StorageDriver<T> + 'static,
{
    fn clone(&self) -> Self {
        Self {
            driver: Arc::clone(&self.driver),
            clock: Arc::clone(&self.clock),
            config: self.config.clone(),
            refreshes: Arc::clone(&self.refreshes),
            counters: Arc::clone(&self.counters),
            closed: Arc::clone(&self.closed),
            _payload: PhantomData,
        }
    }
}
