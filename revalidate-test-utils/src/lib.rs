//! revalidate Test Utilities
//!
//! Centralized test infrastructure for the revalidate workspace:
//! - Mock drivers and providers for testing
//! - Proptest generators for horizons, ages and payloads
//! - Test fixtures for common scenarios
//! - Custom assertions for revalidate-specific validation

// Re-export core types for convenience
pub use revalidate_core::{
    CacheConfig, CacheRecord, Clock, ConfigError, DriverError, EpochSeconds, Freshness, Horizons,
    ManualClock, ProviderError, RevalidateError, RevalidateResult, SystemClock,
};
pub use revalidate_storage::{Cache, CacheStats, MemoryDriver, StorageDriver, ValueProvider};

use async_trait::async_trait;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Install a fmt subscriber for test output, filtered by `RUST_LOG`
/// (default `warn`). Safe to call from every test.
pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}

/// Yield until every background refresh of `cache` has finished.
///
/// Panics if refreshes are still running after a bounded number of yields,
/// which usually means a provider is waiting on time that never advances.
pub async fn settle_refreshes<T, D>(cache: &Cache<T, D>)
where
    T: Clone + Send + Sync + 'static,
    D: StorageDriver<T> + 'static,
{
    for _ in 0..1_000 {
        if cache.refreshes_in_flight() == 0 {
            return;
        }
        tokio::task::yield_now().await;
    }
    panic!(
        "{} background refreshes still running",
        cache.refreshes_in_flight()
    );
}

/// Poll until every background refresh of `cache` has finished, sleeping in
/// real (or paused) tokio time between checks.
///
/// For multi-threaded runtimes, where yielding does not let a sleeping
/// provider finish. Panics once `timeout` has elapsed.
pub async fn await_refreshes<T, D>(cache: &Cache<T, D>, timeout: Duration)
where
    T: Clone + Send + Sync + 'static,
    D: StorageDriver<T> + 'static,
{
    let deadline = tokio::time::Instant::now() + timeout;
    while cache.refreshes_in_flight() > 0 {
        if tokio::time::Instant::now() >= deadline {
            panic!(
                "{} background refreshes still running after {:?}",
                cache.refreshes_in_flight(),
                timeout
            );
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

// ============================================================================
// MOCK PROVIDERS
// ============================================================================

/// Provider that counts its calls and can be told to fail or to take time.
///
/// Clones share the call counter, so keep a clone to inspect calls after
/// handing the provider to the cache.
#[derive(Debug, Clone)]
pub struct CountingProvider<T> {
    value: T,
    calls: Arc<AtomicUsize>,
    failure: Option<String>,
    delay: Option<Duration>,
}

impl<T> CountingProvider<T> {
    pub fn new(value: T) -> Self {
        Self {
            value,
            calls: Arc::new(AtomicUsize::new(0)),
            failure: None,
            delay: None,
        }
    }

    /// Fail every call with `reason`.
    pub fn failing(value: T, reason: impl Into<String>) -> Self {
        Self {
            failure: Some(reason.into()),
            ..Self::new(value)
        }
    }

    /// Sleep for `delay` (tokio time) before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl<T> ValueProvider<T> for CountingProvider<T>
where
    T: Clone + Send + Sync + 'static,
{
    async fn provide(&self) -> Result<T, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        match &self.failure {
            Some(reason) => Err(ProviderError::failed(reason)),
            None => Ok(self.value.clone()),
        }
    }
}

// ============================================================================
// MOCK DRIVERS
// ============================================================================

/// Driver whose backend is always unreachable.
#[derive(Debug)]
pub struct FailingDriver<T> {
    reason: String,
    _payload: PhantomData<fn() -> T>,
}

impl<T> FailingDriver<T> {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            _payload: PhantomData,
        }
    }

    fn error(&self) -> RevalidateError {
        DriverError::unavailable(&self.reason).into()
    }
}

impl<T> Default for FailingDriver<T> {
    fn default() -> Self {
        Self::new("connection refused")
    }
}

#[async_trait]
impl<T> StorageDriver<T> for FailingDriver<T>
where
    T: Send + Sync + 'static,
{
    async fn store(&self, _key: &str, _record: CacheRecord<T>) -> RevalidateResult<CacheRecord<T>> {
        Err(self.error())
    }

    async fn fetch(&self, _key: &str) -> RevalidateResult<Option<CacheRecord<T>>> {
        Err(self.error())
    }

    async fn delete(&self, _key: &str) -> RevalidateResult<bool> {
        Err(self.error())
    }

    async fn end(&self) -> RevalidateResult<()> {
        Ok(())
    }
}

/// Call counts recorded by a [`CountingDriver`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DriverCalls {
    pub stores: usize,
    pub fetches: usize,
    pub deletes: usize,
    pub ends: usize,
}

/// Driver wrapper that counts calls before delegating to `inner`.
#[derive(Debug, Default)]
pub struct CountingDriver<D> {
    inner: D,
    stores: AtomicUsize,
    fetches: AtomicUsize,
    deletes: AtomicUsize,
    ends: AtomicUsize,
}

impl<D> CountingDriver<D> {
    pub fn new(inner: D) -> Self {
        Self {
            inner,
            stores: AtomicUsize::new(0),
            fetches: AtomicUsize::new(0),
            deletes: AtomicUsize::new(0),
            ends: AtomicUsize::new(0),
        }
    }

    pub fn inner(&self) -> &D {
        &self.inner
    }

    pub fn calls(&self) -> DriverCalls {
        DriverCalls {
            stores: self.stores.load(Ordering::SeqCst),
            fetches: self.fetches.load(Ordering::SeqCst),
            deletes: self.deletes.load(Ordering::SeqCst),
            ends: self.ends.load(Ordering::SeqCst),
        }
    }
}

#[async_trait]
impl<T, D> StorageDriver<T> for CountingDriver<D>
where
    T: Send + Sync + 'static,
    D: StorageDriver<T>,
{
    async fn store(&self, key: &str, record: CacheRecord<T>) -> RevalidateResult<CacheRecord<T>> {
        self.stores.fetch_add(1, Ordering::SeqCst);
        self.inner.store(key, record).await
    }

    async fn fetch(&self, key: &str) -> RevalidateResult<Option<CacheRecord<T>>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.inner.fetch(key).await
    }

    async fn delete(&self, key: &str) -> RevalidateResult<bool> {
        self.deletes.fetch_add(1, Ordering::SeqCst);
        self.inner.delete(key).await
    }

    async fn end(&self) -> RevalidateResult<()> {
        self.ends.fetch_add(1, Ordering::SeqCst);
        self.inner.end().await
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for cache inputs.

    use super::*;
    use proptest::prelude::*;

    /// Generate a short lowercase cache key.
    pub fn arb_key() -> impl Strategy<Value = String> {
        "[a-z][a-z0-9:]{0,11}"
    }

    /// Generate a payload.
    pub fn arb_value() -> impl Strategy<Value = u32> {
        any::<u32>()
    }

    /// Generate a single horizon, `0` (disabled) included.
    pub fn arb_horizon() -> impl Strategy<Value = i64> {
        prop_oneof![Just(0i64), 1i64..=120]
    }

    /// Generate any pair of non-negative horizons, including misordered ones.
    pub fn arb_horizons() -> impl Strategy<Value = Horizons> {
        (arb_horizon(), arb_horizon()).prop_map(|(s, e)| Horizons::new(s, e))
    }

    /// Generate horizons with `0 < stale_after < expire_after`.
    pub fn arb_ordered_horizons() -> impl Strategy<Value = Horizons> {
        (1i64..=60, 1i64..=60).prop_map(|(s, gap)| Horizons::new(s, s + gap))
    }

    /// Generate a record age in seconds.
    pub fn arb_age() -> impl Strategy<Value = i64> {
        0i64..=240
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built test fixtures for common testing scenarios.

    use super::*;

    /// Instant every fixture clock starts at.
    pub const START: EpochSeconds = 1_700_000_000;

    /// A manual clock frozen at [`START`].
    pub fn manual_clock() -> Arc<ManualClock> {
        Arc::new(ManualClock::new(START))
    }

    /// Config with a one second sweep, for tests that wait on the sweeper.
    pub fn fast_sweep_config() -> CacheConfig {
        CacheConfig::new().with_sweep_interval(Duration::from_secs(1))
    }

    /// In-memory cache on `clock` with default config.
    ///
    /// Must be called from inside a tokio runtime.
    pub fn memory_cache<T>(clock: &Arc<ManualClock>) -> Cache<T, MemoryDriver<T>>
    where
        T: Clone + Send + Sync + 'static,
    {
        memory_cache_with(clock, CacheConfig::default())
    }

    /// In-memory cache on `clock` with `config`.
    pub fn memory_cache_with<T>(
        clock: &Arc<ManualClock>,
        config: CacheConfig,
    ) -> Cache<T, MemoryDriver<T>>
    where
        T: Clone + Send + Sync + 'static,
    {
        let clock: Arc<dyn Clock> = clock.clone();
        Cache::in_memory_with(clock, config).expect("memory cache fixture")
    }

    /// Cache over a counting in-memory driver on `clock`.
    pub fn counting_cache<T>(
        clock: &Arc<ManualClock>,
    ) -> Cache<T, CountingDriver<MemoryDriver<T>>>
    where
        T: Clone + Send + Sync + 'static,
    {
        let clock: Arc<dyn Clock> = clock.clone();
        let driver = MemoryDriver::spawn(Arc::clone(&clock), &CacheConfig::default())
            .expect("memory driver fixture");
        Cache::with_config(CountingDriver::new(driver), clock, CacheConfig::default())
            .expect("counting cache fixture")
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Custom assertion functions for revalidate-specific validation.

    use super::*;

    /// Assert that a RevalidateResult is Ok.
    #[track_caller]
    pub fn assert_ok<T: std::fmt::Debug>(result: &RevalidateResult<T>) {
        assert!(result.is_ok(), "Expected Ok, got Err: {:?}", result);
    }

    /// Assert that a RevalidateResult is the Closed error.
    #[track_caller]
    pub fn assert_closed<T: std::fmt::Debug>(result: &RevalidateResult<T>) {
        match result {
            Err(RevalidateError::Closed) => {}
            other => panic!("Expected Closed error, got: {:?}", other),
        }
    }

    /// Assert that a RevalidateResult is an Unavailable driver error.
    #[track_caller]
    pub fn assert_driver_unavailable<T: std::fmt::Debug>(result: &RevalidateResult<T>) {
        match result {
            Err(RevalidateError::Driver(DriverError::Unavailable { .. })) => {}
            other => panic!("Expected Unavailable driver error, got: {:?}", other),
        }
    }

    /// Assert that a RevalidateResult is a provider failure.
    #[track_caller]
    pub fn assert_provider_failed<T: std::fmt::Debug>(result: &RevalidateResult<T>) {
        match result {
            Err(RevalidateError::Provider(ProviderError::Failed { .. })) => {}
            other => panic!("Expected provider failure, got: {:?}", other),
        }
    }

    /// Assert that a RevalidateResult is a Config error.
    #[track_caller]
    pub fn assert_config_error<T: std::fmt::Debug>(result: &RevalidateResult<T>) {
        match result {
            Err(RevalidateError::Config(_)) => {}
            other => panic!("Expected Config error, got: {:?}", other),
        }
    }

    /// Assert a record carries `value` and no stale flag.
    #[track_caller]
    pub fn assert_fresh<T: PartialEq + std::fmt::Debug>(record: &CacheRecord<T>, value: &T) {
        assert_eq!(&record.value, value, "Wrong cached value");
        assert!(!record.stale, "Expected a fresh record, got stale: {:?}", record);
    }

    /// Assert a record carries `value` and the stale flag.
    #[track_caller]
    pub fn assert_stale<T: PartialEq + std::fmt::Debug>(record: &CacheRecord<T>, value: &T) {
        assert_eq!(&record.value, value, "Wrong cached value");
        assert!(record.stale, "Expected a stale record, got fresh: {:?}", record);
    }
}

// ============================================================================
// TESTS
// ============================================================================
