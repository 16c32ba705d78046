//! Storage driver and value provider traits.
//!
//! This module defines the two seams of the cache: where records are kept
//! ([`StorageDriver`]) and where fresh values come from ([`ValueProvider`]).

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use revalidate_core::{CacheRecord, ProviderError, RevalidateResult};

/// Storage driver trait for pluggable record stores.
///
/// The cache only ever calls these four operations and never looks behind
/// them, so a networked key-value store can replace the in-memory driver
/// without touching the cache protocol.
///
/// # Contract
///
/// - Each call is atomic with respect to any background work the driver does
///   (such as an expiry sweep).
/// - Failures to reach the backend are reported as errors, never as a
///   missing key.
/// - Once `end` has returned, `store` fails instead of keeping the record.
#[async_trait]
pub trait StorageDriver<T>: Send + Sync
where
    T: Send + Sync + 'static,
{
    /// Upsert a record, replacing any record already stored under `key`.
    ///
    /// Returns the record as stored.
    async fn store(&self, key: &str, record: CacheRecord<T>) -> RevalidateResult<CacheRecord<T>>;

    /// Fetch the record under `key`, or `None` if absent. No side effects.
    async fn fetch(&self, key: &str) -> RevalidateResult<Option<CacheRecord<T>>>;

    /// Remove the record under `key`.
    ///
    /// Returns whether a record was removed; deleting an absent key is
    /// `Ok(false)`.
    async fn delete(&self, key: &str) -> RevalidateResult<bool>;

    /// Release every resource held by the driver. Idempotent.
    async fn end(&self) -> RevalidateResult<()>;
}

/// Source of fresh values for a cache key.
///
/// Any `Fn() -> impl Future<Output = Result<T, ProviderError>>` closure is a
/// provider:
///
/// ```ignore
/// let record = cache
///     .get_with("user:42", || async { load_user(42).await }, Horizons::new(30, 300))
///     .await?;
/// ```
#[async_trait]
pub trait ValueProvider<T>: Send + Sync {
    /// Produce the value to cache.
    async fn provide(&self) -> Result<T, ProviderError>;
}

#[async_trait]
impl<T, F, Fut> ValueProvider<T> for F
where
    T: Send + 'static,
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, ProviderError>> + Send + 'static,
{
    async fn provide(&self) -> Result<T, ProviderError> {
        (self)().await
    }
}

/// Statistics about cache usage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Reads that found a fresh record.
    pub hits: u64,
    /// Reads that found a stale record and served it anyway.
    pub stale_hits: u64,
    /// Reads that found nothing (including after expiry).
    pub misses: u64,
    /// Records deleted on read because they were expired.
    pub expirations: u64,
    /// Background refreshes spawned.
    pub refreshes_started: u64,
    /// Background refreshes that stored a new value.
    pub refreshes_completed: u64,
    /// Background refreshes whose provider or store failed.
    pub refresh_failures: u64,
    /// Stale reads that did not spawn a refresh, because one was already in
    /// flight or no tokio runtime was running.
    pub refreshes_skipped: u64,
}

impl CacheStats {
    /// Calculate the hit rate (0.0 to 1.0). Stale hits count as hits.
    pub fn hit_rate(&self) -> f64 {
        let hits = self.hits + self.stale_hits;
        let total = hits + self.misses;
        if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64
        }
    }
}

/// Live counters behind [`CacheStats`].
#[derive(Debug, Default)]
pub(crate) struct CacheCounters {
    pub hits: AtomicU64,
    pub stale_hits: AtomicU64,
    pub misses: AtomicU64,
    pub expirations: AtomicU64,
    pub refreshes_started: AtomicU64,
    pub refreshes_completed: AtomicU64,
    pub refresh_failures: AtomicU64,
    pub refreshes_skipped: AtomicU64,
}

impl CacheCounters {
    pub fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            stale_hits: self.stale_hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            expirations: self.expirations.load(Ordering::Relaxed),
            refreshes_started: self.refreshes_started.load(Ordering::Relaxed),
            refreshes_completed: self.refreshes_completed.load(Ordering::Relaxed),
            refresh_failures: self.refresh_failures.load(Ordering::Relaxed),
            refreshes_skipped: self.refreshes_skipped.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_stats_hit_rate() {
        let stats = CacheStats {
            hits: 60,
            stale_hits: 20,
            misses: 20,
            ..Default::default()
        };
        assert!((stats.hit_rate() - 0.8).abs() < 0.001);

        let empty_stats = CacheStats::default();
        assert!((empty_stats.hit_rate() - 0.0).abs() < 0.001);
    }

    #[test]
    fn test_counters_snapshot() {
        let counters = CacheCounters::default();
        CacheCounters::bump(&counters.hits);
        CacheCounters::bump(&counters.hits);
        CacheCounters::bump(&counters.refreshes_skipped);

        let stats = counters.snapshot();
        assert_eq!(stats.hits, 2);
        assert_eq!(stats.refreshes_skipped, 1);
        assert_eq!(stats.misses, 0);
    }

    #[tokio::test]
    async fn test_closure_is_a_provider() {
        let provider = || async { Ok::<_, ProviderError>(42u32) };
        assert_eq!(provider.provide().await.unwrap(), 42);

        let failing = || async { Err::<u32, _>(ProviderError::failed("nope")) };
        assert!(failing.provide().await.is_err());
    }
}
