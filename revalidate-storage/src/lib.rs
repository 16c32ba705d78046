//! revalidate Storage - Cache Protocol and Drivers
//!
//! The stale-while-revalidate cache, the storage driver contract it
//! delegates to, and the bundled in-memory driver.

pub mod cache;

// Re-export cache types for callers
pub use cache::{
    Cache, CacheStats, MemoryDriver, RefreshTracker, SpawnOutcome, StorageDriver, SweepMetrics,
    SweepMetricsSnapshot, ValueProvider,
};

// Re-export the record model so most callers need only this crate
pub use revalidate_core::{
    CacheConfig, CacheRecord, Clock, DriverError, Freshness, Horizons, ManualClock,
    ProviderError, RevalidateError, RevalidateResult, SystemClock,
};
