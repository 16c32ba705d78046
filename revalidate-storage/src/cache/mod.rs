//! Stale-while-revalidate cache and its storage drivers.
//!
//! This module provides a cache that keeps serving a value after it goes
//! stale while a fresh one is computed in the background, and stops serving
//! it entirely once it expires.
//!
//! # Design Philosophy
//!
//! Each record carries two horizons. Past `stale_after` the value is still
//! good enough to return, but the caller is told (`stale = true`) and a
//! refresh is started. Past `expire_after` the value is gone: it is deleted
//! on read and by the driver's sweeper, and never returned.
//!
//! # Drivers
//!
//! The cache delegates raw storage to a [`StorageDriver`] with four
//! operations (store, fetch, delete, end). [`MemoryDriver`] is the bundled
//! implementation; anything that can honour the same contract, such as a
//! networked key-value store, can be plugged in instead.
//!
//! # Example
//!
//! ```ignore
//! let cache = Cache::<Profile, _>::in_memory()?;
//!
//! // Served stale after 30s, refreshed in the background, gone after 5 minutes.
//! let profile = cache
//!     .get_with("profile:7", || async { load_profile(7).await }, Horizons::new(30, 300))
//!     .await?;
//!
//! if profile.stale {
//!     tracing::debug!("Serving stale profile while it refreshes");
//! }
//!
//! cache.end().await?;
//! ```

pub mod memory_backend;
pub mod refresh;
pub mod stale_while_revalidate;
pub mod sweeper;
pub mod traits;

pub use memory_backend::MemoryDriver;
pub use refresh::{RefreshTracker, SpawnOutcome};
pub use stale_while_revalidate::Cache;
pub use sweeper::{SweepMetrics, SweepMetricsSnapshot};
pub use traits::{CacheStats, StorageDriver, ValueProvider};
