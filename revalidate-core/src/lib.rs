//! revalidate Core - Record Model
//!
//! Data types shared by the cache protocol and its storage drivers.
//! This crate has no I/O and no async runtime: records, horizons, the
//! freshness classification, time sources, errors and configuration.

pub mod clock;
pub mod config;
pub mod error;
pub mod freshness;
pub mod record;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{CacheConfig, DEFAULT_SWEEP_INTERVAL_SECS};
pub use error::{ConfigError, DriverError, ProviderError, RevalidateError, RevalidateResult};
pub use freshness::Freshness;
pub use record::{CacheRecord, Horizons};

/// Whole seconds since the Unix epoch.
pub type EpochSeconds = i64;
