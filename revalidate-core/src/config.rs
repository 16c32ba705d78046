//! Configuration types

use crate::{ConfigError, RevalidateError, RevalidateResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default interval between expiry sweeps of the in-memory driver.
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 60;

/// Configuration shared by the cache and its in-memory driver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// How often the in-memory driver removes expired records (default: 60 seconds)
    pub sweep_interval: Duration,

    /// Allow at most one background refresh per key at a time (default: true).
    /// When false, only the timestamp bump debounces concurrent stale reads.
    pub dedupe_refreshes: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            sweep_interval: Duration::from_secs(DEFAULT_SWEEP_INTERVAL_SECS),
            dedupe_refreshes: true,
        }
    }
}

impl CacheConfig {
    /// Create a new config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the sweep interval.
    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    /// Enable or disable per-key refresh deduplication.
    pub fn with_dedupe_refreshes(mut self, enabled: bool) -> Self {
        self.dedupe_refreshes = enabled;
        self
    }

    /// Create from environment variables with fallback to defaults.
    ///
    /// Environment variables:
    /// - `REVALIDATE_SWEEP_INTERVAL_SECS`: Sweep interval in seconds (default: 60)
    /// - `REVALIDATE_DEDUPE_REFRESHES`: Deduplicate background refreshes (default: true)
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            sweep_interval: std::env::var("REVALIDATE_SWEEP_INTERVAL_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.sweep_interval),
            dedupe_refreshes: std::env::var("REVALIDATE_DEDUPE_REFRESHES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.dedupe_refreshes),
        }
    }

    /// Validate the configuration.
    /// Returns Ok(()) if valid, Err(RevalidateError::Config) if invalid.
    pub fn validate(&self) -> RevalidateResult<()> {
        if self.sweep_interval.is_zero() {
            return Err(RevalidateError::Config(ConfigError::InvalidValue {
                field: "sweep_interval".to_string(),
                value: format!("{:?}", self.sweep_interval),
                reason: "sweep_interval must be positive".to_string(),
            }));
        }

        Ok(())
    }
}
