//! Cached record and the horizons attached to it.

use serde::{Deserialize, Serialize};

use crate::freshness::Freshness;
use crate::EpochSeconds;

/// Stale and expiry horizons, in seconds. `0` disables a horizon.
///
/// Horizons are not validated. A negative horizon is nonzero and every
/// age is `>=` it, so it classifies as always stale or always expired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Horizons {
    pub stale_after: i64,
    pub expire_after: i64,
}

impl Horizons {
    pub fn new(stale_after: i64, expire_after: i64) -> Self {
        Self {
            stale_after,
            expire_after,
        }
    }

    /// Neither stale nor expiring.
    pub fn never() -> Self {
        Self::default()
    }

    /// Only a stale horizon.
    pub fn stale_after(secs: i64) -> Self {
        Self::new(secs, 0)
    }

    /// Only an expiry horizon.
    pub fn expire_after(secs: i64) -> Self {
        Self::new(0, secs)
    }

    /// True when neither horizon is set, so a record never changes state.
    pub fn is_permanent(&self) -> bool {
        self.stale_after == 0 && self.expire_after == 0
    }
}

/// The unit of cached state.
///
/// `timestamp` is always written by the cache from its clock. `stale` is
/// only ever set on the copy handed back for a stale read; it is not
/// serialized and drivers never see it set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheRecord<T> {
    pub value: T,
    pub timestamp: EpochSeconds,
    pub stale_after: i64,
    pub expire_after: i64,
    #[serde(skip)]
    pub stale: bool,
}

impl<T> CacheRecord<T> {
    /// Build a record written at `timestamp`.
    pub fn new(value: T, timestamp: EpochSeconds, horizons: Horizons) -> Self {
        Self {
            value,
            timestamp,
            stale_after: horizons.stale_after,
            expire_after: horizons.expire_after,
            stale: false,
        }
    }

    pub fn horizons(&self) -> Horizons {
        Horizons::new(self.stale_after, self.expire_after)
    }

    /// Seconds since the record was last written.
    pub fn age(&self, now: EpochSeconds) -> i64 {
        now.saturating_sub(self.timestamp)
    }

    /// Classify this record against `now`. Expiry wins over staleness.
    pub fn classify(&self, now: EpochSeconds) -> Freshness {
        Freshness::classify(self.age(now), self.horizons())
    }

    pub fn is_expired(&self, now: EpochSeconds) -> bool {
        self.classify(now).is_expired()
    }

    /// Copy with the `stale` flag set, as returned for a stale read.
    pub fn marked_stale(mut self) -> Self {
        self.stale = true;
        self
    }

    /// Copy with the `stale` flag cleared, as handed to a driver.
    pub fn unmarked(mut self) -> Self {
        self.stale = false;
        self
    }
}
