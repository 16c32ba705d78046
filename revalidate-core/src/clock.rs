//! Time sources.
//!
//! Every timestamp in the cache is an epoch second read from a [`Clock`].
//! Production code uses [`SystemClock`]; tests drive a [`ManualClock`] so
//! stale and expiry horizons can be crossed without sleeping.

use std::fmt::Debug;
use std::sync::atomic::{AtomicI64, Ordering};

use chrono::Utc;

use crate::EpochSeconds;

/// A source of the current time in epoch seconds.
pub trait Clock: Send + Sync + Debug {
    /// Current instant, in whole seconds since the Unix epoch.
    fn now(&self) -> EpochSeconds;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> EpochSeconds {
        Utc::now().timestamp()
    }
}

/// A clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    /// Create a clock frozen at `start`.
    pub fn new(start: EpochSeconds) -> Self {
        Self {
            now: AtomicI64::new(start),
        }
    }

    /// Jump to an absolute instant.
    pub fn set(&self, now: EpochSeconds) {
        self.now.store(now, Ordering::SeqCst);
    }

    /// Move forward by `secs` and return the new instant.
    pub fn advance(&self, secs: i64) -> EpochSeconds {
        self.now.fetch_add(secs, Ordering::SeqCst) + secs
    }
}

impl Clock for ManualClock {
    fn now(&self) -> EpochSeconds {
        self.now.load(Ordering::SeqCst)
    }
}
