//! Freshness classification for stored records.
//!
//! A stored record is in exactly one of three states relative to "now".
//! Absence is not a freshness state; drivers report it as `None`.

use serde::{Deserialize, Serialize};

use crate::record::Horizons;

/// How a stored record relates to its horizons at a given instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Freshness {
    /// Younger than every enabled horizon; served as-is.
    Fresh,

    /// Past `stale_after` but not expired; served with the stale flag while
    /// a refresh runs in the background.
    Stale,

    /// Past `expire_after`; never served, deleted on sight.
    Expired,
}

impl Freshness {
    /// Classify an age (seconds) against a pair of horizons.
    ///
    /// Expiry is checked first, so a record with `stale_after > expire_after`
    /// still expires on time.
    pub fn classify(age: i64, horizons: Horizons) -> Self {
        if horizons.expire_after != 0 && age >= horizons.expire_after {
            Self::Expired
        } else if horizons.stale_after != 0 && age >= horizons.stale_after {
            Self::Stale
        } else {
            Self::Fresh
        }
    }

    pub fn is_stale(&self) -> bool {
        matches!(self, Self::Stale)
    }

    pub fn is_expired(&self) -> bool {
        matches!(self, Self::Expired)
    }
}
