//! GPS timestamps.
//!
//! Stations report time as a GPS second plus a nanosecond offset within that
//! second. The pair is assumed already corrected by the station; this module
//! only orders and subtracts them.

use crate::consts::GIGA;
use std::time::{SystemTime, UNIX_EPOCH};

/// A GPS second/nanosecond pair. Ordered by second, then nanosecond.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GpsTime {
    /// Whole GPS seconds.
    pub second: u32,
    /// Nanoseconds within the second.
    pub nanosecond: u32,
}

impl GpsTime {
    /// Create a timestamp.
    pub const fn new(second: u32, nanosecond: u32) -> Self {
        Self { second, nanosecond }
    }

    /// Timestamp for the current wall-clock time.
    ///
    /// The DAQ treats GPS seconds and host seconds as interchangeable for
    /// settle-time purposes; only differences of a second or more matter.
    pub fn now() -> Self {
        let since_epoch = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        Self {
            second: since_epoch.as_secs() as u32,
            nanosecond: since_epoch.subsec_nanos(),
        }
    }

    /// Total nanoseconds since the GPS epoch.
    #[inline]
    pub const fn as_nanos(&self) -> u64 {
        self.second as u64 * GIGA as u64 + self.nanosecond as u64
    }

    /// Nanoseconds from `earlier` to `self`, saturating at zero.
    #[inline]
    pub const fn nanos_since(&self, earlier: &GpsTime) -> u64 {
        self.as_nanos().saturating_sub(earlier.as_nanos())
    }
}

impl std::fmt::Display for GpsTime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{:09}", self.second, self.nanosecond)
    }
}
