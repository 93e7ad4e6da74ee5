//! When buffered fragments may become events.
//!
//! Fragments of one T3 arrive over a few seconds, so the oldest id in the
//! table is only finalised once the table spans the settle time or is
//! nearly full. An idle timeout releases the rest when traffic stops.

use adaq::config::BuilderConfig;
use std::time::Duration;

/// Flush decision parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FlushPolicy {
    /// Newest/oldest GPS gap that releases the oldest T3, in seconds.
    pub settle_seconds: u32,
    /// Table fill fraction that releases the oldest T3 regardless of age.
    pub pressure_fraction: f32,
    /// Quiet period after which everything buffered is released.
    pub idle_flush: Duration,
}

impl Default for FlushPolicy {
    fn default() -> Self {
        Self::from_config(&BuilderConfig::default())
    }
}

impl FlushPolicy {
    /// Policy of a `[builder]` section.
    pub fn from_config(builder: &BuilderConfig) -> Self {
        Self {
            settle_seconds: builder.settle_seconds,
            pressure_fraction: builder.pressure_fraction,
            idle_flush: Duration::from_secs(builder.idle_flush_seconds as u64),
        }
    }

    /// May the oldest T3 of a table be finalised?
    ///
    /// `newest` and `oldest` are the GPS seconds at both ends of the sorted
    /// table.
    pub fn should_flush(&self, newest: u32, oldest: u32, len: usize, capacity: usize) -> bool {
        if len == 0 {
            return false;
        }
        newest.saturating_sub(oldest) >= self.settle_seconds || self.under_pressure(len, capacity)
    }

    /// Table fill at or above the pressure fraction.
    #[inline]
    pub fn under_pressure(&self, len: usize, capacity: usize) -> bool {
        len as f32 >= self.pressure_fraction * capacity as f32
    }

    /// No fragment for at least the idle period.
    #[inline]
    pub fn idle_expired(&self, quiet: Duration) -> bool {
        quiet >= self.idle_flush
    }
}
