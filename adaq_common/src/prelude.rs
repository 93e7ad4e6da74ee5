//! Prelude module for common re-exports.
//!
//! ```rust
//! use adaq_common::prelude::*;
//! ```

use std::time::Duration;

// ─── Logging ────────────────────────────────────────────────────────
pub use crate::config::LogLevel;

// ─── Configuration ──────────────────────────────────────────────────
pub use crate::config::{ConfigError, ConfigLoader, DaqConfig, SharedConfig, StationConfig};

// ─── Constants ──────────────────────────────────────────────────────
pub use crate::consts::{BUILDER_READER, LINK_READER, MAX_T3_STATIONS};

// ─── Records ────────────────────────────────────────────────────────
pub use crate::record::{
    ChannelRecord, Command, EventFragment, FragmentFlags, HitFlags, HitRecord, MonitorReport,
    NoEvent, RecordError, StationMessage, T2Batch, T2Entry, T3Request, T3Station, TriggerType,
};
pub use crate::time::GpsTime;

/// Poll interval of the correlation engine.
pub const DEFAULT_TRIGGER_POLL: Duration = Duration::from_millis(100);
