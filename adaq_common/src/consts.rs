//! System-wide constants for the ADAQ workspace.
//!
//! Message tags keep the numbering used by the station firmware so that
//! captured traffic stays readable.

/// Station telemetry, written to the monitor log.
pub const TAG_MONITOR: u16 = 6;

/// Start a run.
pub const TAG_START: u16 = 7;

/// Stop the current run.
pub const TAG_STOP: u16 = 8;

/// Reinitialize one station (or all when the station id is 0).
pub const TAG_INITIALIZE: u16 = 3;

/// Batch of T2 hit timestamps from one station.
pub const TAG_T2: u16 = 9;

/// Physics T3 request.
pub const TAG_GET_EVENT: u16 = 10;

/// Station answer: no data for the requested event.
pub const TAG_NO_EVENT: u16 = 11;

/// Event fragment answering a T3 request.
pub const TAG_EVENT: u16 = 12;

/// Ten-second (minbias) T3 request.
pub const TAG_GET_MINBIAS_EVENT: u16 = 29;

/// Random T3 request.
pub const TAG_GET_RANDOM_EVENT: u16 = 32;

/// Maximum number of stations listed in one T3 request.
pub const MAX_T3_STATIONS: usize = 64;

/// One second in nanoseconds.
pub const GIGA: u32 = 1_000_000_000;

/// Speed of light in metres per nanosecond.
pub const LIGHT_SPEED_M_PER_NS: f64 = 0.299_792_458;

/// Event header version written into every physics event.
pub const EVENT_VERSION: u16 = 3;

/// Highest file serial within a run before the run id advances.
pub const MAX_FILE_SERIAL: u32 = 9999;

/// Reader id of the Station Link on multi-reader channels.
pub const LINK_READER: u8 = 0;

/// Reader id of the Assembler on multi-reader channels.
pub const BUILDER_READER: u8 = 1;

/// Default configuration file path.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/adaq/adaq.toml";
