//! Configuration loading traits and types.
//!
//! One TOML file describes a whole ADAQ deployment: channel geometry, trigger
//! parameters, event builder settings and the station table. Every process
//! loads the same file and picks the sections it needs.
//!
//! # Usage
//!
//! ```rust,no_run
//! use adaq_common::config::{ConfigError, DaqConfig};
//! use std::path::Path;
//!
//! fn main() -> Result<(), ConfigError> {
//!     let config = DaqConfig::from_file(Path::new("adaq.toml"))?;
//!     println!("Service: {}", config.shared.service_name);
//!     Ok(())
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Error type for configuration loading operations.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    /// Configuration file not found at specified path.
    #[error("Configuration file not found: {0:?}")]
    FileNotFound(PathBuf),

    /// TOML parsing failed.
    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    /// Semantic validation failed.
    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

/// Log level for application logging.
///
/// Uses lowercase serde values for TOML compatibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Most verbose, detailed tracing information.
    Trace,
    /// Debug information useful during development.
    Debug,
    /// General information about application operation.
    #[default]
    Info,
    /// Warning messages for potentially problematic situations.
    Warn,
    /// Error messages for serious problems.
    Error,
}

impl LogLevel {
    /// Directive string understood by `tracing_subscriber::EnvFilter`.
    pub const fn as_directive(&self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

/// Common configuration fields shared across all ADAQ processes.
///
/// # TOML Example
///
/// ```toml
/// [shared]
/// log_level = "debug"
/// service_name = "adaq-site-a"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SharedConfig {
    /// Logging verbosity level.
    #[serde(default)]
    pub log_level: LogLevel,

    /// Deployment identifier, used as a prefix for channel files.
    pub service_name: String,
}

impl SharedConfig {
    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` if `service_name` is empty.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.service_name.is_empty() {
            return Err(ConfigError::ValidationError(
                "service_name cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Geometry of one ring channel: number of slots and payload words per slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelGeometry {
    /// Number of slots in the ring.
    pub slots: u32,
    /// Maximum payload length of one slot, in 16-bit words.
    pub words: u32,
}

impl ChannelGeometry {
    /// Create a geometry.
    pub const fn new(slots: u32, words: u32) -> Self {
        Self { slots, words }
    }

    fn validate(&self, name: &str) -> Result<(), ConfigError> {
        if self.slots == 0 || self.words == 0 {
            return Err(ConfigError::ValidationError(format!(
                "channel '{name}' needs at least one slot and one word (got {}x{})",
                self.slots, self.words
            )));
        }
        Ok(())
    }
}

/// `[channels]` section: where channel files live and how big they are.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelsConfig {
    /// Directory holding the channel files.
    pub dir: PathBuf,
    /// Write attempts before a record is dropped.
    pub retry_attempts: u32,
    /// Sleep between write attempts, in microseconds.
    pub retry_backoff_us: u64,
    /// T2 hit batches, Station Link to T3 maker.
    pub t2: ChannelGeometry,
    /// T3 requests, T3 maker to Station Link and event builder.
    pub t3: ChannelGeometry,
    /// Fragments and monitor reports, Station Link to event builder.
    pub event: ChannelGeometry,
    /// Administrative commands, front ends to Station Link and event builder.
    pub command: ChannelGeometry,
}

impl Default for ChannelsConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("/dev/shm"),
            retry_attempts: 10,
            retry_backoff_us: 1000,
            t2: ChannelGeometry::new(40, 1000),
            t3: ChannelGeometry::new(500, 200),
            event: ChannelGeometry::new(10, 40_000),
            command: ChannelGeometry::new(20, 5000),
        }
    }
}

/// `[trigger]` section: correlation engine parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TriggerConfig {
    /// Poll period of the T3 maker, in milliseconds.
    pub poll_interval_ms: u64,
    /// Tag every Nth untagged hit as random; 0 disables.
    pub random_fraction: u32,
    /// Hits older than this (wall clock) are evicted.
    pub window_seconds: u32,
    /// Minimum age of a seed hit before it may trigger, in nanoseconds.
    pub settle_ns: u64,
    /// Global upper bound on any station pair window, in nanoseconds.
    pub coincidence_ns: u32,
    /// Pair windows at or below this count as near neighbours.
    pub near_ns: u32,
    /// Minimum number of distinct stations for a physics trigger.
    pub min_stations: usize,
    /// Minimum number of near neighbours of the seed.
    pub min_near: usize,
    /// Constant added to every light-travel pair window, in nanoseconds.
    pub pair_offset_ns: u32,
    /// Expected maximum hit rate per station, used to size the window.
    pub max_rate: u32,
}

impl Default for TriggerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 100,
            random_fraction: 0,
            window_seconds: 12,
            settle_ns: 1_000_000_000,
            coincidence_ns: 34_000,
            near_ns: 4_900,
            min_stations: 4,
            min_near: 2,
            pair_offset_ns: 100,
            max_rate: 1000,
        }
    }
}

/// `[builder]` section: event builder parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BuilderConfig {
    /// Run id used by the next Start.
    pub run_id: u32,
    /// Run mode recorded in every file header.
    pub run_mode: u32,
    /// Main stream events per file before rotation.
    pub max_events_per_file: u32,
    /// Root directory for the output streams.
    pub output_dir: PathBuf,
    /// Poll period of the event builder, in milliseconds.
    pub poll_interval_ms: u64,
    /// Newest/oldest GPS gap that releases the oldest fragments, in seconds.
    pub settle_seconds: u32,
    /// Fraction of the fragment table that forces a flush.
    pub pressure_fraction: f32,
    /// Fragment table slots per configured station.
    pub fragments_per_station: usize,
    /// Flush the whole table after this long without a new fragment, in
    /// seconds.
    pub idle_flush_seconds: u32,
}

impl Default for BuilderConfig {
    fn default() -> Self {
        Self {
            run_id: 1,
            run_mode: 0,
            max_events_per_file: 10,
            output_dir: PathBuf::from("data"),
            poll_interval_ms: 1,
            settle_seconds: 5,
            pressure_fraction: 0.8,
            fragments_per_station: 5,
            idle_flush_seconds: 5,
        }
    }
}

/// One detector station and its position in metres.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StationConfig {
    /// Station id as reported in T2 batches.
    pub id: u16,
    /// East coordinate.
    pub x: f64,
    /// North coordinate.
    pub y: f64,
}

/// Complete deployment configuration.
///
/// # TOML Example
///
/// ```toml
/// [shared]
/// service_name = "adaq"
///
/// [builder]
/// output_dir = "/data/adaq"
///
/// [[stations]]
/// id = 5100
/// x = 0.0
/// y = 0.0
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaqConfig {
    /// Common fields.
    pub shared: SharedConfig,
    /// Ring channel layout.
    #[serde(default)]
    pub channels: ChannelsConfig,
    /// Correlation engine.
    #[serde(default)]
    pub trigger: TriggerConfig,
    /// Event builder.
    #[serde(default)]
    pub builder: BuilderConfig,
    /// Station table.
    #[serde(default)]
    pub stations: Vec<StationConfig>,
}

impl DaqConfig {
    /// Load and validate a deployment configuration.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let config = Self::load(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate cross-field constraints.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` if:
    /// - the shared section is invalid
    /// - the station table is empty or has duplicate ids
    /// - any channel has zero slots or words
    /// - `max_events_per_file` is zero
    /// - `pressure_fraction` is outside (0, 1]
    /// - `near_ns` exceeds `coincidence_ns`
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.shared.validate()?;

        if self.stations.is_empty() {
            return Err(ConfigError::ValidationError(
                "at least one station is required".to_string(),
            ));
        }
        let mut ids = HashSet::new();
        for station in &self.stations {
            if !ids.insert(station.id) {
                return Err(ConfigError::ValidationError(format!(
                    "duplicate station id {}",
                    station.id
                )));
            }
        }

        self.channels.t2.validate("t2")?;
        self.channels.t3.validate("t3")?;
        self.channels.event.validate("event")?;
        self.channels.command.validate("command")?;

        if self.builder.max_events_per_file == 0 {
            return Err(ConfigError::ValidationError(
                "max_events_per_file must be positive".to_string(),
            ));
        }
        let pressure = self.builder.pressure_fraction;
        if !(pressure > 0.0 && pressure <= 1.0) {
            return Err(ConfigError::ValidationError(format!(
                "pressure_fraction {pressure} must lie in (0, 1]"
            )));
        }
        if self.trigger.near_ns > self.trigger.coincidence_ns {
            return Err(ConfigError::ValidationError(format!(
                "near_ns {} exceeds coincidence_ns {}",
                self.trigger.near_ns, self.trigger.coincidence_ns
            )));
        }
        Ok(())
    }

    /// Fragment table capacity of the event builder.
    pub fn fragment_capacity(&self) -> usize {
        (self.builder.fragments_per_station * self.stations.len()).max(1)
    }

    /// Coincidence window capacity of the T3 maker.
    pub fn window_capacity(&self) -> usize {
        let per_station = self.trigger.window_seconds as usize * self.trigger.max_rate as usize;
        (per_station * self.stations.len()).max(1)
    }
}

/// Trait for loading configuration from TOML files.
///
/// This trait provides a default implementation that works with any type
/// implementing `serde::de::DeserializeOwned`.
///
/// # Contract
///
/// - Returns `ConfigError::FileNotFound` if the file does not exist
/// - Returns `ConfigError::ParseError` if TOML syntax is invalid
pub trait ConfigLoader: Sized + serde::de::DeserializeOwned {
    /// Load configuration from a TOML file.
    fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::FileNotFound(path.to_path_buf())
            } else {
                ConfigError::ParseError(e.to_string())
            }
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }
}

// Any serde-deserializable struct can use ConfigLoader.
impl<T: serde::de::DeserializeOwned> ConfigLoader for T {}
