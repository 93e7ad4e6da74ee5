//! Error types for ring channel operations

use adaq::config::ChannelGeometry;
use thiserror::Error;

/// Errors that can occur while creating or attaching a ring channel.
///
/// Runtime reads and writes never fail with an error; they report
/// availability instead.
#[derive(Error, Debug)]
pub enum ShmError {
    /// Channel file does not exist
    #[error("Channel not found: {name}")]
    NotFound {
        /// Channel path
        name: String,
    },

    /// Channel file exists but is not a ring channel
    #[error("Channel {name} has an invalid header")]
    BadMagic {
        /// Channel path
        name: String,
    },

    /// Channel file is shorter than its header claims
    #[error("Channel {name} is truncated: {size} bytes, expected {expected}")]
    Truncated {
        /// Channel path
        name: String,
        /// Actual file size
        size: usize,
        /// Size implied by the header
        expected: usize,
    },

    /// Zero slots or zero words per slot
    #[error("Invalid channel geometry: {slots} slots of {words} words")]
    InvalidGeometry {
        /// Requested slot count
        slots: u32,
        /// Requested payload words per slot
        words: u32,
    },

    /// Reader count outside 1..=MAX_READERS
    #[error("Invalid reader count {readers} (max {max})")]
    InvalidReaders {
        /// Requested reader count
        readers: u8,
        /// Supported maximum
        max: u8,
    },

    /// Existing channel was created with another layout
    #[error("Channel {name} geometry mismatch: configured {expected:?}, found {found:?}")]
    GeometryMismatch {
        /// Channel path
        name: String,
        /// Geometry from configuration
        expected: ChannelGeometry,
        /// Geometry stored in the channel header
        found: ChannelGeometry,
    },

    /// IO error
    #[error("IO error: {source}")]
    Io {
        /// Source IO error
        #[from]
        source: std::io::Error,
    },
}

/// Result type for ring channel setup
pub type ShmResult<T> = Result<T, ShmError>;
