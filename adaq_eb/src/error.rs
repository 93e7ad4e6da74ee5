//! Error types of the event builder

use adaq::config::ConfigError;
use adaq_shared_memory::ShmError;
use thiserror::Error;

/// Startup failures. Disk errors while running only disable a stream.
#[derive(Error, Debug)]
pub enum BuilderError {
    /// Configuration could not be loaded or is invalid
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A ring channel could not be opened
    #[error("Channel error: {0}")]
    Shm(#[from] ShmError),

    /// The output directory is not usable
    #[error("Output directory error: {0}")]
    Io(#[from] std::io::Error),
}
