//! Error types of the T3 maker

use adaq::config::ConfigError;
use adaq_shared_memory::ShmError;
use thiserror::Error;

/// Startup failures. Once running, the T3 maker only counts and logs.
#[derive(Error, Debug)]
pub enum TriggerError {
    /// Configuration could not be loaded or is invalid
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A ring channel could not be opened
    #[error("Channel error: {0}")]
    Shm(#[from] ShmError),
}
