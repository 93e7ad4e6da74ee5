//! # ADAQ Shared Memory Ring Channels
//!
//! Bounded, non-blocking, multi-reader ring channels over memory-mapped
//! files. They are the only shared state between the Station Link, the T3
//! maker and the event builder.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────┐   t2    ┌──────────────┐   t3    ┌──────────────┐
//! │ Station Link ├────────►│   T3 maker   ├────────►│ Station Link │
//! │              │         └──────────────┘    │    └──────────────┘
//! │              │  event  ┌──────────────┐    │
//! │              ├────────►│ Event builder│◄───┘ (second reader)
//! └──────────────┘         └──────────────┘
//!                 command: front ends → Station Link + event builder
//! ```
//!
//! ## Usage
//!
//! ```rust,no_run
//! use adaq::config::ChannelGeometry;
//! use adaq_shared_memory::RingChannel;
//! use std::path::Path;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut channel = RingChannel::open_or_create(
//!     Path::new("/dev/shm/adaq_t3"),
//!     ChannelGeometry::new(500, 200),
//!     2,
//! )?;
//! if !channel.try_write(&[10, 1, 0]) {
//!     tracing::warn!("t3 channel saturated, request dropped");
//! }
//! if let Some(slot) = channel.try_read(0) {
//!     channel.ack(0, slot.cursor);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Error Handling
//!
//! Creating or attaching returns `Result<T, ShmError>`. Reads and writes
//! never fail: `try_write` returns `false` when the record was dropped and
//! `try_read` returns `None` when nothing is pending.

#![deny(missing_docs)]
#![warn(clippy::all)]

pub mod channel;
pub mod error;
pub mod platform;

pub use channel::{
    ChannelHeader, ChannelSet, MAX_READERS, ReadSlot, RetryPolicy, RingChannel, channel_path,
    channel_size,
};
pub use error::{ShmError, ShmResult};

/// Initialize tracing for tools and tests that have no subscriber of their own.
pub fn init_tracing() {
    use tracing_subscriber::{EnvFilter, fmt};

    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_line_number(true)
        .finish();

    let _ = tracing::subscriber::set_global_default(subscriber);
}
