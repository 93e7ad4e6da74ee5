//! ADAQ Common Library
//!
//! This crate provides shared constants, configuration loading and the
//! record types exchanged over the ADAQ ring channels.
//!
//! # Module Structure
//!
//! - [`config`] - Configuration loading traits and the deployment config
//! - [`consts`] - Message tags and system-wide limits
//! - [`record`] - Channel records (T2 batches, T3 requests, fragments, commands)
//! - [`time`] - GPS second/nanosecond timestamps
//! - [`prelude`] - Common re-exports for convenience
//!
//! # Usage
//!
//! Add to your `Cargo.toml` with alias for shorter imports:
//! ```toml
//! [dependencies]
//! adaq = { package = "adaq_common", path = "../adaq_common" }
//! ```
//!
//! Then import:
//! ```rust
//! use adaq_common::config::{ConfigLoader, DaqConfig};
//! use adaq_common::record::ChannelRecord;
//! ```

pub mod config;
pub mod consts;
pub mod prelude;
pub mod record;
pub mod time;
