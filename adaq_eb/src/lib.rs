//! # ADAQ Event Builder
//!
//! Collects the fragments stations send in answer to T3 requests, merges
//! all fragments of one T3 into a physics event and writes the events to
//! per-stream binary files. Station telemetry goes to a text log.
//!
//! - [`flush`] - when buffered fragments may be finalised
//! - [`table`] - the newest-first fragment table and merging
//! - [`event`] - physics events and the on-disk headers
//! - [`output`] - file sets, rotation and the monitor log
//! - [`assembler`] - channel intake, commands and the poll loop

#![deny(missing_docs)]

pub mod assembler;
pub mod error;
pub mod event;
pub mod flush;
pub mod output;
pub mod table;

pub use assembler::{Assembler, BuilderStats};
pub use error::BuilderError;
pub use event::{EventHeader, FileHeader, PhysicsEvent, StreamKind};
pub use flush::FlushPolicy;
pub use output::{OutputStats, OutputStreams, RunParams, event_file_path, monitor_file_path};
pub use table::FragmentTable;
