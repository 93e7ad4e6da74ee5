//! # ADAQ T3 Maker
//!
//! Correlation engine of the array. Stations report local triggers (T2) as
//! batches of GPS-stamped hits; the T3 maker keeps the last seconds of hits
//! in a time-sorted window and emits an array trigger (T3) whenever enough
//! stations saw the same shower front.
//!
//! - [`geometry`] - station table and per-pair coincidence windows
//! - [`window`] - bounded, newest-first hit window
//! - [`correlator`] - the coincidence scan and T3 numbering
//! - [`engine`] - channel I/O and the poll loop

#![deny(missing_docs)]

pub mod correlator;
pub mod engine;
pub mod error;
pub mod geometry;
pub mod window;

pub use correlator::{Correlator, TriggerStats};
pub use engine::TriggerEngine;
pub use error::TriggerError;
pub use geometry::StationTable;
pub use window::{CoincidenceWindow, IngestOutcome};
