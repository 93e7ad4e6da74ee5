//! # ADAQ Station Link
//!
//! The channel side of the Station Link: everything the network layer needs
//! to hand station data to the trigger and event builder, and to pick up
//! T3 requests and commands for the stations. Socket handling lives
//! elsewhere.
//!
//! - [`decode`] turns the two hardware record layouts into one fragment type
//! - [`link`] wraps the ring channels as [`StationLink`]

pub mod decode;
pub mod link;

pub use decode::{FragmentLayout, decode_aera_fragment, decode_grand_fragment};
pub use link::{EventRequest, LinkStats, StationLink, submit_command};
