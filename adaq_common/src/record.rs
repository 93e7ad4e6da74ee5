//! Records carried by the ring channels.
//!
//! Every channel payload is a sequence of 16-bit words starting with a tag
//! word. The submodules define one record family each:
//!
//! - `t2`: hit timestamp batches and the expanded [`HitRecord`]
//! - `t3`: coincidence requests sent back to the stations
//! - `fragment`: event fragments, no-event answers and the wraparound id order
//! - `monitor`: station telemetry
//! - `command`: administrative commands
//!
//! [`StationMessage`] groups everything a station can put on the event
//! channel so a single reader can dispatch on the tag.

use thiserror::Error;

pub mod command;
pub mod fragment;
pub mod monitor;
pub mod t2;
pub mod t3;

pub use command::Command;
pub use fragment::{EventFragment, FragmentFlags, NoEvent, recency_cmp, t3_id_cmp};
pub use monitor::MonitorReport;
pub use t2::{HitFlags, HitRecord, T2Batch, T2Entry};
pub use t3::{T3Request, T3Station, TriggerType};

use crate::consts::{TAG_EVENT, TAG_MONITOR, TAG_NO_EVENT};

/// A record failed its sanity checks and must be discarded.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecordError {
    /// Fewer words than the fixed part of the record needs.
    #[error("record truncated: need {needed} words, got {got}")]
    Truncated {
        /// Minimum length in words.
        needed: usize,
        /// Actual length in words.
        got: usize,
    },

    /// Tag not valid for this record family.
    #[error("unknown record tag {0}")]
    UnknownTag(u16),

    /// Encoded record larger than the slot it must fit.
    #[error("record of {len} words exceeds limit of {max}")]
    Oversized {
        /// Encoded length in words.
        len: usize,
        /// Allowed length in words.
        max: usize,
    },

    /// A length field disagrees with the data actually present.
    #[error("declared length {declared} does not match actual length {actual}")]
    LengthMismatch {
        /// Length claimed by the record.
        declared: usize,
        /// Length found.
        actual: usize,
    },

    /// More stations than a T3 request can list.
    #[error("too many stations in request: {0}")]
    TooManyStations(usize),
}

/// A value that can be stored in a ring channel slot.
pub trait ChannelRecord: Sized {
    /// Append the encoded words to `out`.
    fn encode(&self, out: &mut Vec<u16>);

    /// Decode a complete slot payload.
    fn decode(words: &[u16]) -> Result<Self, RecordError>;

    /// Encode into a fresh buffer.
    fn to_words(&self) -> Vec<u16> {
        let mut out = Vec::new();
        self.encode(&mut out);
        out
    }
}

/// Anything a station delivers on the event channel.
#[derive(Debug, Clone, PartialEq)]
pub enum StationMessage {
    /// Answer to a T3 request.
    Fragment(EventFragment),
    /// The station had no data for a request.
    NoEvent(NoEvent),
    /// Telemetry, logged directly.
    Monitor(MonitorReport),
}

impl ChannelRecord for StationMessage {
    fn encode(&self, out: &mut Vec<u16>) {
        match self {
            Self::Fragment(fragment) => fragment.encode(out),
            Self::NoEvent(no_event) => no_event.encode(out),
            Self::Monitor(report) => report.encode(out),
        }
    }

    fn decode(words: &[u16]) -> Result<Self, RecordError> {
        match first_word(words)? {
            TAG_EVENT => EventFragment::decode(words).map(Self::Fragment),
            TAG_NO_EVENT => NoEvent::decode(words).map(Self::NoEvent),
            TAG_MONITOR => MonitorReport::decode(words).map(Self::Monitor),
            tag => Err(RecordError::UnknownTag(tag)),
        }
    }
}

/// Split a 32-bit value into (low, high) words.
#[inline]
pub const fn split_u32(value: u32) -> [u16; 2] {
    [(value & 0xffff) as u16, (value >> 16) as u16]
}

/// Join (low, high) words into a 32-bit value.
#[inline]
pub const fn join_u32(low: u16, high: u16) -> u32 {
    (low as u32) | ((high as u32) << 16)
}

/// Ensure `words` holds at least `needed` words.
pub(crate) fn require(words: &[u16], needed: usize) -> Result<(), RecordError> {
    if words.len() < needed {
        return Err(RecordError::Truncated {
            needed,
            got: words.len(),
        });
    }
    Ok(())
}

pub(crate) fn first_word(words: &[u16]) -> Result<u16, RecordError> {
    words
        .first()
        .copied()
        .ok_or(RecordError::Truncated { needed: 1, got: 0 })
}
