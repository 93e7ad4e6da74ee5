//! Event fragments and their ordering.

use super::{ChannelRecord, RecordError, join_u32, require, split_u32};
use crate::consts::{TAG_EVENT, TAG_NO_EVENT};
use crate::time::GpsTime;
use bitflags::bitflags;
use std::cmp::Ordering;

bitflags! {
    /// Trigger word of a fragment header.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct FragmentFlags: u16 {
        /// Answer to a ten-second (minbias) T3.
        const MINBIAS = 0x1000;
        /// Answer to a random T3.
        const RANDOM = 0x8000;
    }
}

/// One station's data for one T3 request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventFragment {
    /// Event number of the request being answered.
    pub t3_id: u16,
    /// Station that produced the data.
    pub station_id: u16,
    /// GPS time of the station trigger.
    pub time: GpsTime,
    /// Trigger word, all bits retained.
    pub flags: FragmentFlags,
    /// Raw hardware record, written to disk verbatim.
    pub raw: Vec<u16>,
}

/// Words before the raw record.
pub const FRAGMENT_HEADER_WORDS: usize = 8;

impl EventFragment {
    /// Size of the raw record in bytes.
    #[inline]
    pub fn raw_bytes(&self) -> usize {
        self.raw.len() * 2
    }

    /// Encoded length in words.
    pub fn encoded_len(&self) -> usize {
        FRAGMENT_HEADER_WORDS + self.raw.len()
    }
}

impl ChannelRecord for EventFragment {
    fn encode(&self, out: &mut Vec<u16>) {
        out.reserve(self.encoded_len());
        out.push(TAG_EVENT);
        out.push(self.t3_id);
        out.push(self.station_id);
        out.extend_from_slice(&split_u32(self.time.second));
        out.extend_from_slice(&split_u32(self.time.nanosecond));
        out.push(self.flags.bits());
        out.extend_from_slice(&self.raw);
    }

    fn decode(words: &[u16]) -> Result<Self, RecordError> {
        require(words, FRAGMENT_HEADER_WORDS)?;
        if words[0] != TAG_EVENT {
            return Err(RecordError::UnknownTag(words[0]));
        }
        Ok(Self {
            t3_id: words[1],
            station_id: words[2],
            time: GpsTime::new(join_u32(words[3], words[4]), join_u32(words[5], words[6])),
            flags: FragmentFlags::from_bits_retain(words[7]),
            raw: words[FRAGMENT_HEADER_WORDS..].to_vec(),
        })
    }
}

/// A station found nothing for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NoEvent {
    /// Event number of the request.
    pub event_number: u16,
    /// Answering station.
    pub station_id: u16,
}

impl ChannelRecord for NoEvent {
    fn encode(&self, out: &mut Vec<u16>) {
        out.extend_from_slice(&[TAG_NO_EVENT, self.event_number, self.station_id]);
    }

    fn decode(words: &[u16]) -> Result<Self, RecordError> {
        require(words, 3)?;
        if words[0] != TAG_NO_EVENT {
            return Err(RecordError::UnknownTag(words[0]));
        }
        Ok(Self {
            event_number: words[1],
            station_id: words[2],
        })
    }
}

/// Compare two wrapping event ids by recency.
///
/// `Greater` means `a` is newer. The ids are compared through their
/// difference modulo 2^16, so 5 is newer than 65530.
#[inline]
pub fn t3_id_cmp(a: u16, b: u16) -> Ordering {
    (a.wrapping_sub(b) as i16).cmp(&0)
}

/// Newest-first order for the fragment table: wraparound t3 id, then GPS
/// time, both descending.
pub fn recency_cmp(a: &EventFragment, b: &EventFragment) -> Ordering {
    t3_id_cmp(b.t3_id, a.t3_id).then_with(|| b.time.cmp(&a.time))
}
