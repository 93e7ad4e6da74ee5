//! T3 requests: the list of stations asked to send their data for one
//! coincidence.

use super::{ChannelRecord, RecordError, first_word, require};
use crate::consts::{MAX_T3_STATIONS, TAG_GET_EVENT, TAG_GET_MINBIAS_EVENT, TAG_GET_RANDOM_EVENT};
use crate::time::GpsTime;

/// Why a T3 was issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TriggerType {
    /// Multi-station coincidence.
    Physics,
    /// Forced periodic (ten-second) trigger.
    TenSecond,
    /// Random background sample.
    Random,
}

impl TriggerType {
    /// Message tag sent to the stations.
    pub const fn tag(&self) -> u16 {
        match self {
            Self::Physics => TAG_GET_EVENT,
            Self::TenSecond => TAG_GET_MINBIAS_EVENT,
            Self::Random => TAG_GET_RANDOM_EVENT,
        }
    }

    /// Parse a request tag.
    pub const fn from_tag(tag: u16) -> Option<Self> {
        match tag {
            TAG_GET_EVENT => Some(Self::Physics),
            TAG_GET_MINBIAS_EVENT => Some(Self::TenSecond),
            TAG_GET_RANDOM_EVENT => Some(Self::Random),
            _ => None,
        }
    }
}

/// One station entry of a T3 request.
///
/// Only the low byte of the second and subsecond bits 29..6 travel; the
/// station resolves the rest from its own recent history.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct T3Station {
    /// Station asked for data; 0 addresses every station.
    pub station_id: u16,
    /// Low byte of the GPS second.
    pub second_low: u8,
    /// Subsecond >> 6, 24 bits.
    pub subsecond_bits: u32,
}

impl T3Station {
    /// Entry for a hit of `station_id` at `time`.
    pub const fn from_hit(station_id: u16, time: GpsTime) -> Self {
        Self {
            station_id,
            second_low: (time.second & 0xff) as u8,
            subsecond_bits: (time.nanosecond >> 6) & 0x00ff_ffff,
        }
    }
}

/// A coincidence request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct T3Request {
    /// Trigger condition that fired.
    pub trigger_type: TriggerType,
    /// Wrapping event number; fragments answer with it as their t3 id.
    pub event_number: u16,
    /// Stations that took part, seed first.
    pub stations: heapless::Vec<T3Station, MAX_T3_STATIONS>,
}

/// Words used by the request header (tag, event number, count).
pub const T3_HEADER_WORDS: usize = 3;

/// Words per station entry.
pub const T3_STATION_WORDS: usize = 3;

impl T3Request {
    /// Encoded length in words.
    pub fn encoded_len(&self) -> usize {
        T3_HEADER_WORDS + T3_STATION_WORDS * self.stations.len()
    }
}

impl ChannelRecord for T3Request {
    fn encode(&self, out: &mut Vec<u16>) {
        out.reserve(self.encoded_len());
        out.push(self.trigger_type.tag());
        out.push(self.event_number);
        out.push(self.stations.len() as u16);
        for station in &self.stations {
            out.push(station.station_id);
            out.push(((station.second_low as u16) << 8) | ((station.subsecond_bits >> 16) as u16 & 0xff));
            out.push((station.subsecond_bits & 0xffff) as u16);
        }
    }

    fn decode(words: &[u16]) -> Result<Self, RecordError> {
        let tag = first_word(words)?;
        let trigger_type = TriggerType::from_tag(tag).ok_or(RecordError::UnknownTag(tag))?;
        require(words, T3_HEADER_WORDS)?;
        let count = words[2] as usize;
        if count > MAX_T3_STATIONS {
            return Err(RecordError::TooManyStations(count));
        }
        let body = &words[T3_HEADER_WORDS..];
        if body.len() != count * T3_STATION_WORDS {
            return Err(RecordError::LengthMismatch {
                declared: count * T3_STATION_WORDS,
                actual: body.len(),
            });
        }
        let mut stations = heapless::Vec::new();
        for entry in body.chunks_exact(T3_STATION_WORDS) {
            let station = T3Station {
                station_id: entry[0],
                second_low: (entry[1] >> 8) as u8,
                subsecond_bits: (((entry[1] & 0xff) as u32) << 16) | entry[2] as u32,
            };
            stations
                .push(station)
                .map_err(|_| RecordError::TooManyStations(count))?;
        }
        Ok(Self {
            trigger_type,
            event_number: words[1],
            stations,
        })
    }
}
