//! T2 hit timestamps.
//!
//! A station reports its local triggers as a batch: one GPS second followed
//! by packed subsecond entries. Each entry is four bytes `NS1 NS2 NS3 AUX`
//! carried in two words; the subsecond is rebuilt from the three time bytes
//! plus the low nibble of `AUX`, the high nibble holds the trigger flags.

use super::{ChannelRecord, RecordError, join_u32, require, split_u32};
use crate::consts::{GIGA, TAG_T2};
use crate::time::GpsTime;
use bitflags::bitflags;

bitflags! {
    /// Trigger flags of a single hit (4 bits on the wire).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct HitFlags: u8 {
        /// Forced periodic (ten-second / minbias) trigger.
        const PERIODIC = 0x4;
        /// Hit selected for random background sampling.
        const RANDOM = 0x8;
    }
}

/// One packed subsecond entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct T2Entry {
    /// Subsecond bits 29..22.
    pub ns1: u8,
    /// Subsecond bits 21..14.
    pub ns2: u8,
    /// Subsecond bits 13..6.
    pub ns3: u8,
    /// Low nibble: subsecond bits 5..2; high nibble: trigger flags.
    pub aux: u8,
}

impl T2Entry {
    /// Pack a subsecond (ns) and flags. Bits 1..0 of the subsecond are lost.
    pub const fn new(subsecond: u32, flags: HitFlags) -> Self {
        Self {
            ns1: ((subsecond >> 22) & 0xff) as u8,
            ns2: ((subsecond >> 14) & 0xff) as u8,
            ns3: ((subsecond >> 6) & 0xff) as u8,
            aux: (((subsecond >> 2) & 0xf) as u8) | ((flags.bits() & 0xf) << 4),
        }
    }

    /// Subsecond in nanoseconds, as precise as the transport allows.
    #[inline]
    pub const fn subsecond(&self) -> u32 {
        ((self.ns1 as u32) << 22)
            | ((self.ns2 as u32) << 14)
            | ((self.ns3 as u32) << 6)
            | (((self.aux & 0xf) as u32) << 2)
    }

    /// Trigger flags carried in the high nibble.
    #[inline]
    pub const fn flags(&self) -> HitFlags {
        HitFlags::from_bits_retain((self.aux >> 4) & 0xf)
    }

    fn to_words(self) -> [u16; 2] {
        [
            ((self.ns1 as u16) << 8) | self.ns2 as u16,
            ((self.ns3 as u16) << 8) | self.aux as u16,
        ]
    }

    fn from_words(w0: u16, w1: u16) -> Self {
        Self {
            ns1: (w0 >> 8) as u8,
            ns2: (w0 & 0xff) as u8,
            ns3: (w1 >> 8) as u8,
            aux: (w1 & 0xff) as u8,
        }
    }
}

/// One station's T2 report: a GPS second and its subsecond entries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct T2Batch {
    /// Reporting station.
    pub station_id: u16,
    /// GPS second of the first entry.
    pub second: u32,
    /// Entries in arrival order.
    pub entries: Vec<T2Entry>,
}

/// Words used by the batch header (tag, station, second lo/hi).
pub const T2_HEADER_WORDS: usize = 4;

impl T2Batch {
    /// Encoded length in words.
    pub fn encoded_len(&self) -> usize {
        T2_HEADER_WORDS + 2 * self.entries.len()
    }

    /// Expand into hit records.
    ///
    /// Entries are in time order within the batch, so a subsecond smaller
    /// than its predecessor means the station crossed into the next second.
    pub fn hits(&self) -> impl Iterator<Item = HitRecord> + '_ {
        let mut second = self.second;
        let mut previous = 0u32;
        self.entries.iter().map(move |entry| {
            let subsecond = entry.subsecond();
            if subsecond < previous {
                second = second.wrapping_add(1);
            }
            previous = subsecond;
            HitRecord {
                station_id: self.station_id,
                time: GpsTime::new(second, subsecond),
                flags: entry.flags(),
                used: false,
            }
        })
    }
}

impl ChannelRecord for T2Batch {
    fn encode(&self, out: &mut Vec<u16>) {
        out.reserve(self.encoded_len());
        out.push(TAG_T2);
        out.push(self.station_id);
        out.extend_from_slice(&split_u32(self.second));
        for entry in &self.entries {
            out.extend_from_slice(&entry.to_words());
        }
    }

    fn decode(words: &[u16]) -> Result<Self, RecordError> {
        require(words, T2_HEADER_WORDS)?;
        if words[0] != TAG_T2 {
            return Err(RecordError::UnknownTag(words[0]));
        }
        let body = &words[T2_HEADER_WORDS..];
        if body.len() % 2 != 0 {
            return Err(RecordError::LengthMismatch {
                declared: body.len() / 2 * 2,
                actual: body.len(),
            });
        }
        Ok(Self {
            station_id: words[1],
            second: join_u32(words[2], words[3]),
            entries: body
                .chunks_exact(2)
                .map(|pair| T2Entry::from_words(pair[0], pair[1]))
                .collect(),
        })
    }
}

/// A single hit, as held in the coincidence window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HitRecord {
    /// Reporting station.
    pub station_id: u16,
    /// GPS time of the hit.
    pub time: GpsTime,
    /// Trigger flags.
    pub flags: HitFlags,
    /// Already part of an emitted T3.
    pub used: bool,
}

impl HitRecord {
    /// Same station and identical timestamp.
    #[inline]
    pub fn same_hit(&self, other: &HitRecord) -> bool {
        self.station_id == other.station_id && self.time == other.time
    }

    /// Subsecond within one second.
    #[inline]
    pub fn is_plausible(&self) -> bool {
        self.time.nanosecond < GIGA
    }
}
