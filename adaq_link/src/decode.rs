//! Hardware fragment decoders.
//!
//! Two generations of station firmware deliver event records with different
//! header layouts. Both are turned into one [`EventFragment`]; the full
//! hardware record, header included, is kept as the raw payload so the
//! output files stay byte-compatible with what the station sent.

use adaq::record::fragment::FRAGMENT_HEADER_WORDS;
use adaq::record::{EventFragment, FragmentFlags, RecordError, join_u32};
use adaq::time::GpsTime;

/// Word offsets of the GRAND digitizer record header.
pub mod grand {
    /// Total record length in words.
    pub const LENGTH: usize = 0;
    /// Event id (the answered T3 event number).
    pub const EVENT_ID: usize = 1;
    /// Hardware (station) id.
    pub const HARDWARE: usize = 2;
    /// Header length in words.
    pub const HEADER_LENGTH: usize = 3;
    /// GPS second, two words.
    pub const SECOND: usize = 4;
    /// GPS nanosecond, two words.
    pub const NANOSECOND: usize = 6;
    /// Trigger position in the trace.
    pub const TRIGGER_POSITION: usize = 8;
    /// T3 trigger flags.
    pub const T3_FLAG: usize = 9;
    /// Minimum header size.
    pub const MIN_HEADER: usize = 10;
}

/// Word offsets of the AERA event body header.
pub mod aera {
    /// Total record length in words.
    pub const LENGTH: usize = 0;
    /// Event number.
    pub const EVENT_NUMBER: usize = 1;
    /// Station id.
    pub const STATION: usize = 2;
    /// Header length in words.
    pub const HEADER_LENGTH: usize = 3;
    /// GPS second, two words.
    pub const SECOND: usize = 4;
    /// GPS nanosecond, two words.
    pub const NANOSECOND: usize = 6;
    /// Trigger flags.
    pub const TRIGGER_FLAG: usize = 8;
    /// Minimum header size.
    pub const MIN_HEADER: usize = 9;
}

/// Record layout of a station.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FragmentLayout {
    /// GRAND digitizer records.
    Grand,
    /// AERA event bodies.
    Aera,
}

impl FragmentLayout {
    /// Decode a record of this layout.
    pub fn decode(&self, words: &[u16], max_words: usize) -> Result<EventFragment, RecordError> {
        match self {
            Self::Grand => decode_grand_fragment(words, max_words),
            Self::Aera => decode_aera_fragment(words, max_words),
        }
    }
}

/// Decode a GRAND digitizer record.
///
/// `max_words` is the largest raw record the event channel can carry.
pub fn decode_grand_fragment(words: &[u16], max_words: usize) -> Result<EventFragment, RecordError> {
    use grand::*;
    check_lengths(words, LENGTH, HEADER_LENGTH, MIN_HEADER, max_words)?;
    Ok(EventFragment {
        t3_id: words[EVENT_ID],
        station_id: words[HARDWARE],
        time: GpsTime::new(
            join_u32(words[SECOND], words[SECOND + 1]),
            join_u32(words[NANOSECOND], words[NANOSECOND + 1]),
        ),
        flags: FragmentFlags::from_bits_retain(words[T3_FLAG]),
        raw: words.to_vec(),
    })
}

/// Decode an AERA event body.
pub fn decode_aera_fragment(words: &[u16], max_words: usize) -> Result<EventFragment, RecordError> {
    use aera::*;
    check_lengths(words, LENGTH, HEADER_LENGTH, MIN_HEADER, max_words)?;
    Ok(EventFragment {
        t3_id: words[EVENT_NUMBER],
        station_id: words[STATION],
        time: GpsTime::new(
            join_u32(words[SECOND], words[SECOND + 1]),
            join_u32(words[NANOSECOND], words[NANOSECOND + 1]),
        ),
        flags: FragmentFlags::from_bits_retain(words[TRIGGER_FLAG]),
        raw: words.to_vec(),
    })
}

/// Largest raw record that fits an event slot of `slot_words`.
pub const fn max_raw_words(slot_words: usize) -> usize {
    slot_words.saturating_sub(FRAGMENT_HEADER_WORDS)
}

fn check_lengths(
    words: &[u16],
    length_at: usize,
    header_at: usize,
    min_header: usize,
    max_words: usize,
) -> Result<(), RecordError> {
    if words.len() < min_header {
        return Err(RecordError::Truncated {
            needed: min_header,
            got: words.len(),
        });
    }
    let declared = words[length_at] as usize;
    if declared != words.len() {
        return Err(RecordError::LengthMismatch {
            declared,
            actual: words.len(),
        });
    }
    if declared > max_words {
        return Err(RecordError::Oversized {
            len: declared,
            max: max_words,
        });
    }
    let header = words[header_at] as usize;
    if header > declared {
        return Err(RecordError::LengthMismatch {
            declared: header,
            actual: declared,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grand_record(event: u16, station: u16, second: u32, ns: u32, flag: u16, trace: &[u16]) -> Vec<u16> {
        let mut w = vec![0u16; grand::MIN_HEADER];
        w[grand::EVENT_ID] = event;
        w[grand::HARDWARE] = station;
        w[grand::HEADER_LENGTH] = grand::MIN_HEADER as u16;
        w[grand::SECOND] = (second & 0xffff) as u16;
        w[grand::SECOND + 1] = (second >> 16) as u16;
        w[grand::NANOSECOND] = (ns & 0xffff) as u16;
        w[grand::NANOSECOND + 1] = (ns >> 16) as u16;
        w[grand::TRIGGER_POSITION] = 512;
        w[grand::T3_FLAG] = flag;
        w.extend_from_slice(trace);
        w[grand::LENGTH] = w.len() as u16;
        w
    }

    fn aera_record(event: u16, station: u16, second: u32, ns: u32, flag: u16, trace: &[u16]) -> Vec<u16> {
        let mut w = vec![0u16; aera::MIN_HEADER];
        w[aera::EVENT_NUMBER] = event;
        w[aera::STATION] = station;
        w[aera::HEADER_LENGTH] = aera::MIN_HEADER as u16;
        w[aera::SECOND] = (second & 0xffff) as u16;
        w[aera::SECOND + 1] = (second >> 16) as u16;
        w[aera::NANOSECOND] = (ns & 0xffff) as u16;
        w[aera::NANOSECOND + 1] = (ns >> 16) as u16;
        w[aera::TRIGGER_FLAG] = flag;
        w.extend_from_slice(trace);
        w[aera::LENGTH] = w.len() as u16;
        w
    }

    #[test]
    fn both_layouts_yield_same_fragment_fields() {
        let trace = [1u16, 2, 3, 4];
        let g = decode_grand_fragment(&grand_record(77, 5101, 1_300_000_000, 123_456_789, 0x1000, &trace), 1000)
            .unwrap();
        let a = FragmentLayout::Aera
            .decode(&aera_record(77, 5101, 1_300_000_000, 123_456_789, 0x1000, &trace), 1000)
            .unwrap();

        for f in [&g, &a] {
            assert_eq!(f.t3_id, 77);
            assert_eq!(f.station_id, 5101);
            assert_eq!(f.time, GpsTime::new(1_300_000_000, 123_456_789));
            assert_eq!(f.flags, FragmentFlags::MINBIAS);
        }
        assert_eq!(&g.raw[grand::MIN_HEADER..], &trace);
        assert_eq!(&a.raw[aera::MIN_HEADER..], &trace);
    }

    #[test]
    fn declared_length_must_match_buffer() {
        let mut record = grand_record(1, 2, 3, 4, 0, &[9, 9]);
        record.push(0);
        assert!(matches!(
            decode_grand_fragment(&record, 1000),
            Err(RecordError::LengthMismatch { .. })
        ));
    }

    #[test]
    fn record_larger_than_slot_is_rejected() {
        let record = aera_record(1, 2, 3, 4, 0, &[0; 100]);
        assert!(matches!(
            decode_aera_fragment(&record, 50),
            Err(RecordError::Oversized { max: 50, .. })
        ));
    }

    #[test]
    fn short_header_is_truncated() {
        assert!(matches!(
            decode_grand_fragment(&[3, 0, 0], 1000),
            Err(RecordError::Truncated { .. })
        ));
    }

    #[test]
    fn header_length_beyond_record_is_rejected() {
        let mut record = aera_record(1, 2, 3, 4, 0, &[]);
        record[aera::HEADER_LENGTH] = 200;
        assert!(decode_aera_fragment(&record, 1000).is_err());
    }

    #[test]
    fn raw_limit_leaves_room_for_channel_header() {
        assert_eq!(max_raw_words(40_000), 40_000 - FRAGMENT_HEADER_WORDS);
        assert_eq!(max_raw_words(3), 0);
    }
}
