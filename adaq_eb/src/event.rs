//! Physics events and their on-disk headers.
//!
//! Every output file starts with a [`FileHeader`]; each event is an
//! [`EventHeader`] followed by the raw fragments of all contributing
//! stations. All fields are little-endian.

use adaq::consts::EVENT_VERSION;
use adaq::record::{EventFragment, FragmentFlags};
use adaq::time::GpsTime;
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{self, Read, Write};

/// Bytes of an event header.
pub const EVENT_HEADER_BYTES: usize = 44;

/// Bytes of a file header.
pub const FILE_HEADER_BYTES: usize = 40;

/// Output stream an event belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamKind {
    /// Physics triggers.
    Main,
    /// Ten-second (minimum bias) triggers.
    Minbias,
    /// Random triggers.
    Random,
}

impl StreamKind {
    /// All event streams, in file-set order.
    pub const ALL: [StreamKind; 3] = [StreamKind::Main, StreamKind::Minbias, StreamKind::Random];

    /// Stream for a merged trigger word. Minbias wins over random.
    pub fn for_flags(flags: FragmentFlags) -> Self {
        if flags.contains(FragmentFlags::MINBIAS) {
            StreamKind::Minbias
        } else if flags.contains(FragmentFlags::RANDOM) {
            StreamKind::Random
        } else {
            StreamKind::Main
        }
    }

    /// Subdirectory under the output root.
    pub const fn dir(&self) -> &'static str {
        match self {
            StreamKind::Main => "AD",
            StreamKind::Minbias => "TD",
            StreamKind::Random => "MD",
        }
    }

    /// File name prefix.
    pub const fn prefix(&self) -> &'static str {
        match self {
            StreamKind::Main => "ad",
            StreamKind::Minbias => "td",
            StreamKind::Random => "md",
        }
    }

    #[inline]
    pub(crate) const fn index(&self) -> usize {
        match self {
            StreamKind::Main => 0,
            StreamKind::Minbias => 1,
            StreamKind::Random => 2,
        }
    }
}

/// Header at the start of every event file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FileHeader {
    /// Run the file belongs to.
    pub run_id: u32,
    /// Run mode from configuration.
    pub run_mode: u32,
    /// File serial within the run.
    pub file_serial: u32,
    /// Id of the first event in the file set.
    pub first_event_id: u32,
    /// GPS second of the first event.
    pub first_event_time: u32,
    /// Id of the last event in the file set.
    pub last_event_id: u32,
    /// GPS second of the last event.
    pub last_event_time: u32,
}

impl FileHeader {
    /// Serialize, including the leading length word and reserved fields.
    pub fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_u32::<LittleEndian>((FILE_HEADER_BYTES - 4) as u32)?;
        w.write_u32::<LittleEndian>(self.run_id)?;
        w.write_u32::<LittleEndian>(self.run_mode)?;
        w.write_u32::<LittleEndian>(self.file_serial)?;
        w.write_u32::<LittleEndian>(self.first_event_id)?;
        w.write_u32::<LittleEndian>(self.first_event_time)?;
        w.write_u32::<LittleEndian>(self.last_event_id)?;
        w.write_u32::<LittleEndian>(self.last_event_time)?;
        w.write_u32::<LittleEndian>(0)?;
        w.write_u32::<LittleEndian>(0)
    }

    /// Parse a header written by [`FileHeader::write_to`].
    pub fn read_from<R: Read>(r: &mut R) -> io::Result<Self> {
        let length = r.read_u32::<LittleEndian>()?;
        if length as usize != FILE_HEADER_BYTES - 4 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("file header length {length}"),
            ));
        }
        let header = Self {
            run_id: r.read_u32::<LittleEndian>()?,
            run_mode: r.read_u32::<LittleEndian>()?,
            file_serial: r.read_u32::<LittleEndian>()?,
            first_event_id: r.read_u32::<LittleEndian>()?,
            first_event_time: r.read_u32::<LittleEndian>()?,
            last_event_id: r.read_u32::<LittleEndian>()?,
            last_event_time: r.read_u32::<LittleEndian>()?,
        };
        r.read_u32::<LittleEndian>()?;
        r.read_u32::<LittleEndian>()?;
        Ok(header)
    }
}

/// Header in front of every event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventHeader {
    /// Bytes following the length word, fragments included.
    pub length: u32,
    /// Run id.
    pub run_id: u32,
    /// Builder-assigned event id.
    pub event_id: u32,
    /// T3 event number the fragments answered.
    pub t3_id: u32,
    /// Station of the earliest fragment.
    pub first_station: u32,
    /// GPS second of the earliest fragment.
    pub second: u32,
    /// Nanosecond of the earliest fragment.
    pub nanosecond: u32,
    /// OR of all fragment trigger words.
    pub type_flags: u16,
    /// Format version.
    pub version: u16,
    /// Contributing stations.
    pub du_count: u32,
}

impl EventHeader {
    /// Serialize, reserved fields zeroed.
    pub fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_u32::<LittleEndian>(self.length)?;
        w.write_u32::<LittleEndian>(self.run_id)?;
        w.write_u32::<LittleEndian>(self.event_id)?;
        w.write_u32::<LittleEndian>(self.t3_id)?;
        w.write_u32::<LittleEndian>(self.first_station)?;
        w.write_u32::<LittleEndian>(self.second)?;
        w.write_u32::<LittleEndian>(self.nanosecond)?;
        w.write_u16::<LittleEndian>(self.type_flags)?;
        w.write_u16::<LittleEndian>(self.version)?;
        w.write_u32::<LittleEndian>(0)?;
        w.write_u32::<LittleEndian>(0)?;
        w.write_u32::<LittleEndian>(self.du_count)
    }

    /// Parse a header written by [`EventHeader::write_to`].
    pub fn read_from<R: Read>(r: &mut R) -> io::Result<Self> {
        let length = r.read_u32::<LittleEndian>()?;
        let run_id = r.read_u32::<LittleEndian>()?;
        let event_id = r.read_u32::<LittleEndian>()?;
        let t3_id = r.read_u32::<LittleEndian>()?;
        let first_station = r.read_u32::<LittleEndian>()?;
        let second = r.read_u32::<LittleEndian>()?;
        let nanosecond = r.read_u32::<LittleEndian>()?;
        let type_flags = r.read_u16::<LittleEndian>()?;
        let version = r.read_u16::<LittleEndian>()?;
        r.read_u32::<LittleEndian>()?;
        r.read_u32::<LittleEndian>()?;
        let du_count = r.read_u32::<LittleEndian>()?;
        Ok(Self {
            length,
            run_id,
            event_id,
            t3_id,
            first_station,
            second,
            nanosecond,
            type_flags,
            version,
            du_count,
        })
    }
}

/// All fragments of one T3, ready to be written. Never empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhysicsEvent {
    t3_id: u16,
    flags: FragmentFlags,
    fragments: Vec<EventFragment>,
}

impl PhysicsEvent {
    /// Merge the fragments of one T3, in any order. `None` when empty.
    pub fn merge(mut fragments: Vec<EventFragment>) -> Option<Self> {
        let t3_id = fragments.first()?.t3_id;
        debug_assert!(fragments.iter().all(|f| f.t3_id == t3_id));
        fragments.sort_by(|a, b| a.time.cmp(&b.time));
        let flags = fragments
            .iter()
            .fold(FragmentFlags::empty(), |acc, f| acc | f.flags);
        Some(Self {
            t3_id,
            flags,
            fragments,
        })
    }

    /// Shared T3 event number.
    #[inline]
    pub fn t3_id(&self) -> u16 {
        self.t3_id
    }

    /// OR of all fragment trigger words.
    #[inline]
    pub fn flags(&self) -> FragmentFlags {
        self.flags
    }

    /// Fragments, earliest first.
    pub fn fragments(&self) -> &[EventFragment] {
        &self.fragments
    }

    /// Number of contributing stations.
    #[inline]
    pub fn du_count(&self) -> u32 {
        self.fragments.len() as u32
    }

    /// Raw fragment bytes.
    pub fn payload_bytes(&self) -> usize {
        self.fragments.iter().map(EventFragment::raw_bytes).sum()
    }

    /// GPS time of the earliest fragment.
    pub fn time(&self) -> GpsTime {
        self.fragments[0].time
    }

    /// Stream this event is written to.
    pub fn stream(&self) -> StreamKind {
        StreamKind::for_flags(self.flags)
    }

    /// Header for this event.
    pub fn header(&self, run_id: u32, event_id: u32) -> EventHeader {
        let first = &self.fragments[0];
        EventHeader {
            length: (EVENT_HEADER_BYTES - 4 + self.payload_bytes()) as u32,
            run_id,
            event_id,
            t3_id: self.t3_id as u32,
            first_station: first.station_id as u32,
            second: first.time.second,
            nanosecond: first.time.nanosecond,
            type_flags: self.flags.bits(),
            version: EVENT_VERSION,
            du_count: self.du_count(),
        }
    }

    /// Header followed by every raw fragment.
    pub fn write_to<W: Write>(&self, w: &mut W, run_id: u32, event_id: u32) -> io::Result<()> {
        self.header(run_id, event_id).write_to(w)?;
        for fragment in &self.fragments {
            for &word in &fragment.raw {
                w.write_u16::<LittleEndian>(word)?;
            }
        }
        Ok(())
    }
}
