//! Ring channel: a bounded circular buffer of fixed-size slots.
//!
//! ```text
//! ┌──────────────────────┬──────────────────────────┬─────┬──────────────────────────┐
//! │ ChannelHeader (64 B) │ slot 0                   │ ... │ slot N-1                 │
//! │ magic, geometry,     │ [status][len][payload..] │     │ [status][len][payload..] │
//! │ write + read cursors │                          │     │                          │
//! └──────────────────────┴──────────────────────────┴─────┴──────────────────────────┘
//! ```
//!
//! One writer, up to [`MAX_READERS`] readers. The status word of a slot holds
//! one bit per reader. The writer may only fill a slot whose status is zero;
//! it copies the payload, then publishes the full reader mask with release
//! ordering. Each reader copies the payload out and then clears its own bit.
//! A slot becomes writable again only once every reader has acknowledged it.
//!
//! Cursors live in the header so a restarted process continues where its
//! predecessor stopped.

use crate::error::{ShmError, ShmResult};
use crate::platform::{attach_channel_mmap, create_channel_mmap, get_current_pid, is_process_alive};
use adaq::config::{ChannelGeometry, ChannelsConfig};
use adaq::record::{ChannelRecord, RecordError};
use memmap2::MmapMut;
use static_assertions::const_assert_eq;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU16, AtomicU32, Ordering};
use std::time::Duration;

/// Magic bytes identifying a ring channel file.
pub const RING_MAGIC: [u8; 8] = *b"ADAQRNG1";

/// Maximum number of independent readers of one channel.
pub const MAX_READERS: u8 = 4;

/// Words in front of every slot payload (status, length).
pub const SLOT_OVERHEAD_WORDS: usize = 2;

/// Channel header, 64 bytes, cache-line aligned.
#[repr(C, align(64))]
pub struct ChannelHeader {
    /// Must be [`RING_MAGIC`].
    pub magic: [u8; 8],
    /// Number of slots.
    pub slot_count: u32,
    /// Maximum payload words per slot.
    pub slot_words: u32,
    /// Number of readers.
    pub reader_count: u32,
    /// Status value published for a freshly written slot.
    pub reader_mask: u32,
    /// Next slot the writer fills.
    pub write_cursor: AtomicU32,
    /// Next slot each reader consumes.
    pub read_cursors: [AtomicU32; MAX_READERS as usize],
    /// Process that created the channel.
    pub creator_pid: u32,
    _padding: [u8; 16],
}

const_assert_eq!(core::mem::size_of::<ChannelHeader>(), 64);
const_assert_eq!(core::mem::align_of::<ChannelHeader>(), 64);

const HEADER_BYTES: usize = core::mem::size_of::<ChannelHeader>();

impl ChannelHeader {
    fn new(geometry: ChannelGeometry, readers: u8) -> Self {
        Self {
            magic: RING_MAGIC,
            slot_count: geometry.slots,
            slot_words: geometry.words,
            reader_count: readers as u32,
            reader_mask: (1u32 << readers) - 1,
            write_cursor: AtomicU32::new(0),
            read_cursors: [const { AtomicU32::new(0) }; MAX_READERS as usize],
            creator_pid: get_current_pid(),
            _padding: [0; 16],
        }
    }

    /// Geometry recorded at creation.
    pub fn geometry(&self) -> ChannelGeometry {
        ChannelGeometry::new(self.slot_count, self.slot_words)
    }
}

/// Total file size for a geometry.
pub const fn channel_size(geometry: ChannelGeometry) -> usize {
    HEADER_BYTES
        + geometry.slots as usize * (geometry.words as usize + SLOT_OVERHEAD_WORDS) * 2
}

/// Bounded write retries before a record is dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Number of attempts, at least one is always made.
    pub attempts: u32,
    /// Sleep between attempts.
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 10,
            backoff: Duration::from_millis(1),
        }
    }
}

impl RetryPolicy {
    /// Policy from the `[channels]` section.
    pub fn from_config(config: &ChannelsConfig) -> Self {
        Self {
            attempts: config.retry_attempts,
            backoff: Duration::from_micros(config.retry_backoff_us),
        }
    }

    /// Upper bound of the time a saturated write can take.
    pub fn worst_case(&self) -> Duration {
        self.backoff * self.attempts.saturating_sub(1)
    }
}

/// A slot copied out by a reader, not yet acknowledged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadSlot {
    /// Slot index; pass back to [`RingChannel::ack`].
    pub cursor: u32,
    /// Payload words.
    pub words: Vec<u16>,
}

/// A memory-mapped ring channel.
///
/// Geometry and reader mask are copied out of the header when the channel
/// is created or attached; only the cursors are read from shared memory
/// afterwards.
pub struct RingChannel {
    name: String,
    mmap: MmapMut,
    retry: RetryPolicy,
    geometry: ChannelGeometry,
    reader_count: u8,
    reader_mask: u16,
}

impl RingChannel {
    /// Create a new channel file, replacing any existing one.
    pub fn create(path: &Path, geometry: ChannelGeometry, readers: u8) -> ShmResult<Self> {
        if geometry.slots == 0 || geometry.words == 0 || geometry.words > u16::MAX as u32 {
            return Err(ShmError::InvalidGeometry {
                slots: geometry.slots,
                words: geometry.words,
            });
        }
        if readers == 0 || readers > MAX_READERS {
            return Err(ShmError::InvalidReaders {
                readers,
                max: MAX_READERS,
            });
        }

        let mut mmap = create_channel_mmap(path, channel_size(geometry))?;
        // SAFETY: the mapping is page aligned and at least HEADER_BYTES long.
        unsafe {
            std::ptr::write(
                mmap.as_mut_ptr() as *mut ChannelHeader,
                ChannelHeader::new(geometry, readers),
            );
        }
        mmap.flush()?;

        tracing::info!(
            channel = %path.display(),
            slots = geometry.slots,
            words = geometry.words,
            readers,
            "ring channel created"
        );
        Ok(Self {
            name: path.display().to_string(),
            mmap,
            retry: RetryPolicy::default(),
            geometry,
            reader_count: readers,
            reader_mask: ((1u32 << readers) - 1) as u16,
        })
    }

    /// Attach to an existing channel file.
    pub fn attach(path: &Path) -> ShmResult<Self> {
        let name = path.display().to_string();
        if !path.exists() {
            return Err(ShmError::NotFound { name });
        }
        let mmap = attach_channel_mmap(path)?;
        if mmap.len() < HEADER_BYTES {
            return Err(ShmError::BadMagic { name });
        }
        // SAFETY: the mapping is page aligned and at least HEADER_BYTES long.
        let header = unsafe { &*(mmap.as_ptr() as *const ChannelHeader) };
        let geometry = header.geometry();
        if header.magic != RING_MAGIC
            || header.reader_count == 0
            || header.reader_count > MAX_READERS as u32
            || geometry.slots == 0
            || geometry.words == 0
            || geometry.words > u16::MAX as u32
        {
            return Err(ShmError::BadMagic { name });
        }
        let expected = channel_size(geometry);
        if mmap.len() < expected {
            return Err(ShmError::Truncated {
                name,
                size: mmap.len(),
                expected,
            });
        }
        let reader_count = header.reader_count as u8;
        let channel = Self {
            name,
            retry: RetryPolicy::default(),
            geometry,
            reader_count,
            reader_mask: ((1u32 << reader_count) - 1) as u16,
            mmap,
        };

        let header = channel.header();
        let creator = header.creator_pid;
        tracing::info!(
            channel = %channel.name,
            creator,
            creator_alive = is_process_alive(creator),
            write_cursor = header.write_cursor.load(Ordering::Acquire),
            "attached to ring channel"
        );
        Ok(channel)
    }

    /// Attach when a valid channel with this geometry exists, create it
    /// otherwise. An existing channel with another geometry is an error.
    pub fn open_or_create(path: &Path, geometry: ChannelGeometry, readers: u8) -> ShmResult<Self> {
        match Self::attach(path) {
            Ok(channel) => {
                let found = channel.geometry();
                if found != geometry {
                    return Err(ShmError::GeometryMismatch {
                        name: channel.name,
                        expected: geometry,
                        found,
                    });
                }
                if channel.reader_count() != readers {
                    tracing::warn!(
                        channel = %channel.name,
                        stored = channel.reader_count(),
                        requested = readers,
                        "keeping reader count of existing channel"
                    );
                }
                Ok(channel)
            }
            Err(ShmError::NotFound { .. }) => Self::create(path, geometry, readers),
            Err(ShmError::BadMagic { name }) | Err(ShmError::Truncated { name, .. }) => {
                tracing::warn!(channel = %name, "replacing invalid channel file");
                Self::create(path, geometry, readers)
            }
            Err(e) => Err(e),
        }
    }

    /// Replace the write retry policy.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Channel file path.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Slot count and payload size.
    pub fn geometry(&self) -> ChannelGeometry {
        self.geometry
    }

    /// Number of readers that must acknowledge every slot.
    pub fn reader_count(&self) -> u8 {
        self.reader_count
    }

    /// Maximum payload length in words.
    pub fn max_payload(&self) -> usize {
        self.geometry.words as usize
    }

    /// Current read cursor of `reader`.
    pub fn cursor(&self, reader: u8) -> Option<u32> {
        self.reader_bit(reader)?;
        Some(self.header().read_cursors[reader as usize].load(Ordering::Acquire))
    }

    /// Write one record into the next slot.
    ///
    /// Returns `false` if the payload does not fit a slot, or if the slot is
    /// still held by a reader after the retry budget is spent. Never blocks
    /// longer than [`RetryPolicy::worst_case`].
    pub fn try_write(&mut self, payload: &[u16]) -> bool {
        let max = self.max_payload();
        if payload.len() > max {
            tracing::warn!(
                channel = %self.name,
                error = %RecordError::Oversized { len: payload.len(), max },
                "dropping malformed record"
            );
            return false;
        }

        let slot_count = self.geometry.slots;
        let mask = self.reader_mask;
        let index = self.header().write_cursor.load(Ordering::Acquire) % slot_count;

        let attempts = self.retry.attempts.max(1);
        for attempt in 0..attempts {
            if self.status(index).load(Ordering::Acquire) == 0 {
                let base = self.slot_offset(index);
                // SAFETY: slot_offset stays inside the mapping for index <
                // slot_count and payload.len() <= slot_words. Readers do not
                // touch a slot whose status is zero.
                unsafe {
                    let words = self.mmap.as_mut_ptr().add(base) as *mut u16;
                    words.add(1).write(payload.len() as u16);
                    std::ptr::copy_nonoverlapping(payload.as_ptr(), words.add(2), payload.len());
                }
                self.status(index).store(mask, Ordering::Release);
                self.header()
                    .write_cursor
                    .store((index + 1) % slot_count, Ordering::Release);
                return true;
            }
            if attempt + 1 < attempts {
                std::thread::sleep(self.retry.backoff);
            }
        }
        false
    }

    /// Copy out the next slot for `reader` without releasing it.
    pub fn try_read(&self, reader: u8) -> Option<ReadSlot> {
        let bit = self.reader_bit(reader)?;
        let cursor =
            self.header().read_cursors[reader as usize].load(Ordering::Acquire) % self.geometry.slots;
        if self.status(cursor).load(Ordering::Acquire) & bit == 0 {
            return None;
        }

        let base = self.slot_offset(cursor);
        let max = self.max_payload();
        // SAFETY: the status bit is set, so the writer finished this slot
        // and will not touch it until every reader cleared its bit.
        let words = unsafe {
            let slot = self.mmap.as_ptr().add(base) as *const u16;
            let len = (slot.add(1).read() as usize).min(max);
            std::slice::from_raw_parts(slot.add(2), len).to_vec()
        };
        Some(ReadSlot { cursor, words })
    }

    /// Release slot `cursor` for `reader` and advance its read cursor.
    pub fn ack(&self, reader: u8, cursor: u32) {
        let Some(bit) = self.reader_bit(reader) else {
            return;
        };
        let slot_count = self.geometry.slots;
        let cursor = cursor % slot_count;
        self.status(cursor).fetch_and(!bit, Ordering::AcqRel);
        self.header().read_cursors[reader as usize].store((cursor + 1) % slot_count, Ordering::Release);
    }

    /// Read and acknowledge the next slot.
    pub fn take(&self, reader: u8) -> Option<Vec<u16>> {
        let slot = self.try_read(reader)?;
        self.ack(reader, slot.cursor);
        Some(slot.words)
    }

    /// Encode and write a record.
    pub fn write_record<R: ChannelRecord>(&mut self, record: &R) -> bool {
        self.try_write(&record.to_words())
    }

    /// Read, acknowledge and decode the next record.
    ///
    /// Malformed records are acknowledged too, so they never block the
    /// channel.
    pub fn read_record<R: ChannelRecord>(&self, reader: u8) -> Option<Result<R, RecordError>> {
        self.take(reader).map(|words| R::decode(&words))
    }

    /// Number of slots still waiting for `reader`.
    pub fn pending(&self, reader: u8) -> usize {
        let Some(bit) = self.reader_bit(reader) else {
            return 0;
        };
        (0..self.geometry.slots)
            .filter(|&index| self.status(index).load(Ordering::Acquire) & bit != 0)
            .count()
    }

    fn header(&self) -> &ChannelHeader {
        // SAFETY: the mapping is page aligned and starts with a header,
        // validated in `attach` or written in `create`.
        unsafe { &*(self.mmap.as_ptr() as *const ChannelHeader) }
    }

    fn reader_bit(&self, reader: u8) -> Option<u16> {
        if reader < self.reader_count {
            Some(1 << reader)
        } else {
            tracing::warn!(channel = %self.name, reader, "reader id out of range");
            None
        }
    }

    fn slot_offset(&self, index: u32) -> usize {
        HEADER_BYTES + index as usize * (self.max_payload() + SLOT_OVERHEAD_WORDS) * 2
    }

    fn status(&self, index: u32) -> &AtomicU16 {
        // SAFETY: slot offsets are even and inside the mapping; the status
        // word is only ever accessed atomically.
        unsafe { &*(self.mmap.as_ptr().add(self.slot_offset(index)) as *const AtomicU16) }
    }
}

/// The four channels of a deployment.
pub struct ChannelSet {
    /// T2 batches from the Station Link, read by the T3 maker.
    pub t2: RingChannel,
    /// T3 requests, read by the Station Link and the event builder.
    pub t3: RingChannel,
    /// Fragments and monitor reports, read by the event builder.
    pub event: RingChannel,
    /// Commands, read by the Station Link and the event builder.
    pub command: RingChannel,
}

impl ChannelSet {
    /// Open or create every channel under `config.dir`.
    pub fn open(service: &str, config: &ChannelsConfig) -> ShmResult<Self> {
        let retry = RetryPolicy::from_config(config);
        let open = |name: &str, geometry: ChannelGeometry, readers: u8| {
            RingChannel::open_or_create(&channel_path(config, service, name), geometry, readers)
                .map(|channel| channel.with_retry(retry))
        };
        Ok(Self {
            t2: open("t2", config.t2, 1)?,
            t3: open("t3", config.t3, 2)?,
            event: open("event", config.event, 1)?,
            command: open("command", config.command, 2)?,
        })
    }
}

/// Path of channel `name` for deployment `service`.
pub fn channel_path(config: &ChannelsConfig, service: &str, name: &str) -> PathBuf {
    config.dir.join(format!("{service}_{name}"))
}
