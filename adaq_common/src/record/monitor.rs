//! Station telemetry.

use super::{ChannelRecord, RecordError, join_u32, require, split_u32};
use crate::consts::TAG_MONITOR;
use std::fmt::Write as _;

/// Periodic health report of one station.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorReport {
    /// Reporting station.
    pub station_id: u16,
    /// Raw firmware/board identification word.
    pub firmware: u32,
    /// Free-form telemetry words.
    pub payload: Vec<u16>,
}

impl MonitorReport {
    /// Board serial number encoded in the firmware word.
    pub const fn serial_number(&self) -> u32 {
        let x = self.firmware;
        100 * ((x >> 8) & 0x1) + 10 * ((x >> 4) & 0xf) + (x & 0xf)
    }

    /// Firmware version as `1000 * major + minor`.
    pub const fn firmware_version(&self) -> u32 {
        let x = self.firmware;
        let major = 10 * ((x >> 20) & 0xf) + ((x >> 16) & 0xf);
        let minor = 10 * ((x >> 12) & 0xf) + ((x >> 9) & 0x7);
        1000 * major + minor
    }

    /// One line of the monitor log, without the trailing newline.
    pub fn log_line(&self) -> String {
        let mut line = format!(
            "{:05} {:03} {:5}",
            self.station_id,
            self.serial_number(),
            self.firmware_version()
        );
        for word in &self.payload {
            let _ = write!(line, " {word}");
        }
        line
    }
}

impl ChannelRecord for MonitorReport {
    fn encode(&self, out: &mut Vec<u16>) {
        out.reserve(4 + self.payload.len());
        out.push(TAG_MONITOR);
        out.push(self.station_id);
        out.extend_from_slice(&split_u32(self.firmware));
        out.extend_from_slice(&self.payload);
    }

    fn decode(words: &[u16]) -> Result<Self, RecordError> {
        require(words, 4)?;
        if words[0] != TAG_MONITOR {
            return Err(RecordError::UnknownTag(words[0]));
        }
        Ok(Self {
            station_id: words[1],
            firmware: join_u32(words[2], words[3]),
            payload: words[4..].to_vec(),
        })
    }
}
