//! Administrative commands.

use super::{ChannelRecord, RecordError, first_word, require};
use crate::consts::{TAG_INITIALIZE, TAG_START, TAG_STOP};

/// A command on the command channel, read by the Station Link and the
/// Assembler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Start a run.
    Start,
    /// Stop the current run.
    Stop,
    /// Reinitialize a station; 0 means every station.
    Reinitialize {
        /// Target station.
        station: u16,
    },
}

impl ChannelRecord for Command {
    fn encode(&self, out: &mut Vec<u16>) {
        match self {
            Self::Start => out.push(TAG_START),
            Self::Stop => out.push(TAG_STOP),
            Self::Reinitialize { station } => out.extend_from_slice(&[TAG_INITIALIZE, *station]),
        }
    }

    fn decode(words: &[u16]) -> Result<Self, RecordError> {
        match first_word(words)? {
            TAG_START => Ok(Self::Start),
            TAG_STOP => Ok(Self::Stop),
            TAG_INITIALIZE => {
                require(words, 2)?;
                Ok(Self::Reinitialize { station: words[1] })
            }
            tag => Err(RecordError::UnknownTag(tag)),
        }
    }
}
