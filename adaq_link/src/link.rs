//! The Station Link side of the ring channels.

use crate::decode::{FragmentLayout, max_raw_words};
use adaq::config::{DaqConfig, StationConfig};
use adaq::consts::LINK_READER;
use adaq::record::t2::T2_HEADER_WORDS;
use adaq::record::{
    Command, EventFragment, MonitorReport, NoEvent, RecordError, T2Batch, T2Entry, T3Request,
    TriggerType,
};
use adaq_shared_memory::{ChannelSet, RingChannel, ShmResult};

/// One station's share of a T3 request, ready to be sent over the network.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventRequest {
    /// Station to ask.
    pub station_id: u16,
    /// Event number the station must answer with.
    pub event_number: u16,
    /// Physics, ten-second or random.
    pub trigger_type: TriggerType,
    /// Low byte of the GPS second of the station's hit.
    pub second_low: u8,
    /// Subsecond bits 29..6 of the hit.
    pub subsecond_bits: u32,
}

/// Counters kept by the link.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LinkStats {
    /// T2 batches deposited.
    pub t2_batches: u64,
    /// Fragments deposited.
    pub fragments: u64,
    /// Records dropped because a channel stayed full.
    pub saturated: u64,
    /// Records discarded as malformed.
    pub malformed: u64,
    /// T3 requests read.
    pub requests: u64,
}

/// Channel endpoints of the Station Link.
///
/// Writes T2 batches and station messages, reads T3 requests and commands
/// as reader [`LINK_READER`].
pub struct StationLink {
    channels: ChannelSet,
    stations: Vec<u16>,
    running: bool,
    stats: LinkStats,
}

impl StationLink {
    /// Attach to (or create) the deployment's channels.
    pub fn open(config: &DaqConfig) -> ShmResult<Self> {
        let channels = ChannelSet::open(&config.shared.service_name, &config.channels)?;
        Ok(Self::new(channels, &config.stations))
    }

    /// Link over already opened channels.
    pub fn new(channels: ChannelSet, stations: &[StationConfig]) -> Self {
        Self {
            channels,
            stations: stations.iter().map(|s| s.id).collect(),
            running: false,
            stats: LinkStats::default(),
        }
    }

    /// Whether the last command seen was Start.
    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Counters so far.
    pub fn stats(&self) -> LinkStats {
        self.stats
    }

    /// Deposit a station's T2 report.
    ///
    /// Returns `false` when the batch was dropped, either because it does not
    /// fit a T2 slot or because the channel stayed full.
    pub fn deposit_t2(&mut self, station_id: u16, second: u32, entries: &[T2Entry]) -> bool {
        let len = T2_HEADER_WORDS + 2 * entries.len();
        let max = self.channels.t2.max_payload();
        if len > max {
            self.malformed(station_id, RecordError::Oversized { len, max });
            return false;
        }
        let batch = T2Batch {
            station_id,
            second,
            entries: entries.to_vec(),
        };
        let written = self.channels.t2.write_record(&batch);
        if written {
            self.stats.t2_batches += 1;
        } else {
            self.saturated("t2", station_id);
        }
        written
    }

    /// Decode a hardware record and deposit it as a fragment.
    pub fn deposit_raw(&mut self, layout: FragmentLayout, words: &[u16]) -> bool {
        let max = max_raw_words(self.channels.event.max_payload());
        match layout.decode(words, max) {
            Ok(fragment) => self.deposit_fragment(&fragment),
            Err(e) => {
                self.malformed(0, e);
                false
            }
        }
    }

    /// Deposit a decoded fragment on the event channel.
    pub fn deposit_fragment(&mut self, fragment: &EventFragment) -> bool {
        let written = self.channels.event.write_record(fragment);
        if written {
            self.stats.fragments += 1;
        } else {
            self.saturated("event", fragment.station_id);
        }
        written
    }

    /// Deposit station telemetry on the event channel.
    pub fn deposit_monitor(&mut self, report: &MonitorReport) -> bool {
        let written = self.channels.event.write_record(report);
        if !written {
            self.saturated("event", report.station_id);
        }
        written
    }

    /// Deposit a station's "nothing for this request" answer.
    pub fn deposit_no_event(&mut self, no_event: NoEvent) -> bool {
        let written = self.channels.event.write_record(&no_event);
        if !written {
            self.saturated("event", no_event.station_id);
        }
        written
    }

    /// Read every pending T3 request and expand it into per-station
    /// requests. A station id of 0 stands for every configured station.
    pub fn drain_requests(&mut self) -> Vec<EventRequest> {
        let mut requests = Vec::new();
        while let Some(result) = self.channels.t3.read_record::<T3Request>(LINK_READER) {
            match result {
                Ok(t3) => {
                    self.stats.requests += 1;
                    expand_request(&t3, &self.stations, &mut requests);
                }
                Err(e) => self.malformed(0, e),
            }
        }
        requests
    }

    /// Read every pending command, tracking the run state.
    pub fn drain_commands(&mut self) -> Vec<Command> {
        let mut commands = Vec::new();
        while let Some(result) = self.channels.command.read_record::<Command>(LINK_READER) {
            match result {
                Ok(command) => {
                    match command {
                        Command::Start => self.running = true,
                        Command::Stop => self.running = false,
                        Command::Reinitialize { .. } => {}
                    }
                    tracing::info!(?command, "command received");
                    commands.push(command);
                }
                Err(e) => self.malformed(0, e),
            }
        }
        commands
    }

    /// Stations addressed by a Reinitialize command.
    pub fn reinitialize_targets(&self, station: u16) -> Vec<u16> {
        if station == 0 {
            self.stations.clone()
        } else {
            self.stations.iter().copied().filter(|&id| id == station).collect()
        }
    }

    /// Post a command on the command channel.
    pub fn submit_command(&mut self, command: Command) -> bool {
        submit_command(&mut self.channels.command, command)
    }

    fn saturated(&mut self, channel: &str, station_id: u16) {
        self.stats.saturated += 1;
        tracing::warn!(channel, station_id, "channel saturated, record dropped");
    }

    fn malformed(&mut self, station_id: u16, error: RecordError) {
        self.stats.malformed += 1;
        tracing::warn!(station_id, %error, "malformed record discarded");
    }
}

/// Post a command on a command channel. Used by front ends that hold no
/// other channel.
pub fn submit_command(channel: &mut RingChannel, command: Command) -> bool {
    let written = channel.write_record(&command);
    if !written {
        tracing::warn!(?command, "command channel saturated, command dropped");
    }
    written
}

fn expand_request(t3: &T3Request, stations: &[u16], out: &mut Vec<EventRequest>) {
    for entry in &t3.stations {
        let request = |station_id| EventRequest {
            station_id,
            event_number: t3.event_number,
            trigger_type: t3.trigger_type,
            second_low: entry.second_low,
            subsecond_bits: entry.subsecond_bits,
        };
        if entry.station_id == 0 {
            out.extend(stations.iter().map(|&id| request(id)));
        } else {
            out.push(request(entry.station_id));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use adaq::record::T3Station;
    use adaq::time::GpsTime;

    #[test]
    fn station_zero_expands_to_every_station() {
        let mut stations = heapless::Vec::new();
        stations.push(T3Station::from_hit(0, GpsTime::new(300, 640))).unwrap();
        let t3 = T3Request {
            trigger_type: TriggerType::TenSecond,
            event_number: 12,
            stations,
        };
        let mut out = Vec::new();
        expand_request(&t3, &[1, 2, 3], &mut out);
        let ids: Vec<u16> = out.iter().map(|r| r.station_id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert!(out.iter().all(|r| r.event_number == 12 && r.subsecond_bits == 10));
        assert!(out.iter().all(|r| r.second_low == (300 & 0xff) as u8));
    }
}
