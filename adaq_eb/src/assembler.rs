//! Event builder poll loop.
//!
//! Each poll handles pending commands, releases the builder's copy of every
//! T3 request, takes station messages into the fragment table and writes
//! whatever T3s the flush policy releases.

use crate::error::BuilderError;
use crate::flush::FlushPolicy;
use crate::output::{OutputStats, OutputStreams, RunParams};
use crate::table::FragmentTable;
use adaq::config::DaqConfig;
use adaq::consts::BUILDER_READER;
use adaq::record::{Command, StationMessage, T3Request};
use adaq_shared_memory::{ChannelSet, RingChannel};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// The event channel has a single reader.
const EVENT_READER: u8 = 0;

/// Polls between two statistics lines.
const STATS_EVERY: u64 = 10_000;

/// Intake counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BuilderStats {
    /// Fragments buffered.
    pub fragments: u64,
    /// Fragments discarded with no active run.
    pub discarded: u64,
    /// Stations that had nothing for a request.
    pub no_events: u64,
    /// Monitor reports seen.
    pub monitors: u64,
    /// T3 requests released.
    pub requests: u64,
    /// Undecodable records.
    pub malformed: u64,
    /// Polls that stopped intake on a full table.
    pub table_full: u64,
    /// Commands handled.
    pub commands: u64,
}

/// Event builder bound to its channels.
pub struct Assembler {
    table: FragmentTable,
    policy: FlushPolicy,
    output: OutputStreams,
    t3: RingChannel,
    event: RingChannel,
    command: RingChannel,
    config_path: Option<PathBuf>,
    acquiring: bool,
    last_fragment: Instant,
    running: Arc<AtomicBool>,
    poll_interval: Duration,
    polls: u64,
    stats: BuilderStats,
}

impl Assembler {
    /// Bind to already opened channels. No run is active until Start.
    pub fn new(config: &DaqConfig, t3: RingChannel, event: RingChannel, command: RingChannel) -> Self {
        info!(
            capacity = config.fragment_capacity(),
            output_dir = %config.builder.output_dir.display(),
            "event builder created"
        );
        Self {
            table: FragmentTable::new(config.fragment_capacity()),
            policy: FlushPolicy::from_config(&config.builder),
            output: OutputStreams::new(RunParams::from(&config.builder)),
            t3,
            event,
            command,
            config_path: None,
            acquiring: false,
            last_fragment: Instant::now(),
            running: Arc::new(AtomicBool::new(true)),
            poll_interval: Duration::from_millis(config.builder.poll_interval_ms.max(1)),
            polls: 0,
            stats: BuilderStats::default(),
        }
    }

    /// Open the deployment's channels and make sure the output root exists.
    pub fn open(config: &DaqConfig) -> Result<Self, BuilderError> {
        std::fs::create_dir_all(&config.builder.output_dir)?;
        let ChannelSet {
            t3, event, command, ..
        } = ChannelSet::open(&config.shared.service_name, &config.channels)?;
        Ok(Self::new(config, t3, event, command))
    }

    /// Reload run parameters from this file on every Start.
    pub fn with_config_path(mut self, path: PathBuf) -> Self {
        self.config_path = Some(path);
        self
    }

    /// Flag cleared to stop [`Assembler::run`].
    pub fn running_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    /// True between Start and Stop.
    pub fn is_acquiring(&self) -> bool {
        self.acquiring
    }

    /// Intake counters.
    pub fn stats(&self) -> BuilderStats {
        self.stats
    }

    /// Output counters.
    pub fn output_stats(&self) -> OutputStats {
        self.output.stats()
    }

    /// The output side.
    pub fn output(&self) -> &OutputStreams {
        &self.output
    }

    /// Buffered fragments.
    pub fn table(&self) -> &FragmentTable {
        &self.table
    }

    /// One cycle. Returns the number of events written.
    pub fn poll(&mut self, now: Instant) -> usize {
        self.drain_commands();
        self.drain_requests();
        self.drain_station_messages(now);

        if !self.acquiring || self.table.is_empty() {
            return 0;
        }
        let idle = self
            .policy
            .idle_expired(now.saturating_duration_since(self.last_fragment));
        if idle {
            debug!(buffered = self.table.len(), "no fragments for a while, flushing table");
        }
        self.write_ready(idle)
    }

    /// Handle one command.
    pub fn handle_command(&mut self, command: Command) {
        self.stats.commands += 1;
        match command {
            Command::Start => self.start(),
            Command::Stop => {
                let written = self.write_ready(true);
                self.output.close();
                self.acquiring = false;
                info!(written, run_id = self.output.run_id(), "run stopped");
            }
            Command::Reinitialize { station } => {
                let dropped = self.table.len();
                self.output.close();
                self.table.clear();
                info!(station, dropped, "reinitialized, files closed");
            }
        }
    }

    /// Poll until the running flag is cleared.
    pub fn run(&mut self) {
        info!(poll_ms = self.poll_interval.as_millis() as u64, "event builder running");
        while self.running.load(Ordering::SeqCst) {
            self.poll(Instant::now());
            self.polls += 1;
            if self.polls % STATS_EVERY == 0 {
                self.log_stats();
            }
            std::thread::sleep(self.poll_interval);
        }
    }

    /// Flush everything buffered, close the files and log the counters.
    pub fn shutdown(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if self.acquiring {
            self.write_ready(true);
        }
        self.output.close();
        self.log_stats();
        info!("event builder stopped");
    }

    fn start(&mut self) {
        let builder = match &self.config_path {
            Some(path) => match DaqConfig::from_file(path) {
                Ok(config) => Some(config.builder),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "config reload failed, keeping run parameters");
                    None
                }
            },
            None => None,
        };
        let params = match builder {
            Some(builder) => {
                self.policy = FlushPolicy::from_config(&builder);
                RunParams::from(&builder)
            }
            None => self.output.params().clone(),
        };
        self.table.clear();
        self.output.start_run(params);
        self.acquiring = true;
        self.last_fragment = Instant::now();
        info!(run_id = self.output.run_id(), "run started");
    }

    fn drain_commands(&mut self) {
        while let Some(record) = self.command.read_record::<Command>(BUILDER_READER) {
            match record {
                Ok(command) => self.handle_command(command),
                Err(e) => {
                    self.stats.malformed += 1;
                    warn!(error = %e, "malformed command skipped");
                }
            }
        }
    }

    fn drain_requests(&mut self) {
        while let Some(record) = self.t3.read_record::<T3Request>(BUILDER_READER) {
            match record {
                Ok(request) => {
                    self.stats.requests += 1;
                    debug!(
                        event = request.event_number,
                        stations = request.stations.len(),
                        "T3 request"
                    );
                }
                Err(e) => {
                    self.stats.malformed += 1;
                    warn!(error = %e, "malformed T3 request skipped");
                }
            }
        }
    }

    fn drain_station_messages(&mut self, now: Instant) {
        loop {
            if self.table.is_full() {
                if self.event.pending(EVENT_READER) == 0 {
                    break;
                }
                self.stats.table_full += 1;
                warn!(capacity = self.table.capacity(), "fragment table full, intake paused");
                break;
            }
            let Some(record) = self.event.read_record::<StationMessage>(EVENT_READER) else {
                break;
            };
            match record {
                Ok(StationMessage::Fragment(fragment)) => {
                    if !self.acquiring {
                        self.stats.discarded += 1;
                        debug!(t3_id = fragment.t3_id, station = fragment.station_id, "no run, fragment discarded");
                        continue;
                    }
                    if self.table.push(fragment).is_ok() {
                        self.stats.fragments += 1;
                        self.last_fragment = now;
                    }
                }
                Ok(StationMessage::NoEvent(no_event)) => {
                    self.stats.no_events += 1;
                    debug!(
                        event = no_event.event_number,
                        station = no_event.station_id,
                        "station has no data"
                    );
                }
                Ok(StationMessage::Monitor(report)) => {
                    self.stats.monitors += 1;
                    self.output.log_monitor(&report);
                }
                Err(e) => {
                    self.stats.malformed += 1;
                    warn!(error = %e, "malformed station message skipped");
                }
            }
        }
    }

    fn write_ready(&mut self, force: bool) -> usize {
        let events = self.table.take_ready(&self.policy, force);
        let mut written = 0;
        for event in &events {
            if self.output.write_event(event) {
                written += 1;
            }
        }
        written
    }

    fn log_stats(&self) {
        let s = self.stats;
        let o = self.output.stats();
        info!(
            fragments = s.fragments,
            discarded = s.discarded,
            no_events = s.no_events,
            monitors = s.monitors,
            requests = s.requests,
            malformed = s.malformed,
            table_full = s.table_full,
            main = o.events[0],
            minbias = o.events[1],
            random = o.events[2],
            lost = o.lost,
            write_errors = o.write_errors,
            buffered = self.table.len(),
            "builder statistics"
        );
    }
}
