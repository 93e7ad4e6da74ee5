//! T3 maker poll loop.
//!
//! The engine owns the reading end of the T2 channel and the writing end of
//! the T3 channel. Each poll drains every pending batch, evicts stale hits,
//! runs the coincidence scan and publishes what it found.

use crate::correlator::{Correlator, TriggerStats};
use crate::error::TriggerError;
use adaq::config::DaqConfig;
use adaq::prelude::DEFAULT_TRIGGER_POLL;
use adaq::record::T2Batch;
use adaq::time::GpsTime;
use adaq_shared_memory::{ChannelSet, RingChannel};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, info, warn};

/// The T2 channel has a single reader.
const T2_READER: u8 = 0;

/// Polls between two statistics lines.
const STATS_EVERY: u64 = 600;

/// Correlation engine bound to its channels.
pub struct TriggerEngine {
    correlator: Correlator,
    t2: RingChannel,
    t3: RingChannel,
    running: Arc<AtomicBool>,
    poll_interval: Duration,
    polls: u64,
}

impl TriggerEngine {
    /// Bind a correlator to already opened channels.
    pub fn new(config: &DaqConfig, t2: RingChannel, t3: RingChannel) -> Self {
        let poll_interval = match config.trigger.poll_interval_ms {
            0 => DEFAULT_TRIGGER_POLL,
            ms => Duration::from_millis(ms),
        };
        info!(
            stations = config.stations.len(),
            window_capacity = config.window_capacity(),
            poll_ms = poll_interval.as_millis() as u64,
            "T3 maker created"
        );
        Self {
            correlator: Correlator::new(config),
            t2,
            t3,
            running: Arc::new(AtomicBool::new(true)),
            poll_interval,
            polls: 0,
        }
    }

    /// Open the deployment's channels and bind to the ones the T3 maker uses.
    pub fn open(config: &DaqConfig) -> Result<Self, TriggerError> {
        let ChannelSet { t2, t3, .. } = ChannelSet::open(&config.shared.service_name, &config.channels)?;
        Ok(Self::new(config, t2, t3))
    }

    /// Flag cleared to stop [`TriggerEngine::run`].
    pub fn running_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    /// Counters so far.
    pub fn stats(&self) -> TriggerStats {
        self.correlator.stats()
    }

    /// The correlator, for inspection.
    pub fn correlator(&self) -> &Correlator {
        &self.correlator
    }

    /// One cycle: drain T2, clean the window, scan, publish. Returns the
    /// number of T3s published.
    pub fn poll(&mut self, now: GpsTime) -> usize {
        let mut batches = 0usize;
        while let Some(record) = self.t2.read_record::<T2Batch>(T2_READER) {
            match record {
                Ok(batch) => {
                    self.correlator.ingest(&batch, now);
                    batches += 1;
                }
                Err(e) => {
                    warn!(error = %e, "malformed T2 record skipped");
                    self.correlator.stats_mut().malformed += 1;
                }
            }
        }

        self.correlator.cleanup(now);
        let requests = self.correlator.scan(now);

        let mut published = 0;
        for request in &requests {
            if self.t3.write_record(request) {
                published += 1;
            } else {
                self.correlator.stats_mut().dropped_requests += 1;
                warn!(
                    event = request.event_number,
                    trigger_type = ?request.trigger_type,
                    "T3 channel saturated, request dropped"
                );
            }
        }
        if batches > 0 || published > 0 {
            debug!(batches, published, live = self.correlator.window().len(), "poll");
        }
        published
    }

    /// Poll until the running flag is cleared.
    pub fn run(&mut self) {
        info!(poll_ms = self.poll_interval.as_millis() as u64, "T3 maker running");
        while self.running.load(Ordering::SeqCst) {
            self.poll(GpsTime::now());
            self.polls += 1;
            if self.polls % STATS_EVERY == 0 {
                self.log_stats();
            }
            std::thread::sleep(self.poll_interval);
        }
    }

    /// Stop the loop and log the final counters.
    pub fn shutdown(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        self.log_stats();
        info!("T3 maker stopped");
    }

    fn log_stats(&self) {
        let s = self.correlator.stats();
        info!(
            hits = s.hits,
            duplicates = s.duplicates,
            window_full = s.window_full,
            malformed = s.malformed,
            evicted = s.evicted,
            physics = s.physics,
            ten_second = s.ten_second,
            random = s.random,
            dropped = s.dropped_requests,
            live = self.correlator.window().len(),
            "trigger statistics"
        );
    }
}
