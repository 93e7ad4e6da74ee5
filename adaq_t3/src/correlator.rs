//! Coincidence scan.
//!
//! Seeds are taken newest to oldest, starting at the settle frontier. A seed
//! collects older hits within the pair window of their station; newer hits
//! were already tried as seeds themselves. One hit per station is taken,
//! the one closest in time to the seed.

use crate::geometry::StationTable;
use crate::window::{CoincidenceWindow, IngestOutcome};
use adaq::config::{DaqConfig, TriggerConfig};
use adaq::consts::MAX_T3_STATIONS;
use adaq::record::{HitFlags, T2Batch, T3Request, T3Station, TriggerType};
use adaq::time::GpsTime;

/// Running counters of the trigger.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TriggerStats {
    /// Hits appended to the window.
    pub hits: u64,
    /// Identical hits coalesced.
    pub duplicates: u64,
    /// Hits lost to a full window.
    pub window_full: u64,
    /// Hits or batches discarded as malformed.
    pub malformed: u64,
    /// Hits evicted.
    pub evicted: u64,
    /// Physics T3s.
    pub physics: u64,
    /// Ten-second T3s.
    pub ten_second: u64,
    /// Random T3s.
    pub random: u64,
    /// T3s lost to a saturated channel.
    pub dropped_requests: u64,
}

impl TriggerStats {
    fn count(&mut self, trigger_type: TriggerType) {
        match trigger_type {
            TriggerType::Physics => self.physics += 1,
            TriggerType::TenSecond => self.ten_second += 1,
            TriggerType::Random => self.random += 1,
        }
    }
}

/// Window, station table and event numbering of the T3 maker.
#[derive(Debug)]
pub struct Correlator {
    table: StationTable,
    window: CoincidenceWindow,
    params: TriggerConfig,
    next_event: u16,
    stats: TriggerStats,
}

impl Correlator {
    /// Build from the deployment configuration.
    pub fn new(config: &DaqConfig) -> Self {
        Self {
            table: StationTable::new(&config.stations, &config.trigger),
            window: CoincidenceWindow::new(
                config.window_capacity(),
                config.trigger.window_seconds,
                config.trigger.random_fraction,
            ),
            params: config.trigger.clone(),
            next_event: 0,
            stats: TriggerStats::default(),
        }
    }

    /// Counters so far.
    pub fn stats(&self) -> TriggerStats {
        self.stats
    }

    /// Mutable counters, for the channel side.
    pub fn stats_mut(&mut self) -> &mut TriggerStats {
        &mut self.stats
    }

    /// The live window.
    pub fn window(&self) -> &CoincidenceWindow {
        &self.window
    }

    /// The station table.
    pub fn table(&self) -> &StationTable {
        &self.table
    }

    /// Add one batch to the window. Batches from unknown stations are
    /// discarded.
    pub fn ingest(&mut self, batch: &T2Batch, now: GpsTime) -> IngestOutcome {
        let Some(unit) = self.table.unit(batch.station_id) else {
            tracing::warn!(
                station_id = batch.station_id,
                hits = batch.entries.len(),
                "T2 batch from unknown station discarded"
            );
            self.stats.malformed += 1;
            return IngestOutcome::default();
        };
        let outcome = self.window.ingest(batch, unit, now);
        self.stats.hits += outcome.accepted as u64;
        self.stats.duplicates += outcome.duplicates as u64;
        self.stats.window_full += outcome.dropped as u64;
        self.stats.malformed += outcome.malformed as u64;
        if outcome.malformed > 0 {
            tracing::warn!(
                station_id = batch.station_id,
                count = outcome.malformed,
                "implausible subsecond discarded"
            );
        }
        outcome
    }

    /// Evict stale hits and restore newest-first order.
    pub fn cleanup(&mut self, now: GpsTime) {
        self.stats.evicted += self.window.evict(now) as u64;
        self.window.sort();
    }

    /// Run the coincidence scan and return the T3s found, in emission order.
    pub fn scan(&mut self, now: GpsTime) -> Vec<T3Request> {
        let mut requests = Vec::new();
        let start = self
            .window
            .settle_frontier(now, self.params.settle_ns, self.params.coincidence_ns);

        for seed_index in start..self.window.len() {
            let entries = self.window.entries();
            let seed = entries[seed_index];
            if seed.hit.used {
                continue;
            }
            let periodic = seed.hit.flags.contains(HitFlags::PERIODIC);
            let random = seed.hit.flags.contains(HitFlags::RANDOM);

            let mut members = vec![seed_index];
            let mut units = vec![seed.unit];
            let mut near = 0usize;
            for (offset, candidate) in entries[seed_index + 1..].iter().enumerate() {
                let dt = seed.hit.time.nanos_since(&candidate.hit.time);
                if dt > self.params.coincidence_ns as u64 {
                    break;
                }
                if candidate.hit.used
                    || candidate.hit.flags.contains(HitFlags::PERIODIC) != periodic
                    || dt > self.table.pair_window(seed.unit, candidate.unit) as u64
                    || units.contains(&candidate.unit)
                {
                    continue;
                }
                members.push(seed_index + 1 + offset);
                units.push(candidate.unit);
                if self.table.is_near(seed.unit, candidate.unit) {
                    near += 1;
                }
            }

            let trigger_type = if periodic {
                TriggerType::TenSecond
            } else if random {
                TriggerType::Random
            } else if units.len() >= self.params.min_stations && near >= self.params.min_near {
                TriggerType::Physics
            } else {
                continue;
            };

            let request = self.build_request(trigger_type, &members);
            tracing::debug!(
                event = request.event_number,
                ?trigger_type,
                stations = members.len(),
                near,
                seed = %seed.hit.time,
                "T3 found"
            );
            self.window.mark_used(&members);
            self.stats.count(trigger_type);
            requests.push(request);
        }
        requests
    }

    fn build_request(&mut self, trigger_type: TriggerType, members: &[usize]) -> T3Request {
        let entries = self.window.entries();
        let mut stations = heapless::Vec::<T3Station, MAX_T3_STATIONS>::new();
        for &index in members {
            let entry = &entries[index];
            let station = T3Station::from_hit(self.table.station_id(entry.unit), entry.hit.time);
            if stations.push(station).is_err() {
                tracing::warn!(
                    members = members.len(),
                    listed = MAX_T3_STATIONS,
                    "too many stations in T3, surplus not requested"
                );
                break;
            }
        }
        let event_number = self.next_event;
        self.next_event = self.next_event.wrapping_add(1);
        T3Request {
            trigger_type,
            event_number,
            stations,
        }
    }
}
