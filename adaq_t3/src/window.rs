//! Coincidence window: the live T2 hits, newest first.

use crate::geometry::Unit;
use adaq::record::{HitFlags, HitRecord, T2Batch};
use adaq::time::GpsTime;

/// GPS jump (seconds) beyond which a new hit is reported as a timing error.
pub const TIMING_JUMP_SECONDS: u32 = 100;

/// A hit held in the window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowEntry {
    /// The hit itself.
    pub hit: HitRecord,
    /// Station table index.
    pub unit: Unit,
    /// Wall-clock second at ingestion.
    pub inserted: u32,
}

/// What happened to one batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestOutcome {
    /// Hits appended.
    pub accepted: usize,
    /// Hits coalesced with the previous identical hit.
    pub duplicates: usize,
    /// Hits lost because the window was full.
    pub dropped: usize,
    /// Hits discarded as implausible.
    pub malformed: usize,
}

/// Bounded, reverse-time-sorted set of live hits.
#[derive(Debug)]
pub struct CoincidenceWindow {
    entries: Vec<WindowEntry>,
    capacity: usize,
    window_seconds: u32,
    random_every: u32,
    random_counter: u32,
    last_ingested: Option<HitRecord>,
}

impl CoincidenceWindow {
    /// Empty window.
    ///
    /// `random_every` tags every Nth untagged hit as random; 0 disables.
    pub fn new(capacity: usize, window_seconds: u32, random_every: u32) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
            capacity,
            window_seconds,
            random_every,
            random_counter: 0,
            last_ingested: None,
        }
    }

    /// Append the hits of one batch.
    ///
    /// The caller has already resolved the station to `unit`. Entries are
    /// appended unsorted; call [`CoincidenceWindow::sort`] once afterwards.
    pub fn ingest(&mut self, batch: &T2Batch, unit: Unit, now: GpsTime) -> IngestOutcome {
        let mut outcome = IngestOutcome::default();
        let newest_second = self.entries.first().map(|e| e.hit.time.second);
        let mut jump_reported = false;

        for mut hit in batch.hits() {
            if !hit.is_plausible() {
                outcome.malformed += 1;
                continue;
            }
            if self.last_ingested.is_some_and(|last| last.same_hit(&hit)) {
                outcome.duplicates += 1;
                continue;
            }
            if self.entries.len() >= self.capacity {
                outcome.dropped += 1;
                continue;
            }
            if !jump_reported
                && newest_second
                    .is_some_and(|newest| hit.time.second > newest.saturating_add(TIMING_JUMP_SECONDS))
            {
                tracing::warn!(
                    station_id = hit.station_id,
                    second = hit.time.second,
                    newest = newest_second,
                    "timing error, large jump"
                );
                jump_reported = true;
            }

            if self.random_every > 0 && !hit.flags.intersects(HitFlags::PERIODIC | HitFlags::RANDOM) {
                self.random_counter += 1;
                if self.random_counter >= self.random_every {
                    self.random_counter = 0;
                    hit.flags |= HitFlags::RANDOM;
                }
            }

            self.last_ingested = Some(hit);
            self.entries.push(WindowEntry {
                hit,
                unit,
                inserted: now.second,
            });
            outcome.accepted += 1;
        }

        if outcome.dropped > 0 {
            tracing::warn!(
                station_id = batch.station_id,
                dropped = outcome.dropped,
                capacity = self.capacity,
                "coincidence window full, hits dropped"
            );
        }
        outcome
    }

    /// Remove used hits, hits older than the window (wall clock) and hits
    /// implausibly far ahead of the most recently ingested one. Returns the
    /// number removed.
    pub fn evict(&mut self, now: GpsTime) -> usize {
        let before = self.entries.len();
        let window = self.window_seconds;
        let horizon = self
            .last_ingested
            .map(|last| last.time.second.saturating_add(window));
        self.entries.retain(|entry| {
            let stale = now.second.saturating_sub(entry.inserted) > window;
            let ahead = horizon.is_some_and(|h| entry.hit.time.second > h);
            !(entry.hit.used || stale || ahead)
        });
        before - self.entries.len()
    }

    /// Stable sort, newest first.
    pub fn sort(&mut self) {
        self.entries.sort_by(|a, b| b.hit.time.cmp(&a.hit.time));
    }

    /// Live entries, newest first after [`CoincidenceWindow::sort`].
    pub fn entries(&self) -> &[WindowEntry] {
        &self.entries
    }

    /// Mark entries as part of an emitted T3.
    pub fn mark_used(&mut self, indices: &[usize]) {
        for &index in indices {
            self.entries[index].hit.used = true;
        }
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when no hit is held.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Index of the newest hit that may seed a coincidence.
    ///
    /// Hits younger than `settle_ns` are not eligible. A settled hit that is
    /// within `coincidence_ns` of an unsettled one is not eligible either:
    /// that unsettled hit will seed the shower once it settles.
    pub fn settle_frontier(&self, now: GpsTime, settle_ns: u64, coincidence_ns: u32) -> usize {
        let settled = self
            .entries
            .iter()
            .position(|e| now.nanos_since(&e.hit.time) >= settle_ns)
            .unwrap_or(self.entries.len());
        if settled == 0 {
            return 0;
        }
        let newest_unsettled = self.entries[settled - 1].hit.time;
        settled
            + self.entries[settled..]
                .iter()
                .take_while(|e| newest_unsettled.nanos_since(&e.hit.time) <= coincidence_ns as u64)
                .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use adaq::record::T2Entry;

    fn batch(station_id: u16, second: u32, subseconds: &[u32]) -> T2Batch {
        T2Batch {
            station_id,
            second,
            entries: subseconds
                .iter()
                .map(|&ns| T2Entry::new(ns, HitFlags::empty()))
                .collect(),
        }
    }

    #[test]
    fn identical_back_to_back_hits_are_coalesced() {
        let mut window = CoincidenceWindow::new(100, 12, 0);
        let outcome = window.ingest(&batch(1, 10, &[4000, 4000]), 0, GpsTime::new(10, 0));
        assert_eq!(outcome.accepted, 1);
        assert_eq!(outcome.duplicates, 1);
        assert_eq!(window.len(), 1);

        // Same timestamp again in the next batch.
        let outcome = window.ingest(&batch(1, 10, &[4000]), 0, GpsTime::new(10, 0));
        assert_eq!(outcome.duplicates, 1);
        assert_eq!(window.len(), 1);
    }

    #[test]
    fn every_nth_hit_is_tagged_random() {
        let mut window = CoincidenceWindow::new(100, 12, 3);
        let subseconds: Vec<u32> = (1..=7).map(|i| i * 1000).collect();
        window.ingest(&batch(1, 10, &subseconds), 0, GpsTime::new(10, 0));
        let tagged: Vec<bool> = window
            .entries()
            .iter()
            .map(|e| e.hit.flags.contains(HitFlags::RANDOM))
            .collect();
        assert_eq!(tagged, vec![false, false, true, false, false, true, false]);
    }

    #[test]
    fn full_window_drops_the_rest() {
        let mut window = CoincidenceWindow::new(2, 12, 0);
        let outcome = window.ingest(&batch(1, 10, &[100, 200, 300]), 0, GpsTime::new(10, 0));
        assert_eq!(outcome.accepted, 2);
        assert_eq!(outcome.dropped, 1);
    }

    #[test]
    fn sort_is_newest_first() {
        let mut window = CoincidenceWindow::new(100, 12, 0);
        window.ingest(&batch(1, 10, &[500]), 0, GpsTime::new(10, 0));
        window.ingest(&batch(2, 11, &[100]), 1, GpsTime::new(11, 0));
        window.ingest(&batch(3, 10, &[900]), 2, GpsTime::new(11, 0));
        window.sort();
        let stations: Vec<u16> = window.entries().iter().map(|e| e.hit.station_id).collect();
        assert_eq!(stations, vec![2, 3, 1]);
    }

    #[test]
    fn eviction_by_age_use_and_jump() {
        let mut window = CoincidenceWindow::new(100, 12, 0);
        window.ingest(&batch(1, 100, &[1000]), 0, GpsTime::new(100, 0));
        window.ingest(&batch(2, 5000, &[1000]), 1, GpsTime::new(105, 0));
        window.ingest(&batch(3, 104, &[1000, 2000]), 2, GpsTime::new(105, 0));
        window.sort();
        // the 5000 s hit lies far ahead of the last ingested (104 s)
        assert_eq!(window.evict(GpsTime::new(105, 0)), 1);
        assert_eq!(window.len(), 3);

        window.mark_used(&[0]);
        assert_eq!(window.evict(GpsTime::new(105, 0)), 1);

        // station 1 was inserted at 100 s
        assert_eq!(window.evict(GpsTime::new(113, 0)), 1);
        assert_eq!(window.len(), 1);
    }

    #[test]
    fn frontier_waits_for_unsettled_partner() {
        let settle = 1_000_000_000;
        let mut window = CoincidenceWindow::new(100, 12, 0);
        window.ingest(&batch(1, 100, &[0, 10_000, 500_000]), 0, GpsTime::new(100, 0));
        window.sort();
        // Hits at 100.000500, 100.000010, 100.000000.
        assert_eq!(window.settle_frontier(GpsTime::new(100, 600_000), settle, 34_000), 3);
        // Newest settled; all eligible.
        assert_eq!(window.settle_frontier(GpsTime::new(101, 500_000), settle, 34_000), 0);
        // Only the newest is unsettled and it is far from the others.
        assert_eq!(window.settle_frontier(GpsTime::new(101, 20_000), settle, 34_000), 1);
        // With a wider bound the settled pair is held back behind it.
        assert_eq!(window.settle_frontier(GpsTime::new(101, 20_000), settle, 600_000), 3);
    }
}
