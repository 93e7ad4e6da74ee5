//! Station table and pair coincidence windows.
//!
//! The window of a station pair is the light travel time between the two
//! stations plus a fixed offset, capped at the global coincidence bound.
//! Pairs whose window is at most the near bound are near neighbours.

use adaq::config::{StationConfig, TriggerConfig};
use adaq::consts::LIGHT_SPEED_M_PER_NS;
use std::collections::HashMap;

/// Index of a station in the table.
pub type Unit = usize;

/// Precomputed pair windows for every configured station.
#[derive(Debug, Clone)]
pub struct StationTable {
    ids: Vec<u16>,
    units: HashMap<u16, Unit>,
    windows: Vec<u32>,
    near_ns: u32,
}

impl StationTable {
    /// Build the table from station positions.
    pub fn new(stations: &[StationConfig], trigger: &TriggerConfig) -> Self {
        let n = stations.len();
        let mut windows = vec![0u32; n * n];
        for (i, a) in stations.iter().enumerate() {
            for (j, b) in stations.iter().enumerate().take(i + 1) {
                let distance = ((a.x - b.x).powi(2) + (a.y - b.y).powi(2)).sqrt();
                let travel = (distance / LIGHT_SPEED_M_PER_NS) as u32;
                let window = trigger
                    .pair_offset_ns
                    .saturating_add(travel)
                    .min(trigger.coincidence_ns);
                windows[i * n + j] = window;
                windows[j * n + i] = window;
            }
        }
        Self {
            ids: stations.iter().map(|s| s.id).collect(),
            units: stations.iter().enumerate().map(|(i, s)| (s.id, i)).collect(),
            windows,
            near_ns: trigger.near_ns,
        }
    }

    /// Table index of a station id.
    #[inline]
    pub fn unit(&self, station_id: u16) -> Option<Unit> {
        self.units.get(&station_id).copied()
    }

    /// Station id at a table index.
    #[inline]
    pub fn station_id(&self, unit: Unit) -> u16 {
        self.ids[unit]
    }

    /// Number of stations.
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// True when no station is configured.
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Maximum time difference (ns) for hits of two stations to belong to
    /// one shower front.
    #[inline]
    pub fn pair_window(&self, a: Unit, b: Unit) -> u32 {
        self.windows[a * self.ids.len() + b]
    }

    /// Two distinct stations close enough to count as near neighbours.
    #[inline]
    pub fn is_near(&self, a: Unit, b: Unit) -> bool {
        a != b && self.pair_window(a, b) <= self.near_ns
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn station(id: u16, x: f64, y: f64) -> StationConfig {
        StationConfig { id, x, y }
    }

    #[test]
    fn windows_grow_with_distance() {
        let trigger = TriggerConfig::default();
        let table = StationTable::new(
            &[station(1, 0.0, 0.0), station(2, 300.0, 400.0), station(3, 3000.0, 4000.0)],
            &trigger,
        );
        // 500 m / c = 1667 ns
        assert_eq!(table.pair_window(0, 1), 100 + 1667);
        assert_eq!(table.pair_window(1, 0), table.pair_window(0, 1));
        // 5 km / c = 16678 ns
        assert_eq!(table.pair_window(0, 2), 100 + 16_678);
        assert_eq!(table.pair_window(2, 2), 100);
        assert!(table.is_near(0, 1));
        assert!(!table.is_near(0, 2));
        assert!(!table.is_near(1, 1));
    }

    #[test]
    fn windows_are_capped_by_coincidence_bound() {
        let trigger = TriggerConfig::default();
        let table = StationTable::new(&[station(1, 0.0, 0.0), station(2, 50_000.0, 0.0)], &trigger);
        assert_eq!(table.pair_window(0, 1), trigger.coincidence_ns);
    }

    #[test]
    fn unknown_station_has_no_unit() {
        let table = StationTable::new(&[station(5100, 0.0, 0.0)], &TriggerConfig::default());
        assert_eq!(table.unit(5100), Some(0));
        assert_eq!(table.unit(5101), None);
        assert_eq!(table.station_id(0), 5100);
    }
}
