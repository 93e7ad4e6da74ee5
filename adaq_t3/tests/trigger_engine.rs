//! T3 maker against real channel files

use adaq::config::{ChannelGeometry, ChannelsConfig, DaqConfig, SharedConfig, StationConfig};
use adaq::consts::{BUILDER_READER, LINK_READER};
use adaq::record::{HitFlags, T2Batch, T2Entry, T3Request, TriggerType};
use adaq::time::GpsTime;
use adaq_shared_memory::ChannelSet;
use adaq_t3::TriggerEngine;

fn config(dir: &std::path::Path, t3_slots: u32) -> DaqConfig {
    DaqConfig {
        shared: SharedConfig {
            log_level: Default::default(),
            service_name: "t3test".to_string(),
        },
        channels: ChannelsConfig {
            dir: dir.to_path_buf(),
            retry_attempts: 1,
            retry_backoff_us: 0,
            t2: ChannelGeometry::new(16, 64),
            t3: ChannelGeometry::new(t3_slots, 64),
            event: ChannelGeometry::new(2, 16),
            command: ChannelGeometry::new(2, 4),
        },
        trigger: Default::default(),
        builder: Default::default(),
        stations: (1..=4)
            .map(|id| StationConfig {
                id,
                x: 300.0 * id as f64,
                y: 0.0,
            })
            .collect(),
    }
}

fn batch(station_id: u16, second: u32, hits: &[(u32, HitFlags)]) -> T2Batch {
    T2Batch {
        station_id,
        second,
        entries: hits.iter().map(|&(ns, flags)| T2Entry::new(ns, flags)).collect(),
    }
}

#[test]
fn shower_becomes_one_t3_for_both_readers() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path(), 8);
    let mut engine = TriggerEngine::open(&config).unwrap();
    let mut link = ChannelSet::open("t3test", &config.channels).unwrap();

    for (i, station) in (1..=4).enumerate() {
        let ns = 5_000_000 + 400 * i as u32;
        assert!(link.t2.write_record(&batch(station, 300, &[(ns, HitFlags::empty())])));
    }

    // Not settled yet.
    assert_eq!(engine.poll(GpsTime::new(300, 500_000_000)), 0);
    assert_eq!(engine.poll(GpsTime::new(301, 500_000_000)), 1);

    for reader in [LINK_READER, BUILDER_READER] {
        let request: T3Request = link.t3.read_record(reader).unwrap().unwrap();
        assert_eq!(request.trigger_type, TriggerType::Physics);
        assert_eq!(request.event_number, 0);
        let ids: Vec<u16> = request.stations.iter().map(|s| s.station_id).collect();
        assert_eq!(ids, vec![4, 3, 2, 1]);
    }
    assert_eq!(engine.stats().physics, 1);
    assert_eq!(engine.stats().hits, 4);

    // Members are consumed: nothing more on later polls.
    assert_eq!(engine.poll(GpsTime::new(302, 0)), 0);
    assert!(engine.correlator().window().is_empty());
}

#[test]
fn saturated_t3_channel_counts_dropped_requests() {
    adaq_shared_memory::init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path(), 1);
    let mut engine = TriggerEngine::open(&config).unwrap();
    let mut link = ChannelSet::open("t3test", &config.channels).unwrap();

    let periodic = HitFlags::PERIODIC;
    assert!(link.t2.write_record(&batch(1, 400, &[(1_000_000, periodic), (9_000_000, periodic)])));

    assert_eq!(engine.poll(GpsTime::new(410, 0)), 1);
    assert_eq!(engine.stats().ten_second, 2);
    assert_eq!(engine.stats().dropped_requests, 1);
}

#[test]
fn malformed_t2_record_is_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path(), 4);
    let mut engine = TriggerEngine::open(&config).unwrap();
    let mut link = ChannelSet::open("t3test", &config.channels).unwrap();

    assert!(link.t2.try_write(&[0x7777, 1, 2]));
    assert!(link.t2.write_record(&batch(2, 500, &[(4_000, HitFlags::empty())])));

    engine.poll(GpsTime::new(500, 0));
    assert_eq!(engine.stats().malformed, 1);
    assert_eq!(engine.stats().hits, 1);
    assert_eq!(link.t2.pending(0), 0);
}
