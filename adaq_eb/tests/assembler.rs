//! Event builder against real channel files and output directories

use adaq::config::{ChannelGeometry, ChannelsConfig, DaqConfig, SharedConfig, StationConfig};
use adaq::consts::BUILDER_READER;
use adaq::record::{
    Command, EventFragment, FragmentFlags, MonitorReport, NoEvent, StationMessage, T3Request,
    TriggerType,
};
use adaq::time::GpsTime;
use adaq_eb::{Assembler, EventHeader, FileHeader, StreamKind, event_file_path, monitor_file_path};
use adaq_shared_memory::ChannelSet;
use rand::seq::SliceRandom;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::time::{Duration, Instant};

const SERVICE: &str = "ebtest";

fn config(dir: &Path, max_events_per_file: u32) -> DaqConfig {
    let mut config = DaqConfig {
        shared: SharedConfig {
            log_level: Default::default(),
            service_name: SERVICE.to_string(),
        },
        channels: ChannelsConfig {
            dir: dir.to_path_buf(),
            retry_attempts: 1,
            retry_backoff_us: 0,
            t2: ChannelGeometry::new(2, 16),
            t3: ChannelGeometry::new(4, 32),
            event: ChannelGeometry::new(32, 64),
            command: ChannelGeometry::new(4, 4),
        },
        trigger: Default::default(),
        builder: Default::default(),
        stations: (1..=6)
            .map(|id| StationConfig {
                id,
                x: 100.0 * id as f64,
                y: 0.0,
            })
            .collect(),
    };
    config.builder.output_dir = dir.join("data");
    config.builder.max_events_per_file = max_events_per_file;
    config
}

fn fragment(t3_id: u16, station_id: u16, second: u32, flags: FragmentFlags) -> StationMessage {
    StationMessage::Fragment(EventFragment {
        t3_id,
        station_id,
        time: GpsTime::new(second, 1000 * station_id as u32),
        flags,
        raw: vec![station_id; 2 + station_id as usize],
    })
}

fn open(config: &DaqConfig) -> (Assembler, ChannelSet) {
    let assembler = Assembler::open(config).unwrap();
    let link = ChannelSet::open(SERVICE, &config.channels).unwrap();
    (assembler, link)
}

fn read_file(path: &Path) -> (FileHeader, Vec<EventHeader>) {
    let len = std::fs::metadata(path).unwrap().len();
    let mut reader = BufReader::new(File::open(path).unwrap());
    let header = FileHeader::read_from(&mut reader).unwrap();
    let mut events = Vec::new();
    let mut offset = 40u64;
    while offset < len {
        let event = EventHeader::read_from(&mut reader).unwrap();
        let payload = event.length as u64 - 40;
        std::io::copy(&mut std::io::Read::take(&mut reader, payload), &mut std::io::sink()).unwrap();
        offset += 4 + event.length as u64;
        events.push(event);
    }
    (header, events)
}

#[test]
fn shuffled_fragments_merge_into_one_event() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path(), 10);
    let (mut assembler, mut link) = open(&config);

    let mut messages: Vec<StationMessage> = (1..=6)
        .map(|station| fragment(42, station, 100, FragmentFlags::from_bits_retain(1 << station)))
        .collect();
    messages.shuffle(&mut rand::thread_rng());

    assert!(link.command.write_record(&Command::Start));
    for message in &messages {
        assert!(link.event.write_record(message));
    }
    assert_eq!(assembler.poll(Instant::now()), 0);
    assert_eq!(assembler.table().len(), 6);

    assert!(link.command.write_record(&Command::Stop));
    assembler.poll(Instant::now());
    assert!(!assembler.is_acquiring());

    let (file, events) = read_file(&event_file_path(&config.builder.output_dir, StreamKind::Main, 1, 1));
    assert_eq!(file.file_serial, 1);
    assert_eq!(events.len(), 1);
    let event = events[0];
    assert_eq!(event.t3_id, 42);
    assert_eq!(event.du_count, 6);
    assert_eq!(event.type_flags, 0b111_1110);
    assert_eq!(event.first_station, 1);
    assert_eq!(event.length as usize, 40 + (1..=6).map(|s| 2 * (2 + s)).sum::<usize>());
}

#[test]
fn main_stream_rotates_after_max_events() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path(), 3);
    let (mut assembler, mut link) = open(&config);

    assert!(link.command.write_record(&Command::Start));
    for t3_id in 0..4u16 {
        assert!(link.event.write_record(&fragment(t3_id, 1, 100 + t3_id as u32, FragmentFlags::empty())));
    }
    assembler.poll(Instant::now());
    assert!(link.command.write_record(&Command::Stop));
    assembler.poll(Instant::now());

    let root = &config.builder.output_dir;
    let (first, events) = read_file(&event_file_path(root, StreamKind::Main, 1, 1));
    assert_eq!(events.len(), 3);
    assert_eq!((first.first_event_id, first.last_event_id), (0, 2));
    assert_eq!((first.first_event_time, first.last_event_time), (100, 102));

    let (second, events) = read_file(&event_file_path(root, StreamKind::Main, 1, 2));
    assert_eq!(events.len(), 1);
    assert_eq!((second.file_serial, second.first_event_id), (2, 3));
    assert!(!event_file_path(root, StreamKind::Main, 1, 3).exists());
}

#[test]
fn streams_follow_trigger_flags() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path(), 10);
    let (mut assembler, mut link) = open(&config);

    assert!(link.command.write_record(&Command::Start));
    link.event.write_record(&fragment(1, 1, 100, FragmentFlags::MINBIAS));
    link.event.write_record(&fragment(2, 1, 100, FragmentFlags::RANDOM));
    link.event.write_record(&fragment(2, 2, 100, FragmentFlags::empty()));
    assembler.poll(Instant::now());
    link.command.write_record(&Command::Stop);
    assembler.poll(Instant::now());

    let root = &config.builder.output_dir;
    assert_eq!(read_file(&event_file_path(root, StreamKind::Main, 1, 1)).1.len(), 0);
    assert_eq!(read_file(&event_file_path(root, StreamKind::Minbias, 1, 1)).1.len(), 1);
    let random = read_file(&event_file_path(root, StreamKind::Random, 1, 1)).1;
    assert_eq!(random.len(), 1);
    assert_eq!(random[0].du_count, 2);
}

#[test]
fn idle_table_is_flushed() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path(), 10);
    let (mut assembler, mut link) = open(&config);

    assert!(link.command.write_record(&Command::Start));
    link.event.write_record(&fragment(5, 1, 100, FragmentFlags::empty()));
    link.event.write_record(&fragment(5, 2, 100, FragmentFlags::empty()));
    let now = Instant::now();
    assert_eq!(assembler.poll(now), 0);
    assert_eq!(assembler.poll(now + Duration::from_secs(1)), 0);
    assert_eq!(assembler.poll(now + Duration::from_secs(6)), 1);
    assert!(assembler.table().is_empty());
    assert!(assembler.output().is_open());
}

#[test]
fn fragments_without_a_run_are_discarded_but_monitor_is_logged() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path(), 10);
    let (mut assembler, mut link) = open(&config);

    link.event.write_record(&fragment(1, 1, 100, FragmentFlags::empty()));
    link.event.write_record(&StationMessage::NoEvent(NoEvent {
        event_number: 1,
        station_id: 2,
    }));
    link.event.write_record(&StationMessage::Monitor(MonitorReport {
        station_id: 3,
        firmware: 0,
        payload: vec![77],
    }));
    assembler.poll(Instant::now());

    let stats = assembler.stats();
    assert_eq!((stats.discarded, stats.no_events, stats.monitors), (1, 1, 1));
    assert!(assembler.table().is_empty());
    assembler.shutdown();

    let log = std::fs::read_to_string(monitor_file_path(&config.builder.output_dir, 1, 1)).unwrap();
    assert_eq!(log.lines().collect::<Vec<_>>(), vec!["00003 000     0 77"]);
    assert!(!event_file_path(&config.builder.output_dir, StreamKind::Main, 1, 1).exists());
}

#[test]
fn builder_releases_its_copy_of_t3_requests() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path(), 10);
    let (mut assembler, mut link) = open(&config);

    let request = T3Request {
        trigger_type: TriggerType::Physics,
        event_number: 9,
        stations: heapless::Vec::new(),
    };
    assert!(link.t3.write_record(&request));
    assert_eq!(link.t3.pending(BUILDER_READER), 1);
    assembler.poll(Instant::now());
    assert_eq!(link.t3.pending(BUILDER_READER), 0);
    assert_eq!(assembler.stats().requests, 1);
}

#[test]
fn reinitialize_closes_files_and_keeps_running() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path(), 10);
    let (mut assembler, mut link) = open(&config);

    link.command.write_record(&Command::Start);
    link.event.write_record(&fragment(1, 1, 100, FragmentFlags::empty()));
    link.event.write_record(&fragment(2, 1, 106, FragmentFlags::empty()));
    assert_eq!(assembler.poll(Instant::now()), 1);
    assert!(assembler.output().is_open());

    link.command.write_record(&Command::Reinitialize { station: 0 });
    assembler.poll(Instant::now());
    assert!(assembler.is_acquiring());
    assert!(!assembler.output().is_open());
    assert!(assembler.table().is_empty());

    // The next event opens the next free serial.
    link.event.write_record(&fragment(3, 1, 200, FragmentFlags::empty()));
    assembler.poll(Instant::now());
    link.command.write_record(&Command::Stop);
    assembler.poll(Instant::now());
    assert!(event_file_path(&config.builder.output_dir, StreamKind::Main, 1, 2).exists());
}

fn write_builder_config(path: &Path, output_dir: &Path, max_events_per_file: u32) {
    let text = format!(
        r#"[shared]
service_name = "{SERVICE}"

[builder]
run_id = 1
max_events_per_file = {max_events_per_file}
output_dir = "{}"

[[stations]]
id = 1
x = 0.0
y = 0.0
"#,
        output_dir.display()
    );
    std::fs::write(path, text).unwrap();
}

#[test]
fn start_reloads_parameters_and_clears_the_table() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path(), 10);
    let root = config.builder.output_dir.clone();
    let config_path = dir.path().join("adaq.toml");
    write_builder_config(&config_path, &root, 2);

    let (assembler, mut link) = open(&config);
    let mut assembler = assembler.with_config_path(config_path.clone());

    // First run: three events, two per file.
    link.command.write_record(&Command::Start);
    for t3_id in 0..3u16 {
        link.event.write_record(&fragment(t3_id, 1, 100 + t3_id as u32, FragmentFlags::empty()));
    }
    assembler.poll(Instant::now());
    assert_eq!(assembler.output().params().max_events_per_file, 2);
    link.command.write_record(&Command::Stop);
    assembler.poll(Instant::now());
    assert_eq!(read_file(&event_file_path(&root, StreamKind::Main, 1, 1)).1.len(), 2);
    assert_eq!(read_file(&event_file_path(&root, StreamKind::Main, 1, 2)).1.len(), 1);

    // Second run with a larger file size; leave a fragment buffered.
    write_builder_config(&config_path, &root, 5);
    link.command.write_record(&Command::Start);
    link.event.write_record(&fragment(10, 1, 200, FragmentFlags::empty()));
    assembler.poll(Instant::now());
    assert_eq!(assembler.output().params().max_events_per_file, 5);
    assert_eq!(assembler.table().len(), 1);

    // A broken file keeps the parameters; the buffered fragment is dropped.
    std::fs::write(&config_path, "not toml {{").unwrap();
    link.command.write_record(&Command::Start);
    assembler.poll(Instant::now());
    assert!(assembler.is_acquiring());
    assert!(assembler.table().is_empty());
    assert_eq!(assembler.output().params().max_events_per_file, 5);
    assert_eq!((assembler.output().run_id(), assembler.output().serial()), (1, 1));

    for t3_id in 20..26u16 {
        link.event.write_record(&fragment(t3_id, 1, 300 + t3_id as u32, FragmentFlags::empty()));
    }
    assembler.poll(Instant::now());
    link.command.write_record(&Command::Stop);
    assembler.poll(Instant::now());

    // Serials 1 and 2 are taken, so the new run continues at 3.
    assert_eq!(read_file(&event_file_path(&root, StreamKind::Main, 1, 1)).1.len(), 2);
    let (third, events) = read_file(&event_file_path(&root, StreamKind::Main, 1, 3));
    assert_eq!(events.len(), 5);
    assert_eq!((third.file_serial, third.first_event_id), (3, 3));
    assert_eq!(read_file(&event_file_path(&root, StreamKind::Main, 1, 4)).1.len(), 1);
    assert!(!event_file_path(&root, StreamKind::Main, 1, 5).exists());
}
