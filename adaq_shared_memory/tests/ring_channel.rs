//! Ring channel behaviour across readers, restarts and saturation

use adaq::config::{ChannelGeometry, ChannelsConfig};
use adaq::consts::{BUILDER_READER, LINK_READER};
use adaq::record::{ChannelRecord, Command, RecordError};
use adaq_shared_memory::{ChannelSet, RetryPolicy, RingChannel, ShmError, ShmResult};
use std::time::{Duration, Instant};

#[test]
fn test_two_readers_see_every_record_once() -> ShmResult<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("t3");
    let mut writer = RingChannel::create(&path, ChannelGeometry::new(4, 8), 2)?;
    let link = RingChannel::attach(&path)?;
    let builder = RingChannel::attach(&path)?;

    for i in 0..3u16 {
        assert!(writer.try_write(&[i, i + 100]));
    }

    let mut seen_by_link = Vec::new();
    while let Some(words) = link.take(LINK_READER) {
        seen_by_link.push(words[0]);
    }
    assert_eq!(seen_by_link, vec![0, 1, 2]);
    assert_eq!(link.pending(LINK_READER), 0);
    assert_eq!(builder.pending(BUILDER_READER), 3);

    let first = builder.try_read(BUILDER_READER).unwrap();
    assert_eq!(first.words, vec![0, 100]);
    // Not acknowledged: the same slot is returned again.
    assert_eq!(builder.try_read(BUILDER_READER).unwrap(), first);
    builder.ack(BUILDER_READER, first.cursor);
    assert_eq!(builder.take(BUILDER_READER), Some(vec![1, 101]));
    assert_eq!(builder.take(BUILDER_READER), Some(vec![2, 102]));
    assert_eq!(builder.take(BUILDER_READER), None);
    Ok(())
}

#[test]
fn test_slot_reusable_only_after_both_readers_ack() -> ShmResult<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("cmd");
    let mut writer = RingChannel::create(&path, ChannelGeometry::new(1, 4), 2)?
        .with_retry(RetryPolicy {
            attempts: 2,
            backoff: Duration::from_micros(100),
        });

    assert!(writer.write_record(&Command::Start));
    assert!(!writer.write_record(&Command::Stop));

    assert_eq!(writer.read_record::<Command>(LINK_READER), Some(Ok(Command::Start)));
    assert!(!writer.write_record(&Command::Stop));

    assert_eq!(writer.read_record::<Command>(BUILDER_READER), Some(Ok(Command::Start)));
    assert!(writer.write_record(&Command::Stop));
    Ok(())
}

#[test]
fn test_reattached_reader_resumes_at_stored_cursor() -> ShmResult<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("event");
    let geometry = ChannelGeometry::new(8, 4);
    let mut writer = RingChannel::create(&path, geometry, 1)?;
    for i in 0..5u16 {
        assert!(writer.try_write(&[i]));
    }

    {
        let reader = RingChannel::attach(&path)?;
        assert_eq!(reader.take(0), Some(vec![0]));
        assert_eq!(reader.take(0), Some(vec![1]));
    }

    let restarted = RingChannel::open_or_create(&path, geometry, 1)?;
    assert_eq!(restarted.cursor(0), Some(2));
    assert_eq!(restarted.take(0), Some(vec![2]));
    Ok(())
}

#[test]
fn test_full_channel_drops_within_retry_bound() -> ShmResult<()> {
    adaq_shared_memory::init_tracing();
    let dir = tempfile::tempdir()?;
    let retry = RetryPolicy {
        attempts: 5,
        backoff: Duration::from_millis(2),
    };
    let mut channel = RingChannel::create(&dir.path().join("full"), ChannelGeometry::new(2, 4), 1)?
        .with_retry(retry);
    assert!(channel.try_write(&[1]));
    assert!(channel.try_write(&[2]));

    for _ in 0..3 {
        let start = Instant::now();
        assert!(!channel.try_write(&[3]));
        let elapsed = start.elapsed();
        assert!(elapsed >= retry.worst_case());
        assert!(elapsed < retry.worst_case() + Duration::from_secs(1));
    }

    assert_eq!(channel.take(0), Some(vec![1]));
    assert!(channel.try_write(&[3]));
    Ok(())
}

#[test]
fn test_geometry_mismatch_is_an_error() -> ShmResult<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("t2");
    RingChannel::create(&path, ChannelGeometry::new(4, 8), 1)?;
    let result = RingChannel::open_or_create(&path, ChannelGeometry::new(4, 16), 1);
    assert!(matches!(result, Err(ShmError::GeometryMismatch { .. })));
    Ok(())
}

#[test]
fn test_garbage_file_is_replaced() -> ShmResult<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("junk");
    std::fs::write(&path, vec![0xffu8; 16])?;
    assert!(matches!(RingChannel::attach(&path), Err(ShmError::BadMagic { .. })));

    let mut channel = RingChannel::open_or_create(&path, ChannelGeometry::new(2, 2), 1)?;
    assert!(channel.try_write(&[7, 8]));
    Ok(())
}

#[test]
fn test_malformed_record_is_consumed() -> ShmResult<()> {
    let dir = tempfile::tempdir()?;
    let mut channel = RingChannel::create(&dir.path().join("m"), ChannelGeometry::new(2, 4), 1)?;
    assert!(channel.try_write(&[999]));
    assert!(channel.write_record(&Command::Stop));
    assert_eq!(
        channel.read_record::<Command>(0),
        Some(Err(RecordError::UnknownTag(999)))
    );
    assert_eq!(channel.read_record::<Command>(0), Some(Ok(Command::Stop)));
    Ok(())
}

#[test]
fn test_channel_set_shares_files_between_processes() -> ShmResult<()> {
    let dir = tempfile::tempdir()?;
    let config = ChannelsConfig {
        dir: dir.path().to_path_buf(),
        t2: ChannelGeometry::new(4, 32),
        t3: ChannelGeometry::new(4, 32),
        event: ChannelGeometry::new(4, 64),
        command: ChannelGeometry::new(4, 8),
        ..ChannelsConfig::default()
    };
    let mut front_end = ChannelSet::open("site", &config)?;
    let builder = ChannelSet::open("site", &config)?;

    assert!(front_end.command.try_write(&Command::Stop.to_words()));
    assert_eq!(
        builder.command.read_record::<Command>(BUILDER_READER),
        Some(Ok(Command::Stop))
    );
    assert!(dir.path().join("site_event").exists());
    Ok(())
}
