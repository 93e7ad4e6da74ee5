//! Event files on disk.
//!
//! A file set is one file per event stream (`AD/ad`, `TD/td`, `MD/md`)
//! sharing a run id and serial, opened when the first event after a
//! rotation is written. The file header at the start of each file is
//! written on open and rewritten with the final event range on close.
//! Station telemetry goes to a text log `MON/MO` of the same run and serial,
//! independent of whether a run is active.

use crate::event::{FileHeader, PhysicsEvent, StreamKind};
use adaq::config::BuilderConfig;
use adaq::consts::MAX_FILE_SERIAL;
use adaq::record::MonitorReport;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, error, info};

/// Run parameters reloaded at every Start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunParams {
    /// Run id of the first file set.
    pub run_id: u32,
    /// Run mode recorded in file headers.
    pub run_mode: u32,
    /// Main stream events per file set.
    pub max_events_per_file: u32,
    /// Output root.
    pub output_dir: PathBuf,
}

impl From<&BuilderConfig> for RunParams {
    fn from(builder: &BuilderConfig) -> Self {
        Self {
            run_id: builder.run_id,
            run_mode: builder.run_mode,
            max_events_per_file: builder.max_events_per_file,
            output_dir: builder.output_dir.clone(),
        }
    }
}

/// Path of an event file.
pub fn event_file_path(root: &Path, kind: StreamKind, run_id: u32, serial: u32) -> PathBuf {
    root.join(kind.dir())
        .join(format!("{}{run_id:06}.f{serial:04}", kind.prefix()))
}

/// Path of a monitor log.
pub fn monitor_file_path(root: &Path, run_id: u32, serial: u32) -> PathBuf {
    root.join("MON").join(format!("MO{run_id:06}.f{serial:04}"))
}

/// Counters of the output side.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OutputStats {
    /// Events written per stream (main, minbias, random).
    pub events: [u64; 3],
    /// Events lost to a disabled stream.
    pub lost: u64,
    /// File sets closed.
    pub file_sets: u64,
    /// Disk errors.
    pub write_errors: u64,
    /// Monitor lines logged.
    pub monitor_lines: u64,
}

#[derive(Debug)]
struct StreamFile {
    path: PathBuf,
    writer: Option<BufWriter<File>>,
}

impl StreamFile {
    fn create(path: PathBuf, header: &FileHeader) -> io::Result<Self> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        let file = OpenOptions::new().write(true).create_new(true).open(&path)?;
        let mut writer = BufWriter::new(file);
        header.write_to(&mut writer)?;
        Ok(Self {
            path,
            writer: Some(writer),
        })
    }

    fn finish(&mut self, header: &FileHeader) -> io::Result<()> {
        let Some(mut writer) = self.writer.take() else {
            return Ok(());
        };
        writer.seek(SeekFrom::Start(0))?;
        header.write_to(&mut writer)?;
        writer.flush()
    }
}

#[derive(Debug)]
struct FileSet {
    /// One slot per stream; `None` when the stream is disabled.
    streams: [Option<StreamFile>; 3],
    header: FileHeader,
    main_events: u32,
}

#[derive(Debug)]
struct MonitorLog {
    run_id: u32,
    serial: u32,
    writer: Option<BufWriter<File>>,
}

/// The builder's output files.
#[derive(Debug)]
pub struct OutputStreams {
    params: RunParams,
    run_id: u32,
    serial: u32,
    next_event_id: u32,
    open: Option<FileSet>,
    monitor: Option<MonitorLog>,
    stats: OutputStats,
}

impl OutputStreams {
    /// No files are opened until the first event or monitor line.
    pub fn new(params: RunParams) -> Self {
        Self {
            run_id: params.run_id,
            serial: 1,
            params,
            next_event_id: 0,
            open: None,
            monitor: None,
            stats: OutputStats::default(),
        }
    }

    /// Close everything and restart numbering at serial 1 of `params.run_id`.
    ///
    /// Event ids keep counting for the lifetime of the process.
    pub fn start_run(&mut self, params: RunParams) {
        self.close();
        self.monitor = None;
        self.run_id = params.run_id;
        self.serial = 1;
        self.params = params;
    }

    /// Current run id.
    pub fn run_id(&self) -> u32 {
        self.run_id
    }

    /// Serial of the current (or next) file set.
    pub fn serial(&self) -> u32 {
        self.serial
    }

    /// Id the next event will get.
    pub fn next_event_id(&self) -> u32 {
        self.next_event_id
    }

    /// True while a file set is open.
    pub fn is_open(&self) -> bool {
        self.open.is_some()
    }

    /// Counters so far.
    pub fn stats(&self) -> OutputStats {
        self.stats
    }

    /// Active run parameters.
    pub fn params(&self) -> &RunParams {
        &self.params
    }

    /// Write one event to its stream, opening a file set if needed.
    /// Returns `false` when the stream is disabled by an earlier disk error.
    pub fn write_event(&mut self, event: &PhysicsEvent) -> bool {
        let event_id = self.next_event_id;
        self.next_event_id = self.next_event_id.wrapping_add(1);
        let second = event.time().second;

        if self.open.is_none() {
            self.open_file_set(event_id, second);
        }
        let run_id = self.run_id;
        let Some(set) = self.open.as_mut() else {
            return false;
        };
        set.header.last_event_id = event_id;
        set.header.last_event_time = second;

        let kind = event.stream();
        let written = match set.streams[kind.index()].as_mut() {
            Some(stream) => match stream.writer.as_mut() {
                Some(writer) => match event.write_to(writer, run_id, event_id) {
                    Ok(()) => true,
                    Err(e) => {
                        error!(path = %stream.path.display(), error = %e, "event write failed, stream disabled");
                        set.streams[kind.index()] = None;
                        self.stats.write_errors += 1;
                        false
                    }
                },
                None => false,
            },
            None => false,
        };

        if written {
            self.stats.events[kind.index()] += 1;
            debug!(
                event_id,
                t3_id = event.t3_id(),
                stations = event.du_count(),
                stream = kind.prefix(),
                "event written"
            );
        } else {
            self.stats.lost += 1;
        }

        if kind == StreamKind::Main {
            set.main_events += 1;
            if set.main_events >= self.params.max_events_per_file {
                self.close();
            }
        }
        written
    }

    /// Append a telemetry line to the monitor log.
    pub fn log_monitor(&mut self, report: &MonitorReport) {
        let (run_id, serial) = (self.run_id, self.serial);
        if self
            .monitor
            .as_ref()
            .is_some_and(|log| (log.run_id, log.serial) != (run_id, serial))
        {
            self.close_monitor();
        }
        let root = self.params.output_dir.clone();
        let log = self.monitor.get_or_insert_with(|| MonitorLog {
            run_id,
            serial,
            writer: open_monitor(&root, run_id, serial),
        });
        let Some(writer) = log.writer.as_mut() else {
            return;
        };
        if let Err(e) = writeln!(writer, "{}", report.log_line()) {
            error!(error = %e, "monitor log write failed, log disabled");
            log.writer = None;
            self.stats.write_errors += 1;
            return;
        }
        self.stats.monitor_lines += 1;
    }

    /// Rewrite the headers and close the open file set and monitor log.
    ///
    /// A closed set never reopens: the next set starts at the following
    /// serial even if some of its streams were never created.
    pub fn close(&mut self) {
        if let Some(mut set) = self.open.take() {
            for stream in set.streams.iter_mut().flatten() {
                if let Err(e) = stream.finish(&set.header) {
                    error!(path = %stream.path.display(), error = %e, "closing event file failed");
                    self.stats.write_errors += 1;
                }
            }
            self.stats.file_sets += 1;
            info!(
                run_id = set.header.run_id,
                serial = set.header.file_serial,
                first_event = set.header.first_event_id,
                last_event = set.header.last_event_id,
                main_events = set.main_events,
                "file set closed"
            );
            self.advance_serial();
        }
        self.close_monitor();
    }

    fn close_monitor(&mut self) {
        if let Some(mut writer) = self.monitor.take().and_then(|log| log.writer) {
            if let Err(e) = writer.flush() {
                error!(error = %e, "flushing monitor log failed");
                self.stats.write_errors += 1;
            }
        }
    }

    fn open_file_set(&mut self, first_event_id: u32, first_second: u32) {
        let root = self.params.output_dir.clone();
        while StreamKind::ALL
            .iter()
            .any(|&kind| event_file_path(&root, kind, self.run_id, self.serial).exists())
        {
            self.advance_serial();
        }

        let header = FileHeader {
            run_id: self.run_id,
            run_mode: self.params.run_mode,
            file_serial: self.serial,
            first_event_id,
            first_event_time: first_second,
            last_event_id: first_event_id,
            last_event_time: first_second,
        };
        let streams = StreamKind::ALL.map(|kind| {
            let path = event_file_path(&root, kind, self.run_id, self.serial);
            match StreamFile::create(path.clone(), &header) {
                Ok(stream) => Some(stream),
                Err(e) => {
                    error!(path = %path.display(), error = %e, "cannot create event file, stream disabled");
                    self.stats.write_errors += 1;
                    None
                }
            }
        });
        info!(run_id = self.run_id, serial = self.serial, "file set opened");
        self.open = Some(FileSet {
            streams,
            header,
            main_events: 0,
        });
    }

    fn advance_serial(&mut self) {
        self.serial += 1;
        if self.serial > MAX_FILE_SERIAL {
            self.serial = 1;
            self.run_id += 1;
        }
    }
}

fn open_monitor(root: &Path, run_id: u32, serial: u32) -> Option<BufWriter<File>> {
    let path = monitor_file_path(root, run_id, serial);
    let file = path
        .parent()
        .map_or(Ok(()), fs::create_dir_all)
        .and_then(|()| OpenOptions::new().create(true).append(true).open(&path));
    match file {
        Ok(file) => Some(BufWriter::new(file)),
        Err(e) => {
            error!(path = %path.display(), error = %e, "cannot open monitor log");
            None
        }
    }
}
