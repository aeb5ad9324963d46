// Copyright 2022 Twitter, Inc.
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! An asynchronous logging backend for the `log` facade. Call sites use the
//! standard `error!`/`warn!`/`info!`/`debug!` macros; the backend formats
//! each record with a microsecond timestamp and a fixed-width level tag and
//! hands it to a dedicated writer thread over a bounded queue. A full queue
//! falls back to a synchronous write through the shared file so the hot
//! path never blocks. With a queue depth of zero every write is
//! synchronous.
//!
//! Log files are named `<dir>/YYYY_MM_DD<suffix>` and rotate on day change
//! or when the line count crosses `MAX_LINES`; overflow files get a `-<n>`
//! infix.

pub use log::{debug, error, info, warn, Level, LevelFilter};

use chrono::{DateTime, Datelike, Local, NaiveDate};
use queues::BlockQueue;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

/// Maximum lines per log file before rotating to a `-<n>` overflow file.
const MAX_LINES: usize = 50_000;

/// Numeric levels: 0 debug, 1 info, 2 warn, 3 error.
pub const LEVEL_DEBUG: usize = 0;
pub const LEVEL_INFO: usize = 1;
pub const LEVEL_WARN: usize = 2;
pub const LEVEL_ERROR: usize = 3;

/// Fixed-width (9 byte) tags keep the message column aligned.
fn level_tag(level: Level) -> &'static str {
    match level {
        Level::Error => "[error]: ",
        Level::Warn => "[warn] : ",
        Level::Info => "[info] : ",
        Level::Debug | Level::Trace => "[debug]: ",
    }
}

fn level_rank(level: Level) -> usize {
    match level {
        Level::Error => LEVEL_ERROR,
        Level::Warn => LEVEL_WARN,
        Level::Info => LEVEL_INFO,
        Level::Debug | Level::Trace => LEVEL_DEBUG,
    }
}

fn format_line(now: DateTime<Local>, level: Level, args: &std::fmt::Arguments) -> String {
    format!(
        "{} {}{}\n",
        now.format("%Y-%m-%d %H:%M:%S%.6f"),
        level_tag(level),
        args
    )
}

/// The open log file plus the rotation state that goes with it.
struct LogFile {
    dir: PathBuf,
    suffix: String,
    file: Option<BufWriter<File>>,
    date: NaiveDate,
    line_count: usize,
    max_lines: usize,
}

impl LogFile {
    fn open(dir: PathBuf, suffix: String) -> std::io::Result<Self> {
        let mut this = Self {
            dir,
            suffix,
            file: None,
            date: Local::now().date_naive(),
            line_count: 0,
            max_lines: MAX_LINES,
        };
        this.file = Some(this.open_file(None)?);
        Ok(this)
    }

    #[cfg(test)]
    fn with_max_lines(dir: PathBuf, suffix: String, max_lines: usize) -> std::io::Result<Self> {
        let mut this = Self::open(dir, suffix)?;
        this.max_lines = max_lines;
        Ok(this)
    }

    fn file_name(&self, overflow: Option<usize>) -> PathBuf {
        let tail = self.date.format("%Y_%m_%d");
        let name = match overflow {
            Some(n) => format!("{}-{}{}", tail, n, self.suffix),
            None => format!("{}{}", tail, self.suffix),
        };
        self.dir.join(name)
    }

    fn open_file(&self, overflow: Option<usize>) -> std::io::Result<BufWriter<File>> {
        let path = self.file_name(overflow);
        let open = |p: &PathBuf| OpenOptions::new().create(true).append(true).open(p);
        let file = match open(&path) {
            Ok(f) => f,
            Err(_) => {
                std::fs::create_dir_all(&self.dir)?;
                open(&path)?
            }
        };
        Ok(BufWriter::new(file))
    }

    /// Rotate if the day changed or the line count crossed the maximum,
    /// then append the line.
    fn write_line(&mut self, line: &str) -> std::io::Result<()> {
        let today = Local::now().date_naive();
        if today != self.date {
            self.flush()?;
            self.date = today;
            self.line_count = 0;
            self.file = Some(self.open_file(None)?);
        } else if self.line_count > 0 && self.line_count % self.max_lines == 0 {
            self.flush()?;
            self.file = Some(self.open_file(Some(self.line_count / self.max_lines))?);
        }
        self.line_count += 1;
        if let Some(file) = self.file.as_mut() {
            file.write_all(line.as_bytes())?;
        }
        Ok(())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        if let Some(file) = self.file.as_mut() {
            file.flush()?;
        }
        Ok(())
    }
}

struct Logger {
    level: Arc<AtomicUsize>,
    queue: Option<Arc<BlockQueue<String>>>,
    file: Arc<Mutex<LogFile>>,
}

impl log::Log for Logger {
    fn enabled(&self, metadata: &log::Metadata<'_>) -> bool {
        level_rank(metadata.level()) >= self.level.load(Ordering::Relaxed)
    }

    fn log(&self, record: &log::Record<'_>) {
        if !self.enabled(record.metadata()) {
            return;
        }

        let line = format_line(Local::now(), record.level(), record.args());

        match &self.queue {
            Some(queue) => {
                // a full queue degrades to a synchronous write rather than
                // blocking the caller; write failures are dropped
                if let Err(line) = queue.try_push_back(line) {
                    if let Ok(mut file) = self.file.lock() {
                        let _ = file.write_line(&line);
                    }
                }
            }
            None => {
                if let Ok(mut file) = self.file.lock() {
                    let _ = file.write_line(&line);
                    let _ = file.flush();
                }
            }
        }
    }

    fn flush(&self) {
        if let Some(queue) = &self.queue {
            queue.flush();
        }
        if let Ok(mut file) = self.file.lock() {
            let _ = file.flush();
        }
    }
}

/// Builder for the process-wide logger.
pub struct LogBuilder {
    level: usize,
    dir: PathBuf,
    suffix: String,
    queue_depth: usize,
}

impl Default for LogBuilder {
    fn default() -> Self {
        Self {
            level: LEVEL_INFO,
            dir: PathBuf::from("./log"),
            suffix: ".log".to_string(),
            queue_depth: 1024,
        }
    }
}

impl LogBuilder {
    pub fn new() -> Self {
        Default::default()
    }

    /// Numeric level: 0 debug, 1 info, 2 warn, 3 error. Records below the
    /// level are dropped.
    pub fn level(mut self, level: usize) -> Self {
        self.level = level.min(LEVEL_ERROR);
        self
    }

    pub fn dir<T: Into<PathBuf>>(mut self, dir: T) -> Self {
        self.dir = dir.into();
        self
    }

    pub fn suffix<T: Into<String>>(mut self, suffix: T) -> Self {
        self.suffix = suffix.into();
        self
    }

    /// Queue depth for the writer thread. Zero makes every write
    /// synchronous.
    pub fn queue_depth(mut self, depth: usize) -> Self {
        self.queue_depth = depth;
        self
    }

    /// Open the log file and assemble the logger. The file directory is
    /// created when missing.
    pub fn build(self) -> std::io::Result<AsyncLog> {
        let file = Arc::new(Mutex::new(LogFile::open(self.dir, self.suffix)?));
        let level = Arc::new(AtomicUsize::new(self.level));
        let queue = if self.queue_depth > 0 {
            Some(Arc::new(BlockQueue::new(self.queue_depth)))
        } else {
            None
        };

        Ok(AsyncLog { level, queue, file })
    }
}

/// A built but not yet registered logger.
pub struct AsyncLog {
    level: Arc<AtomicUsize>,
    queue: Option<Arc<BlockQueue<String>>>,
    file: Arc<Mutex<LogFile>>,
}

impl AsyncLog {
    /// Register as the global logger, spawn the writer thread when running
    /// asynchronously, and hand back the control handle.
    pub fn start(self) -> LogHandle {
        let logger = Logger {
            level: self.level.clone(),
            queue: self.queue.clone(),
            file: self.file.clone(),
        };

        log::set_boxed_logger(Box::new(logger)).expect("failed to register logger");
        log::set_max_level(LevelFilter::Trace);

        let writer = self.queue.as_ref().map(|queue| {
            let queue = queue.clone();
            let file = self.file.clone();
            std::thread::Builder::new()
                .name("petrel_log".to_string())
                .spawn(move || {
                    while let Some(line) = queue.pop() {
                        if let Ok(mut file) = file.lock() {
                            let _ = file.write_line(&line);
                            // opportunistic flush once the queue drains
                            if queue.is_empty() {
                                let _ = file.flush();
                            }
                        }
                    }
                })
                .expect("failed to spawn log writer")
        });

        LogHandle {
            level: self.level,
            queue: self.queue,
            file: self.file,
            writer,
        }
    }
}

/// Control handle for the running logger: flush, runtime level changes, and
/// orderly shutdown of the writer thread.
pub struct LogHandle {
    level: Arc<AtomicUsize>,
    queue: Option<Arc<BlockQueue<String>>>,
    file: Arc<Mutex<LogFile>>,
    writer: Option<JoinHandle<()>>,
}

impl LogHandle {
    pub fn flush(&self) {
        if let Some(queue) = &self.queue {
            queue.flush();
        }
        if let Ok(mut file) = self.file.lock() {
            let _ = file.flush();
        }
    }

    pub fn set_level(&self, level: usize) {
        self.level.store(level.min(LEVEL_ERROR), Ordering::Relaxed);
    }

    pub fn get_level(&self) -> usize {
        self.level.load(Ordering::Relaxed)
    }

    /// Drain pending records, stop the writer thread, and flush the file.
    pub fn shutdown(mut self) {
        if let Some(queue) = self.queue.take() {
            // give the writer a chance to drain before the queue closes
            for _ in 0..100 {
                if queue.is_empty() {
                    break;
                }
                std::thread::sleep(Duration::from_millis(1));
            }
            queue.close();
        }
        if let Some(writer) = self.writer.take() {
            let _ = writer.join();
        }
        if let Ok(mut file) = self.file.lock() {
            let _ = file.flush();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_are_fixed_width() {
        for level in [Level::Error, Level::Warn, Level::Info, Level::Debug] {
            assert_eq!(level_tag(level).len(), 9);
        }
    }

    #[test]
    fn line_format() {
        let now = Local::now();
        let line = format_line(now, Level::Info, &format_args!("hello {}", 42));
        assert!(line.ends_with("[info] : hello 42\n"));
        // timestamp carries microsecond precision: YYYY-MM-DD HH:MM:SS.ffffff
        assert_eq!(line.split(' ').next().unwrap().len(), 10);
        assert_eq!(line.split(' ').nth(1).unwrap().len(), 15);
    }

    #[test]
    fn level_ranks() {
        assert_eq!(level_rank(Level::Debug), LEVEL_DEBUG);
        assert_eq!(level_rank(Level::Trace), LEVEL_DEBUG);
        assert_eq!(level_rank(Level::Error), LEVEL_ERROR);
    }

    #[test]
    fn file_naming() {
        let dir = tempfile::tempdir().unwrap();
        let mut file = LogFile::open(dir.path().to_path_buf(), ".log".to_string()).unwrap();
        file.write_line("one\n").unwrap();
        file.flush().unwrap();

        let expected = dir
            .path()
            .join(format!("{}{}", Local::now().format("%Y_%m_%d"), ".log"));
        let content = std::fs::read_to_string(expected).unwrap();
        assert_eq!(content, "one\n");
    }

    #[test]
    fn line_count_rotation() {
        let dir = tempfile::tempdir().unwrap();
        let mut file =
            LogFile::with_max_lines(dir.path().to_path_buf(), ".log".to_string(), 2).unwrap();
        for i in 0..5 {
            file.write_line(&format!("line {}\n", i)).unwrap();
        }
        file.flush().unwrap();

        let tail = Local::now().format("%Y_%m_%d");
        let base = std::fs::read_to_string(dir.path().join(format!("{}.log", tail))).unwrap();
        let first = std::fs::read_to_string(dir.path().join(format!("{}-1.log", tail))).unwrap();
        let second = std::fs::read_to_string(dir.path().join(format!("{}-2.log", tail))).unwrap();
        assert_eq!(base, "line 0\nline 1\n");
        assert_eq!(first, "line 2\nline 3\n");
        assert_eq!(second, "line 4\n");
    }

    #[test]
    fn creates_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("log");
        let mut file = LogFile::open(nested.clone(), ".log".to_string()).unwrap();
        file.write_line("x\n").unwrap();
        file.flush().unwrap();
        assert!(nested.exists());
    }
}
