// SPDX-License-Identifier: Apache-2.0

use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use portable_atomic::{AtomicBool, AtomicU64, Ordering};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::config::FollowerConfig;
use super::reader::{Line, LineReader};
use super::watcher::{FileWatcher, PollWatcher, WatchMode, create_watcher};
use super::FileId;
use crate::bounded_channel::{BoundedReceiver, BoundedSender, SendTimeout, bounded};
use crate::error::{Error, Result};

/// How long a blocked send waits before re-checking for stop
const SEND_RETRY: Duration = Duration::from_millis(100);

/// Lines read per pass before re-checking for stop and rotation
const READ_BATCH: usize = 1024;

/// How long watcher errors are tolerated before switching to polling
const MAX_WATCHER_ERROR_DURATION: Duration = Duration::from_secs(10);

/// Follows a single growing file and emits its lines in order.
pub struct LineFollower;

impl LineFollower {
    /// Start following `config.path` from `start_offset`.
    ///
    /// A missing target is not an error, the follower waits for it to appear.
    /// Any other failure to open it is returned here.
    pub fn open(config: FollowerConfig, start_offset: u64) -> Result<FollowerHandle> {
        config.validate().map_err(Error::Config)?;

        let reader = match open_target(&config.path)? {
            Some(file) => Some(position_reader(file, start_offset, config.max_line_size)?),
            None => {
                info!(path = ?config.path, "Waiting for log file to appear");
                None
            }
        };

        let watcher = start_watcher(&config)?;
        let (tx, rx) = bounded(config.channel_capacity);
        let cancel = CancellationToken::new();
        let failed = Arc::new(AtomicBool::new(false));
        let file_id = reader.as_ref().and_then(|r| r.file_id());
        let opened_at = reader.as_ref().map(|r| r.offset()).unwrap_or(0);
        let offset = Arc::new(AtomicU64::new(opened_at));

        let worker = FollowWorker {
            path: config.path.clone(),
            reader,
            pending_start: start_offset,
            watcher,
            watcher_first_error: None,
            tx,
            cancel: cancel.clone(),
            offset: offset.clone(),
            failed: failed.clone(),
            poll_interval: config.poll_interval(),
            max_line_size: config.max_line_size,
        };

        let thread = std::thread::Builder::new()
            .name("p4dtail-follower".to_string())
            .spawn(move || worker.run())?;

        Ok(FollowerHandle {
            lines: Some(rx),
            opened_at,
            file_id,
            offset,
            failed,
            cancel,
            thread: Some(thread),
        })
    }
}

/// Handle to a running follower thread.
pub struct FollowerHandle {
    lines: Option<BoundedReceiver<Line>>,
    opened_at: u64,
    file_id: Option<FileId>,
    offset: Arc<AtomicU64>,
    failed: Arc<AtomicBool>,
    cancel: CancellationToken,
    thread: Option<JoinHandle<()>>,
}

impl FollowerHandle {
    /// Take the line receiver. Returns `None` after the first call.
    pub fn lines(&mut self) -> Option<BoundedReceiver<Line>> {
        self.lines.take()
    }

    /// Position the first line is read from, `0` when the target did not
    /// exist yet. Differs from the requested start offset when that was past
    /// the end of the file.
    pub fn opened_at(&self) -> u64 {
        self.opened_at
    }

    /// Identity of the file opened at start, `None` when the target did not
    /// exist yet.
    pub fn file_id(&self) -> Option<FileId> {
        self.file_id
    }

    /// End offset of the last line handed to the channel
    pub fn current_offset(&self) -> u64 {
        self.offset.load(Ordering::Acquire)
    }

    /// True when the follower ended because of a read error
    pub fn failed(&self) -> bool {
        self.failed.load(Ordering::Acquire)
    }

    /// Signal the follower thread and wait for it to exit. Safe to call more
    /// than once.
    pub fn stop(&mut self) {
        self.cancel.cancel();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!("Follower thread panicked");
            }
        }
    }
}

impl Drop for FollowerHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

enum Step {
    /// More work may be available right away
    Continue,
    /// Nothing to do until the file changes
    Idle,
    /// Stop requested or the consumer went away
    Closed,
}

struct FollowWorker {
    path: PathBuf,
    reader: Option<LineReader>,
    /// Offset to use the next time the target is opened
    pending_start: u64,
    watcher: Box<dyn FileWatcher + Send>,
    watcher_first_error: Option<Instant>,
    tx: BoundedSender<Line>,
    cancel: CancellationToken,
    offset: Arc<AtomicU64>,
    failed: Arc<AtomicBool>,
    poll_interval: Duration,
    max_line_size: usize,
}

impl FollowWorker {
    fn run(mut self) {
        info!(
            path = ?self.path,
            backend = self.watcher.backend_name(),
            "Following log file"
        );

        while !self.cancel.is_cancelled() {
            match self.step() {
                Ok(Step::Continue) => {}
                Ok(Step::Idle) => self.wait(),
                Ok(Step::Closed) => break,
                Err(e) => {
                    error!(path = ?self.path, error = %e, "Failed reading log file, stopping follower");
                    self.failed.store(true, Ordering::Release);
                    break;
                }
            }
        }

        debug!(offset = self.offset.load(Ordering::Acquire), "Follower exited");
    }

    fn step(&mut self) -> Result<Step> {
        let Some(reader) = self.reader.as_mut() else {
            return self.try_open();
        };

        let mut at_eof = false;
        for _ in 0..READ_BATCH {
            match reader.read_line()? {
                Some(line) => {
                    if !send_line(&self.tx, &self.cancel, &self.offset, line) {
                        return Ok(Step::Closed);
                    }
                }
                None => {
                    at_eof = true;
                    break;
                }
            }
        }

        if !at_eof || self.check_rotation()? {
            Ok(Step::Continue)
        } else {
            Ok(Step::Idle)
        }
    }

    fn try_open(&mut self) -> Result<Step> {
        match open_target(&self.path)? {
            Some(file) => {
                let start = std::mem::take(&mut self.pending_start);
                let reader = position_reader(file, start, self.max_line_size)?;
                info!(path = ?self.path, offset = reader.offset(), "Opened log file");
                self.reader = Some(reader);
                Ok(Step::Continue)
            }
            None => Ok(Step::Idle),
        }
    }

    /// Called at EOF. Returns true when the reader was reset or replaced.
    fn check_rotation(&mut self) -> Result<bool> {
        let Some(reader) = self.reader.as_mut() else {
            return Ok(false);
        };

        match FileId::from_path(&self.path) {
            Ok(current) if reader.file_id().is_some_and(|id| id != current) => {
                // the writer may have appended to the old file after our EOF read
                while let Some(line) = reader.read_line()? {
                    if !send_line(&self.tx, &self.cancel, &self.offset, line) {
                        return Ok(true);
                    }
                }
                if reader.pending_bytes() > 0 {
                    warn!(
                        bytes = reader.pending_bytes(),
                        "Dropping unterminated last line of rotated log file"
                    );
                }
                info!(path = ?self.path, "Log file rotated, reopening from the start");
                self.reader = None;
                self.pending_start = 0;
                return Ok(true);
            }
            Ok(_) => {}
            // path removed, keep reading the old handle until a new file shows up
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(e.into()),
        }

        let len = reader.file_len()?;
        if len < reader.consumed() {
            info!(
                path = ?self.path,
                offset = reader.consumed(),
                file_size = len,
                "Log file truncated, restarting from the beginning"
            );
            reader.reset_to(0)?;
            return Ok(true);
        }

        Ok(false)
    }

    fn wait(&mut self) {
        match self.watcher.recv_timeout(self.poll_interval) {
            Ok(_) => {
                if self.watcher_first_error.take().is_some() {
                    debug!("Watcher recovered after previous errors");
                }
            }
            Err(e) => {
                let first_error = *self.watcher_first_error.get_or_insert_with(Instant::now);
                if first_error.elapsed() >= MAX_WATCHER_ERROR_DURATION {
                    warn!(error = %e, "Watcher errors persisted, falling back to polling mode");
                    let mut poll = PollWatcher::new(self.poll_interval);
                    if poll.watch(&self.path).is_ok() {
                        self.watcher = Box::new(poll);
                        self.watcher_first_error = None;
                    }
                } else {
                    warn!(error = %e, "Watcher error");
                }
                std::thread::sleep(self.poll_interval.min(SEND_RETRY));
            }
        }
    }
}

/// Open the target, `Ok(None)` when it does not exist yet.
fn open_target(path: &Path) -> Result<Option<File>> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    if file.metadata()?.is_dir() {
        return Err(Error::Io(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("{:?} is a directory", path),
        )));
    }

    Ok(Some(file))
}

fn position_reader(file: File, start_offset: u64, max_line_size: usize) -> Result<LineReader> {
    let len = file.metadata()?.len();
    let offset = if start_offset > len {
        warn!(
            offset = start_offset,
            file_size = len,
            "Start offset is past the end of the file, reading from the start"
        );
        0
    } else {
        start_offset
    };
    Ok(LineReader::new(file, offset, max_line_size)?)
}

fn start_watcher(config: &FollowerConfig) -> Result<Box<dyn FileWatcher + Send>> {
    let mut watcher = create_watcher(&config.watcher_config())?;
    match watcher.watch(&config.path) {
        Ok(()) => Ok(watcher),
        Err(e) if config.watch_mode == WatchMode::Auto && watcher.is_native() => {
            warn!(error = %e, "Native watch failed, falling back to polling");
            let mut poll = PollWatcher::new(config.poll_interval());
            poll.watch(&config.path)?;
            Ok(Box::new(poll))
        }
        Err(e) => Err(e.into()),
    }
}

/// Hand a line to the consumer, blocking while the channel is full.
/// Returns false when the follower should exit.
fn send_line(
    tx: &BoundedSender<Line>,
    cancel: &CancellationToken,
    offset: &AtomicU64,
    line: Line,
) -> bool {
    let end_offset = line.end_offset;
    let mut item = line;
    loop {
        match tx.send_timeout(item, SEND_RETRY) {
            Ok(()) => {
                offset.store(end_offset, Ordering::Release);
                return true;
            }
            Err(SendTimeout::Full(returned)) => {
                if cancel.is_cancelled() {
                    return false;
                }
                item = returned;
            }
            Err(SendTimeout::Disconnected) => {
                debug!("Line receiver dropped, stopping follower");
                return false;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bounded_channel::TryRecv;
    use std::io::Write;

    fn config(path: &Path) -> FollowerConfig {
        let mut config = FollowerConfig::new(path);
        config.watch_mode = WatchMode::Poll;
        config.poll_interval_ms = 20;
        config.channel_capacity = 4;
        config
    }

    fn recv_within(rx: &BoundedReceiver<Line>, timeout: Duration) -> Option<Line> {
        let deadline = Instant::now() + timeout;
        loop {
            match rx.poll_now() {
                TryRecv::Item(line) => return Some(line),
                TryRecv::Closed => return None,
                TryRecv::Empty if Instant::now() >= deadline => return None,
                TryRecv::Empty => std::thread::sleep(Duration::from_millis(5)),
            }
        }
    }

    fn next_text(rx: &BoundedReceiver<Line>) -> String {
        recv_within(rx, Duration::from_secs(5))
            .expect("expected a line")
            .text
    }

    fn append(path: &Path, content: &str) {
        let mut file = std::fs::OpenOptions::new()
            .append(true)
            .create(true)
            .open(path)
            .unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file.flush().unwrap();
    }

    #[test]
    fn test_follows_existing_and_appended_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log");
        append(&path, "line1\nline2\n");

        let mut handle = LineFollower::open(config(&path), 0).unwrap();
        let rx = handle.lines().unwrap();
        assert!(handle.lines().is_none());

        assert_eq!(next_text(&rx), "line1");
        assert_eq!(next_text(&rx), "line2");

        append(&path, "line3\n");
        assert_eq!(next_text(&rx), "line3");
        let deadline = Instant::now() + Duration::from_secs(1);
        while handle.current_offset() != 18 && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(handle.current_offset(), 18);

        handle.stop();
        handle.stop();
        assert!(!handle.failed());
    }

    #[test]
    fn test_starts_at_offset() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log");
        append(&path, "line1\nline2\n");

        let mut handle = LineFollower::open(config(&path), 6).unwrap();
        #[cfg(unix)]
        assert_eq!(handle.file_id(), Some(FileId::from_path(&path).unwrap()));
        assert_eq!(handle.opened_at(), 6);
        let rx = handle.lines().unwrap();
        assert_eq!(next_text(&rx), "line2");
    }

    #[test]
    fn test_waits_for_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log");

        let mut handle = LineFollower::open(config(&path), 0).unwrap();
        assert_eq!(handle.file_id(), None);
        let rx = handle.lines().unwrap();
        assert!(recv_within(&rx, Duration::from_millis(100)).is_none());

        append(&path, "hello\n");
        assert_eq!(next_text(&rx), "hello");
    }

    #[test]
    fn test_directory_target_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        assert!(LineFollower::open(config(dir.path()), 0).is_err());
    }

    #[test]
    fn test_truncation_restarts_from_beginning() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log");
        append(&path, "a long first line\n");

        let mut handle = LineFollower::open(config(&path), 0).unwrap();
        let rx = handle.lines().unwrap();
        assert_eq!(next_text(&rx), "a long first line");

        // truncate in place, same inode
        let file = std::fs::OpenOptions::new().write(true).open(&path).unwrap();
        file.set_len(0).unwrap();
        drop(file);
        append(&path, "new\n");

        assert_eq!(next_text(&rx), "new");
    }

    #[cfg(unix)]
    #[test]
    fn test_rotation_reopens_new_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log");
        append(&path, "old1\n");

        let mut handle = LineFollower::open(config(&path), 0).unwrap();
        let rx = handle.lines().unwrap();
        assert_eq!(next_text(&rx), "old1");

        std::fs::rename(&path, dir.path().join("log.1")).unwrap();
        append(&path, "new1\nnew2\n");

        assert_eq!(next_text(&rx), "new1");
        assert_eq!(next_text(&rx), "new2");
    }

    #[test]
    fn test_stop_while_channel_full() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log");
        let content: String = (0..50).map(|i| format!("line{}\n", i)).collect();
        append(&path, &content);

        let mut handle = LineFollower::open(config(&path), 0).unwrap();
        let rx = handle.lines().unwrap();
        // let the follower fill the channel and block
        std::thread::sleep(Duration::from_millis(100));

        // must not hang with a blocked sender
        handle.stop();
        assert_eq!(next_text(&rx), "line0");
    }

    #[test]
    fn test_receiver_drop_ends_follower() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log");
        append(&path, "x\n");

        let mut handle = LineFollower::open(config(&path), 0).unwrap();
        drop(handle.lines());
        std::thread::sleep(Duration::from_millis(100));
        handle.stop();
        assert!(!handle.failed());
    }
}
