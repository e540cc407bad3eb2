// SPDX-License-Identifier: Apache-2.0

//! Polling-based file watcher as a fallback for systems where native
//! file system notifications are unavailable or unreliable (e.g., NFS).

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime};

use super::traits::{FileWatcher, WatcherError};
use crate::follower::FileId;

/// Snapshot of a watched path used for change detection
#[derive(Debug, Clone, PartialEq, Eq)]
struct FileState {
    modified: Option<SystemTime>,
    size: u64,
    id: Option<FileId>,
}

impl FileState {
    fn stat(path: &Path) -> Option<Self> {
        let metadata = fs::metadata(path).ok().filter(|m| m.is_file())?;
        Some(Self {
            modified: metadata.modified().ok(),
            size: metadata.len(),
            id: FileId::from_metadata(&metadata).ok(),
        })
    }
}

/// Polling-based file watcher.
///
/// Periodically stats each watched path. Appearing, disappearing, or any
/// change in size, mtime or identity counts as one change.
pub struct PollWatcher {
    /// Last observed state per path, `None` while the path does not exist
    states: HashMap<PathBuf, Option<FileState>>,
    poll_interval: Duration,
    last_poll: Instant,
    pending_changes: usize,
}

impl PollWatcher {
    pub fn new(poll_interval: Duration) -> Self {
        Self {
            states: HashMap::new(),
            poll_interval,
            last_poll: Instant::now(),
            pending_changes: 0,
        }
    }

    fn scan_all(&mut self) {
        for (path, state) in self.states.iter_mut() {
            let current = FileState::stat(path);
            if *state != current {
                self.pending_changes += 1;
            }
            *state = current;
        }
        self.last_poll = Instant::now();
    }

    fn poll_if_needed(&mut self) {
        if self.last_poll.elapsed() >= self.poll_interval {
            self.scan_all();
        }
    }
}

impl FileWatcher for PollWatcher {
    fn watch(&mut self, path: &Path) -> Result<(), WatcherError> {
        self.states
            .insert(path.to_path_buf(), FileState::stat(path));
        Ok(())
    }

    fn recv_timeout(&mut self, timeout: Duration) -> Result<usize, WatcherError> {
        let deadline = Instant::now() + timeout;

        loop {
            self.poll_if_needed();

            if self.pending_changes > 0 {
                return Ok(std::mem::take(&mut self.pending_changes));
            }

            if Instant::now() >= deadline {
                return Ok(0);
            }

            // Sleep until next poll or timeout, whichever is sooner
            let time_to_next_poll = self.poll_interval.saturating_sub(self.last_poll.elapsed());
            let time_to_deadline = deadline.saturating_duration_since(Instant::now());
            let sleep_duration = time_to_next_poll.min(time_to_deadline);

            if !sleep_duration.is_zero() {
                std::thread::sleep(sleep_duration);
            }
        }
    }

    fn is_native(&self) -> bool {
        false
    }

    fn backend_name(&self) -> &'static str {
        "poll"
    }
}
