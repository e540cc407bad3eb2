// SPDX-License-Identifier: Apache-2.0

//! Native file system watcher using the `notify` crate.
//!
//! The parent directory of each target is watched (non-recursively) so that
//! creation, rename and removal of the target itself are observed. Events for
//! sibling files are filtered out.

use std::collections::HashSet;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{Receiver, RecvTimeoutError, TryRecvError, channel};
use std::time::Duration;

use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};

use super::traits::{FileWatcher, WatcherError};

pub struct NativeWatcher {
    watcher: RecommendedWatcher,
    receiver: Receiver<Result<Event, notify::Error>>,
    watched_dirs: HashSet<PathBuf>,
    file_names: HashSet<OsString>,
}

impl NativeWatcher {
    pub fn new(debounce: Duration) -> Result<Self, WatcherError> {
        let (tx, rx) = channel();

        let config = Config::default().with_poll_interval(debounce);

        let watcher = RecommendedWatcher::new(
            move |res| {
                let _ = tx.send(res);
            },
            config,
        )
        .map_err(|e| WatcherError::Init(e.to_string()))?;

        Ok(Self {
            watcher,
            receiver: rx,
            watched_dirs: HashSet::new(),
            file_names: HashSet::new(),
        })
    }

    /// True when the event touches a watched target. Access events never
    /// count.
    fn is_target_event(&self, event: &Event) -> bool {
        if matches!(event.kind, EventKind::Access(_)) {
            return false;
        }
        event.paths.iter().any(|p| {
            p.file_name()
                .map(|n| self.file_names.contains(n))
                .unwrap_or(false)
        })
    }

    fn count_result(&self, res: Result<Event, notify::Error>) -> usize {
        match res {
            Ok(event) => usize::from(self.is_target_event(&event)),
            Err(e) => {
                tracing::warn!("File watcher error: {}", e);
                0
            }
        }
    }

    /// Count everything already queued without blocking.
    fn drain_queued(&mut self) -> Result<usize, WatcherError> {
        let mut changes = 0;
        loop {
            match self.receiver.try_recv() {
                Ok(res) => changes += self.count_result(res),
                Err(TryRecvError::Empty) => return Ok(changes),
                Err(TryRecvError::Disconnected) => {
                    return Err(WatcherError::Channel("watcher channel disconnected".into()));
                }
            }
        }
    }
}

impl FileWatcher for NativeWatcher {
    fn watch(&mut self, path: &Path) -> Result<(), WatcherError> {
        let name = path
            .file_name()
            .ok_or_else(|| WatcherError::Watch(format!("{:?} has no file name", path)))?;
        let dir = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };

        if !self.watched_dirs.contains(&dir) {
            self.watcher
                .watch(&dir, RecursiveMode::NonRecursive)
                .map_err(|e| WatcherError::Watch(e.to_string()))?;
            self.watched_dirs.insert(dir);
        }
        self.file_names.insert(name.to_os_string());
        Ok(())
    }

    fn recv_timeout(&mut self, timeout: Duration) -> Result<usize, WatcherError> {
        let first = match self.receiver.recv_timeout(timeout) {
            Ok(res) => self.count_result(res),
            Err(RecvTimeoutError::Timeout) => return Ok(0),
            Err(RecvTimeoutError::Disconnected) => {
                return Err(WatcherError::Channel("watcher channel disconnected".into()));
            }
        };

        Ok(first + self.drain_queued()?)
    }

    fn is_native(&self) -> bool {
        true
    }

    fn backend_name(&self) -> &'static str {
        #[cfg(target_os = "linux")]
        {
            "inotify"
        }
        #[cfg(target_os = "macos")]
        {
            "FSEvents"
        }
        #[cfg(target_os = "windows")]
        {
            "ReadDirectoryChangesW"
        }
        #[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "windows")))]
        {
            "native"
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::{self, File};
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn test_native_watcher_create() {
        assert!(NativeWatcher::new(Duration::from_millis(100)).is_ok());
    }

    #[test]
    fn test_native_watcher_detects_target_append() {
        let temp_dir = TempDir::new().unwrap();
        let file_path = temp_dir.path().join("log");
        File::create(&file_path).unwrap();

        let mut watcher = NativeWatcher::new(Duration::from_millis(50)).unwrap();
        watcher.watch(&file_path).unwrap();
        std::thread::sleep(Duration::from_millis(100));
        let _ = watcher.drain_queued();

        let mut file = fs::OpenOptions::new()
            .append(true)
            .open(&file_path)
            .unwrap();
        file.write_all(b"more content\n").unwrap();
        file.flush().unwrap();
        drop(file);

        let changes = watcher.recv_timeout(Duration::from_secs(2)).unwrap();
        assert!(changes > 0, "Should detect append to the target");
    }

    #[test]
    fn test_native_watcher_ignores_siblings() {
        let temp_dir = TempDir::new().unwrap();
        let file_path = temp_dir.path().join("log");

        let mut watcher = NativeWatcher::new(Duration::from_millis(50)).unwrap();
        watcher.watch(&file_path).unwrap();

        File::create(temp_dir.path().join("other.txt")).unwrap();
        let changes = watcher.recv_timeout(Duration::from_millis(300)).unwrap();
        assert_eq!(changes, 0, "sibling events should be filtered");
    }

    #[test]
    fn test_native_watcher_is_native() {
        let watcher = NativeWatcher::new(Duration::from_millis(100)).unwrap();
        assert!(watcher.is_native());
        #[cfg(target_os = "linux")]
        assert_eq!(watcher.backend_name(), "inotify");
    }
}
