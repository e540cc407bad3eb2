// SPDX-License-Identifier: Apache-2.0

//! Traits and types for file system watchers.

use std::path::Path;
use std::time::Duration;

use thiserror::Error;

/// Error type for watcher operations
#[derive(Debug, Error)]
pub enum WatcherError {
    #[error("watcher initialization failed: {0}")]
    Init(String),

    #[error("watch failed: {0}")]
    Watch(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("channel error: {0}")]
    Channel(String),
}

/// Wake-up source for the line follower.
///
/// Notifications are only hints that the target may have changed. The
/// follower re-reads file metadata itself, so spurious wake-ups are harmless.
pub trait FileWatcher {
    /// Start watching a file. The file does not need to exist yet.
    fn watch(&mut self, path: &Path) -> Result<(), WatcherError>;

    /// Block until the target changes or the timeout expires. Returns the
    /// number of change notifications seen, 0 on timeout.
    fn recv_timeout(&mut self, timeout: Duration) -> Result<usize, WatcherError>;

    /// True for inotify/kqueue/FSEvents watchers, false for poll watchers.
    fn is_native(&self) -> bool;

    /// Name of the watcher backend for logging.
    fn backend_name(&self) -> &'static str;
}
