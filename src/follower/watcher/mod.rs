// SPDX-License-Identifier: Apache-2.0

//! Change notification for the followed file.
//!
//! - **Native watching** uses OS-level notifications (inotify on Linux,
//!   FSEvents on macOS) for immediate wake-ups.
//! - **Poll watching** stats the target periodically, for NFS mounts and
//!   other places where native events are not delivered.
//!
//! `auto` tries native first and falls back to polling.

mod native;
mod poll;
mod traits;

pub use native::NativeWatcher;
pub use poll::PollWatcher;
pub use traits::{FileWatcher, WatcherError};

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Watch mode configuration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum WatchMode {
    /// Try native watching, fall back to polling on failure
    #[default]
    Auto,
    /// Force native file system watching
    Native,
    /// Force polling, for network file systems
    Poll,
}

/// Configuration for the file watcher
#[derive(Debug, Clone)]
pub struct WatcherConfig {
    pub mode: WatchMode,
    /// Stat interval in poll mode
    pub poll_interval: Duration,
    /// Passed to the native backend for batching rapid changes
    pub debounce_interval: Duration,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            mode: WatchMode::Auto,
            poll_interval: Duration::from_millis(250),
            debounce_interval: Duration::from_millis(100),
        }
    }
}

/// Create a watcher based on the configuration.
pub fn create_watcher(
    config: &WatcherConfig,
) -> Result<Box<dyn FileWatcher + Send>, WatcherError> {
    match config.mode {
        WatchMode::Native => Ok(Box::new(NativeWatcher::new(config.debounce_interval)?)),
        WatchMode::Poll => Ok(Box::new(PollWatcher::new(config.poll_interval))),
        WatchMode::Auto => match NativeWatcher::new(config.debounce_interval) {
            Ok(watcher) => Ok(Box::new(watcher)),
            Err(e) => {
                tracing::warn!(
                    "Native file watching unavailable ({}), falling back to polling",
                    e
                );
                Ok(Box::new(PollWatcher::new(config.poll_interval)))
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_watch_mode_names() {
        use clap::ValueEnum;

        assert_eq!(WatchMode::from_str("native", false), Ok(WatchMode::Native));
        assert!(WatchMode::from_str("inotify", false).is_err());

        let mode: WatchMode = serde_json::from_str("\"poll\"").unwrap();
        assert_eq!(mode, WatchMode::Poll);
        assert_eq!(serde_json::to_string(&WatchMode::Auto).unwrap(), "\"auto\"");
    }

    #[test]
    fn test_create_poll_watcher() {
        let config = WatcherConfig {
            mode: WatchMode::Poll,
            poll_interval: Duration::from_millis(250),
            debounce_interval: Duration::from_millis(100),
        };
        let watcher = create_watcher(&config).unwrap();
        assert!(!watcher.is_native());
    }
}
