// SPDX-License-Identifier: Apache-2.0

use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use super::watcher::{WatchMode, WatcherConfig};

/// Configuration for the line follower
#[derive(Debug, Clone, Deserialize)]
pub struct FollowerConfig {
    /// Log file to follow
    pub path: PathBuf,

    #[serde(default)]
    pub watch_mode: WatchMode,

    /// Upper bound on each wait for new data (in milliseconds)
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Maximum size of a single emitted line (in bytes)
    #[serde(default = "default_max_line_size")]
    pub max_line_size: usize,

    /// Capacity of the line channel
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

fn default_poll_interval_ms() -> u64 {
    250
}

fn default_max_line_size() -> usize {
    1024 * 1024 // 1MB
}

pub(crate) fn default_channel_capacity() -> usize {
    256
}

impl FollowerConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            watch_mode: WatchMode::default(),
            poll_interval_ms: default_poll_interval_ms(),
            max_line_size: default_max_line_size(),
            channel_capacity: default_channel_capacity(),
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn watcher_config(&self) -> WatcherConfig {
        WatcherConfig {
            mode: self.watch_mode,
            poll_interval: self.poll_interval(),
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.path.as_os_str().is_empty() {
            return Err("source path cannot be empty".to_string());
        }

        if self.poll_interval_ms == 0 {
            return Err("poll_interval must be positive".to_string());
        }

        if self.max_line_size == 0 {
            return Err("max_line_size must be positive".to_string());
        }

        if self.channel_capacity == 0 {
            return Err("channel_capacity must be positive".to_string());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = FollowerConfig::new("/p4/1/logs/log");
        assert_eq!(config.poll_interval(), Duration::from_millis(250));
        assert_eq!(config.max_line_size, 1024 * 1024);
        assert_eq!(config.channel_capacity, 256);
        assert_eq!(config.watch_mode, WatchMode::Auto);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        assert!(FollowerConfig::new("").validate().is_err());

        let mut config = FollowerConfig::new("log");
        config.poll_interval_ms = 0;
        assert!(config.validate().is_err());

        let mut config = FollowerConfig::new("log");
        config.channel_capacity = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_deserialize_with_defaults() {
        let config: FollowerConfig =
            serde_json::from_str(r#"{"path": "/p4/1/logs/log", "watch_mode": "poll"}"#).unwrap();
        assert_eq!(config.watch_mode, WatchMode::Poll);
        assert_eq!(config.max_line_size, 1024 * 1024);
    }
}
