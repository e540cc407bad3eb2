// SPDX-License-Identifier: Apache-2.0

use clap::{Args, ValueEnum};
use figment::Figment;
use figment::providers::{Format, Serialized, Toml};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::follower::FollowerConfig;
use crate::follower::watcher::WatchMode;
use crate::pipeline::PipelineConfig;

/// What the agent does once started
#[derive(Copy, Clone, Debug, Default, ValueEnum, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    /// Follow the log file and publish parsed records
    #[default]
    Tail,
    /// Publish a counter record every period
    Tick,
}

/// Where published records go
#[derive(Copy, Clone, Debug, Default, ValueEnum, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PublisherKind {
    /// One JSON object per line on stdout or in `--output`
    #[default]
    #[value(name = "json_lines")]
    JsonLines,
    /// Discard all records
    Blackhole,
}

#[derive(Debug, Args, Clone, Serialize, Deserialize)]
pub struct AgentRun {
    /// TOML file whose values override the command line
    #[arg(long, env = "P4DTAIL_CONFIG")]
    #[serde(skip)]
    pub config: Option<PathBuf>,

    /// Run mode
    #[arg(value_enum, long, env = "P4DTAIL_MODE", default_value = "tail")]
    #[serde(default)]
    pub mode: RunMode,

    /// p4d server log to follow
    #[arg(long, env = "P4DTAIL_PATH", default_value = "/p4/1/logs/log")]
    pub path: PathBuf,

    /// Checkpoint file
    #[arg(long, env = "P4DTAIL_STATE_PATH", default_value = "./p4dtail.state.json")]
    pub state_path: PathBuf,

    /// Keep the checkpoint in memory only
    #[arg(long, env = "P4DTAIL_NO_CHECKPOINT", default_value = "false")]
    #[serde(default)]
    pub no_checkpoint: bool,

    /// Value of the `type` field on every record
    #[arg(long, env = "P4DTAIL_NAME", default_value = "p4dtail")]
    pub name: String,

    /// Tick period in seconds (tick mode)
    #[arg(long, env = "P4DTAIL_PERIOD", default_value = "1")]
    pub period: u64,

    /// File watching strategy
    #[arg(value_enum, long, env = "P4DTAIL_WATCH_MODE", default_value = "auto")]
    #[serde(default)]
    pub watch_mode: WatchMode,

    /// Longest wait for new data before re-checking the file, in milliseconds
    #[arg(long, env = "P4DTAIL_POLL_INTERVAL_MS", default_value = "250")]
    pub poll_interval_ms: u64,

    /// Lines longer than this many bytes are cut
    #[arg(long, env = "P4DTAIL_MAX_LINE_SIZE", default_value = "1048576")]
    pub max_line_size: usize,

    /// Capacity of the line, command and event channels
    #[arg(long, env = "P4DTAIL_CHANNEL_CAPACITY", default_value = "256")]
    pub channel_capacity: usize,

    /// Publisher
    #[arg(value_enum, long, env = "P4DTAIL_PUBLISHER", default_value = "json_lines")]
    #[serde(default)]
    pub publisher: PublisherKind,

    /// Output file for the json_lines publisher, stdout when unset
    #[arg(long, env = "P4DTAIL_OUTPUT")]
    pub output: Option<PathBuf>,
}

impl AgentRun {
    /// Merge the optional config file over the command line values.
    pub fn resolve(self) -> Result<AgentRun> {
        let Some(path) = self.config.clone() else {
            return Ok(self);
        };
        if !path.exists() {
            return Err(Error::FileNotFound(path));
        }

        let mut resolved: AgentRun = Figment::from(Serialized::defaults(&self))
            .merge(Toml::file(&path))
            .extract()
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        resolved.config = Some(path);
        Ok(resolved)
    }

    pub fn period(&self) -> Duration {
        Duration::from_secs(self.period)
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        let follower = FollowerConfig {
            path: self.path.clone(),
            watch_mode: self.watch_mode,
            poll_interval_ms: self.poll_interval_ms,
            max_line_size: self.max_line_size,
            channel_capacity: self.channel_capacity,
        };
        PipelineConfig {
            name: self.name.clone(),
            follower,
            channel_capacity: self.channel_capacity,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.mode == RunMode::Tick && self.period == 0 {
            return Err(Error::Config("period must be positive".to_string()));
        }
        if self.mode == RunMode::Tail && !self.no_checkpoint && self.state_path.as_os_str().is_empty()
        {
            return Err(Error::Config("state_path cannot be empty".to_string()));
        }
        self.pipeline_config().validate().map_err(Error::Config)
    }
}
