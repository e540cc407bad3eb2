// SPDX-License-Identifier: Apache-2.0

use serde::Deserialize;

use crate::follower::{FollowerConfig, default_channel_capacity};

pub const DEFAULT_PIPELINE_NAME: &str = "p4dtail";

/// Configuration for the tail-parse-publish pipeline
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    /// Value of the `type` field on every published record
    #[serde(default = "default_name")]
    pub name: String,

    pub follower: FollowerConfig,

    /// Capacity of the parser's input and output channels
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

fn default_name() -> String {
    DEFAULT_PIPELINE_NAME.to_string()
}

impl PipelineConfig {
    pub fn new(follower: FollowerConfig) -> Self {
        Self {
            name: default_name(),
            follower,
            channel_capacity: default_channel_capacity(),
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.name.is_empty() {
            return Err("name cannot be empty".to_string());
        }

        if self.channel_capacity == 0 {
            return Err("channel_capacity must be positive".to_string());
        }

        self.follower.validate()
    }
}
