// SPDX-License-Identifier: Apache-2.0

use std::fmt;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::Result;

/// Lifecycle of a pipeline. Moves forward only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Running,
    Draining,
    Stopped,
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineState::Running => write!(f, "running"),
            PipelineState::Draining => write!(f, "draining"),
            PipelineState::Stopped => write!(f, "stopped"),
        }
    }
}

/// Counters collected over the lifetime of a pipeline
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineReport {
    /// Lines accepted by the parser
    pub lines_fed: u64,
    pub commands: u64,
    pub events: u64,
    pub published: u64,
    pub publish_failures: u64,
    /// Event payloads that could not be decoded
    pub decode_failures: u64,
    pub checkpoints_saved: u64,
    pub checkpoint_failures: u64,
    /// Offset of the last checkpoint written
    pub last_checkpoint: Option<u64>,
    /// How far the follower had read when it was stopped
    pub read_offset: u64,
    /// Follower ended on its own because of a read error
    pub follower_failed: bool,
}

/// Control handle returned by [`Pipeline::start`](super::Pipeline::start).
pub struct PipelineHandle {
    pub(super) cancel: CancellationToken,
    pub(super) state: watch::Receiver<PipelineState>,
    pub(super) task: JoinHandle<PipelineReport>,
}

impl PipelineHandle {
    /// Request a graceful stop. Safe to call any number of times.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    pub fn state(&self) -> PipelineState {
        *self.state.borrow()
    }

    /// Receiver for state transitions
    pub fn subscribe(&self) -> watch::Receiver<PipelineState> {
        self.state.clone()
    }

    /// Wait for the pipeline to reach `Stopped`.
    pub async fn wait(self) -> Result<PipelineReport> {
        Ok(self.task.await?)
    }
}
