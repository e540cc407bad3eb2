// SPDX-License-Identifier: Apache-2.0

//! The checkpointed tail-ingestion and dispatch pipeline.
//!
//! ```text
//! checkpoint ─▶ follower ─lines─▶ parser ─commands/events─▶ dispatcher ─▶ publisher
//!     ▲                                                        │
//!     └──────────────────── offset after each command ─────────┘
//! ```
//!
//! The dispatcher is a single task that owns the publisher and the checkpoint
//! store. A stop request closes the parser input, publishes whatever output
//! is already queued, stops the follower and then reports.

mod config;
mod dispatch;
mod handle;

pub use config::{DEFAULT_PIPELINE_NAME, PipelineConfig};
pub use handle::{PipelineHandle, PipelineReport, PipelineState};

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::checkpoint::{CheckpointStore, resolve_start_offset};
use crate::error::{Error, Result};
use crate::follower::LineFollower;
use crate::parser::{LogParser, ParserAdapter};
use crate::publisher::Publisher;
use dispatch::Dispatcher;

pub struct Pipeline;

impl Pipeline {
    /// Resolve the start offset, start the follower and parser, and spawn the
    /// dispatcher. Must be called from within a tokio runtime.
    ///
    /// Fails when the configuration is invalid or the target cannot be
    /// opened for a reason other than not existing yet.
    pub fn start<L, P, S>(
        config: PipelineConfig,
        parser: L,
        publisher: P,
        mut store: S,
    ) -> Result<PipelineHandle>
    where
        L: LogParser,
        P: Publisher + 'static,
        S: CheckpointStore + 'static,
    {
        config.validate().map_err(Error::Config)?;

        let path = config.follower.path.clone();
        let start_offset = resolve_start_offset(&mut store, &path);
        let follower = LineFollower::open(config.follower.clone(), start_offset)?;
        let parser = ParserAdapter::spawn(parser, config.channel_capacity);

        let cancel = CancellationToken::new();
        let (state_tx, state_rx) = watch::channel(PipelineState::Running);

        info!(
            name = %config.name,
            path = ?path,
            offset = start_offset,
            "Starting pipeline"
        );

        let dispatcher = Dispatcher::new(
            config.name,
            path.to_string_lossy().into_owned(),
            follower,
            parser,
            publisher,
            store,
            cancel.clone(),
            state_tx,
        );
        let task = tokio::spawn(dispatcher.run());

        Ok(PipelineHandle {
            cancel,
            state: state_rx,
            task,
        })
    }
}
