// SPDX-License-Identifier: Apache-2.0

use tokio::select;
use tokio_util::sync::CancellationToken;
use tower::BoxError;
use tracing::{info, warn};

use crate::checkpoint::{CheckpointStore, JsonFileCheckpointStore, MemoryCheckpointStore};
use crate::init::args::{AgentRun, PublisherKind, RunMode};
use crate::parser::JsonRecordParser;
use crate::pipeline::{Pipeline, PipelineReport, PipelineState};
use crate::publisher::{AnyPublisher, BlackholePublisher, JsonLinesPublisher};
use crate::ticker::Ticker;

pub struct Agent {
    config: Box<AgentRun>,
}

impl Agent {
    pub fn new(config: Box<AgentRun>) -> Self {
        Self { config }
    }

    /// Run until `cancel` fires or the pipeline ends on its own.
    pub async fn run(self, cancel: CancellationToken) -> Result<(), BoxError> {
        let config = self.config.resolve()?;
        config.validate()?;

        let publisher = build_publisher(&config).await?;

        match config.mode {
            RunMode::Tick => {
                let ticker = Ticker::new(config.name.clone(), config.period());
                let published = ticker.run(publisher, cancel).await;
                info!(published, "Ticker stopped");
                Ok(())
            }
            RunMode::Tail => {
                let report = run_tail(&config, publisher, cancel).await?;
                if report.follower_failed {
                    warn!("Log follower failed, pipeline stopped early");
                }
                Ok(())
            }
        }
    }
}

async fn build_publisher(config: &AgentRun) -> Result<AnyPublisher, BoxError> {
    let publisher = match config.publisher {
        PublisherKind::JsonLines => match &config.output {
            Some(path) => AnyPublisher::JsonLines(
                JsonLinesPublisher::open(path)
                    .await
                    .map_err(|e| format!("failed to open output {}: {}", path.display(), e))?,
            ),
            None => AnyPublisher::JsonLines(JsonLinesPublisher::stdout()),
        },
        PublisherKind::Blackhole => AnyPublisher::Blackhole(BlackholePublisher::new()),
    };
    Ok(publisher)
}

fn build_store(config: &AgentRun) -> Result<Box<dyn CheckpointStore>, BoxError> {
    if config.no_checkpoint {
        info!("Checkpointing disabled, progress is kept in memory only");
        return Ok(Box::new(MemoryCheckpointStore::new()));
    }

    let store = JsonFileCheckpointStore::open(&config.state_path).map_err(|e| {
        format!(
            "checkpoint store cannot be initialized at {}: {}",
            config.state_path.display(),
            e
        )
    })?;
    Ok(Box::new(store))
}

async fn run_tail(
    config: &AgentRun,
    publisher: AnyPublisher,
    cancel: CancellationToken,
) -> Result<PipelineReport, BoxError> {
    let store = build_store(config)?;
    let handle = Pipeline::start(
        config.pipeline_config(),
        JsonRecordParser::new(),
        publisher,
        store,
    )?;

    let mut state = handle.subscribe();
    select! {
        _ = cancel.cancelled() => {
            info!("Stopping pipeline");
            handle.stop();
        }
        _ = state.wait_for(|s| *s == PipelineState::Stopped) => {}
    }

    let report = handle.wait().await?;
    info!(
        lines = report.lines_fed,
        commands = report.commands,
        events = report.events,
        published = report.published,
        publish_failures = report.publish_failures,
        checkpoint_failures = report.checkpoint_failures,
        "Pipeline finished"
    );
    Ok(report)
}
