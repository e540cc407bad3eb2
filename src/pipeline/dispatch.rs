// SPDX-License-Identifier: Apache-2.0

use std::pin::Pin;

use flume::r#async::SendFut;
use tokio::select;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::handle::{PipelineReport, PipelineState};
use crate::bounded_channel::{BoundedReceiver, BoundedSender, TryRecv};
use crate::checkpoint::{Checkpoint, CheckpointStore};
use crate::follower::{FileId, FollowerHandle, Line};
use crate::parser::{Command, ParserAdapter};
use crate::publisher::{Publisher, command_record, event_record};

/// A line taken from the follower that the parser has not accepted yet
struct PendingLine {
    send: Pin<Box<SendFut<'static, String>>>,
    end_offset: u64,
    file_id: Option<FileId>,
}

/// Single owner of the publisher and checkpoint store, multiplexing follower
/// output into the parser and parser output into publish calls.
pub(super) struct Dispatcher<P, S> {
    name: String,
    path: String,
    follower: Option<FollowerHandle>,
    follower_lines: Option<BoundedReceiver<Line>>,
    parser_lines: Option<BoundedSender<String>>,
    commands: BoundedReceiver<Command>,
    events: BoundedReceiver<String>,
    commands_open: bool,
    events_open: bool,
    parser_worker: JoinHandle<()>,
    publisher: P,
    store: S,
    cancel: CancellationToken,
    state: watch::Sender<PipelineState>,
    /// Position just after the last line the parser accepted, or the start
    /// position before any line was fed
    fed_offset: u64,
    fed_file_id: Option<FileId>,
    report: PipelineReport,
}

impl<P, S> Dispatcher<P, S>
where
    P: Publisher,
    S: CheckpointStore,
{
    #[allow(clippy::too_many_arguments)]
    pub(super) fn new(
        name: String,
        path: String,
        mut follower: FollowerHandle,
        parser: ParserAdapter,
        publisher: P,
        store: S,
        cancel: CancellationToken,
        state: watch::Sender<PipelineState>,
    ) -> Self {
        let ParserAdapter {
            lines,
            commands,
            events,
            worker,
        } = parser;
        let follower_lines = follower.lines();
        let fed_offset = follower.opened_at();
        let fed_file_id = follower.file_id();

        Self {
            name,
            path,
            follower: Some(follower),
            follower_lines,
            parser_lines: Some(lines),
            commands,
            events,
            commands_open: true,
            events_open: true,
            parser_worker: worker,
            publisher,
            store,
            cancel,
            state,
            fed_offset,
            fed_file_id,
            report: PipelineReport::default(),
        }
    }

    pub(super) async fn run(mut self) -> PipelineReport {
        info!(path = %self.path, "Pipeline running");

        let mut pending: Option<PendingLine> = None;

        loop {
            select! {
                _ = self.cancel.cancelled() => {
                    debug!("Pipeline stop requested");
                    break;
                }

                res = send_pending(&mut pending) => {
                    let Some(line) = pending.take() else { continue };
                    match res {
                        Ok(()) => {
                            self.fed_offset = line.end_offset;
                            self.fed_file_id = line.file_id;
                            self.report.lines_fed += 1;
                        }
                        Err(_) => {
                            // parser worker is gone, its outputs will close
                            debug!("Parser input closed, dropping line");
                            self.parser_lines = None;
                        }
                    }
                }

                line = recv_opt(&mut self.follower_lines), if pending.is_none() => {
                    match line {
                        Some(line) => match &self.parser_lines {
                            Some(tx) => {
                                pending = Some(PendingLine {
                                    send: Box::pin(tx.send_owned(line.text)),
                                    end_offset: line.end_offset,
                                    file_id: line.file_id,
                                });
                            }
                            None => debug!("Parser input closed, dropping line"),
                        },
                        None => {
                            self.follower_lines = None;
                            self.report.follower_failed = self
                                .follower
                                .as_ref()
                                .is_some_and(|f| f.failed());
                            info!(
                                failed = self.report.follower_failed,
                                "Follower output ended, stopping pipeline"
                            );
                            break;
                        }
                    }
                }

                command = self.commands.next(), if self.commands_open => {
                    match command {
                        Some(command) => self.dispatch_command(command).await,
                        None => {
                            self.commands_open = false;
                            if !self.events_open {
                                info!("Parser outputs closed, stopping pipeline");
                                break;
                            }
                        }
                    }
                }

                event = self.events.next(), if self.events_open => {
                    match event {
                        Some(event) => self.dispatch_event(event).await,
                        None => {
                            self.events_open = false;
                            if !self.commands_open {
                                info!("Parser outputs closed, stopping pipeline");
                                break;
                            }
                        }
                    }
                }
            }
        }

        // never fed, so no checkpoint covers it
        drop(pending);
        self.drain().await
    }

    async fn drain(mut self) -> PipelineReport {
        self.state.send_replace(PipelineState::Draining);
        info!("Pipeline draining");

        self.parser_lines = None;

        loop {
            let mut progressed = false;

            if let TryRecv::Item(event) = self.events.poll_now() {
                self.dispatch_event(event).await;
                progressed = true;
            }
            if let TryRecv::Item(command) = self.commands.poll_now() {
                self.dispatch_command(command).await;
                progressed = true;
            }

            if !progressed {
                break;
            }
        }

        self.follower_lines = None;
        if let Some(mut follower) = self.follower.take() {
            match tokio::task::spawn_blocking(move || {
                follower.stop();
                (follower.failed(), follower.current_offset())
            })
            .await
            {
                Ok((failed, read_offset)) => {
                    self.report.follower_failed |= failed;
                    self.report.read_offset = read_offset;
                }
                Err(e) => warn!(error = %e, "Failed to stop follower"),
            }
        }

        self.publisher.close().await;

        let Dispatcher {
            commands,
            events,
            parser_worker,
            state,
            report,
            ..
        } = self;
        drop(commands);
        drop(events);
        if let Err(e) = parser_worker.await {
            warn!(error = %e, "Parser worker failed");
        }

        info!(
            lines = report.lines_fed,
            published = report.published,
            read_offset = report.read_offset,
            last_checkpoint = ?report.last_checkpoint,
            "Pipeline stopped"
        );
        state.send_replace(PipelineState::Stopped);
        report
    }

    async fn dispatch_command(&mut self, command: Command) {
        self.report.commands += 1;

        let record = command_record(&self.name, &command);
        match self.publisher.publish(record).await {
            Ok(()) => self.report.published += 1,
            Err(e) => {
                self.report.publish_failures += 1;
                warn!(cmd = %command.cmd, pid = command.pid, error = %e, "Failed to publish command");
            }
        }

        let checkpoint = Checkpoint::new(self.fed_offset, self.fed_file_id, self.path.as_str());
        match self.store.save(&checkpoint) {
            Ok(()) => {
                self.report.checkpoints_saved += 1;
                self.report.last_checkpoint = Some(checkpoint.offset);
            }
            Err(e) => {
                self.report.checkpoint_failures += 1;
                warn!(offset = checkpoint.offset, error = %e, "Failed to save checkpoint");
            }
        }
    }

    async fn dispatch_event(&mut self, payload: String) {
        self.report.events += 1;

        let record = match event_record(&self.name, &payload) {
            Ok(record) => record,
            Err(e) => {
                self.report.decode_failures += 1;
                warn!(error = %e, payload = %payload, "Skipping undecodable event");
                return;
            }
        };

        match self.publisher.publish(record).await {
            Ok(()) => self.report.published += 1,
            Err(e) => {
                self.report.publish_failures += 1;
                warn!(error = %e, "Failed to publish event");
            }
        }
    }
}

async fn send_pending(pending: &mut Option<PendingLine>) -> Result<(), flume::SendError<String>> {
    match pending {
        Some(line) => (&mut line.send).await,
        None => std::future::pending().await,
    }
}

async fn recv_opt<T>(rx: &mut Option<BoundedReceiver<T>>) -> Option<T> {
    match rx {
        Some(rx) => rx.next().await,
        None => std::future::pending().await,
    }
}
