// SPDX-License-Identifier: Apache-2.0

use tokio::task::JoinHandle;
use tracing::debug;

use super::command::Command;
use super::traits::{LogParser, ParserOutput};
use crate::bounded_channel::{BoundedReceiver, BoundedSender, bounded};

/// Runs a [`LogParser`] on a blocking worker between bounded channels.
///
/// Dropping `lines` ends the input: the worker calls `finish`, forwards what
/// it flushed and closes both output channels. If the output receivers go
/// away first the worker exits without waiting for more input.
pub struct ParserAdapter {
    pub lines: BoundedSender<String>,
    pub commands: BoundedReceiver<Command>,
    pub events: BoundedReceiver<String>,
    pub worker: JoinHandle<()>,
}

impl ParserAdapter {
    /// Must be called from within a tokio runtime.
    pub fn spawn<P: LogParser>(parser: P, capacity: usize) -> Self {
        let (line_tx, line_rx) = bounded::<String>(capacity);
        let (cmd_tx, cmd_rx) = bounded::<Command>(capacity);
        let (event_tx, event_rx) = bounded::<String>(capacity);

        let worker = tokio::task::spawn_blocking(move || {
            run_parser(parser, line_rx, cmd_tx, event_tx);
        });

        Self {
            lines: line_tx,
            commands: cmd_rx,
            events: event_rx,
            worker,
        }
    }
}

fn run_parser<P: LogParser>(
    mut parser: P,
    lines: BoundedReceiver<String>,
    commands: BoundedSender<Command>,
    events: BoundedSender<String>,
) {
    let mut out = ParserOutput::default();
    let mut line_count: u64 = 0;

    while let Some(line) = lines.recv_blocking() {
        line_count += 1;
        parser.parse_line(&line, &mut out);
        if !forward(&mut out, &commands, &events) {
            debug!(lines = line_count, "Parser outputs closed, stopping parser worker");
            return;
        }
    }

    parser.finish(&mut out);
    forward(&mut out, &commands, &events);
    debug!(lines = line_count, "Parser input closed, parser worker finished");
}

/// Returns false once a consumer is gone.
fn forward(
    out: &mut ParserOutput,
    commands: &BoundedSender<Command>,
    events: &BoundedSender<String>,
) -> bool {
    if out.is_empty() {
        return true;
    }
    for command in out.take_commands() {
        if commands.send_blocking(command).is_err() {
            return false;
        }
    }
    for event in out.take_events() {
        if events.send_blocking(event).is_err() {
            return false;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    /// Records every line; emits an event on `event:` lines and one command
    /// per `cmd:` line, plus a command at finish.
    struct Recording {
        seen: Arc<Mutex<Vec<String>>>,
    }

    impl LogParser for Recording {
        fn parse_line(&mut self, line: &str, out: &mut ParserOutput) {
            self.seen.lock().unwrap().push(line.to_string());
            if let Some(rest) = line.strip_prefix("event:") {
                out.push_event(rest);
            } else if let Some(rest) = line.strip_prefix("cmd:") {
                out.push_command(Command {
                    cmd: rest.to_string(),
                    ..Default::default()
                });
            }
        }

        fn finish(&mut self, out: &mut ParserOutput) {
            out.push_command(Command {
                cmd: "flushed".to_string(),
                ..Default::default()
            });
        }
    }

    #[tokio::test]
    async fn test_lines_reach_parser_in_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let adapter = ParserAdapter::spawn(Recording { seen: seen.clone() }, 4);

        for i in 0..100 {
            adapter.lines.send_owned(format!("line{}", i)).await.unwrap();
        }
        let ParserAdapter {
            lines,
            mut commands,
            worker,
            ..
        } = adapter;
        drop(lines);

        assert_eq!(commands.next().await.unwrap().cmd, "flushed");
        assert!(commands.next().await.is_none());
        worker.await.unwrap();

        let expected: Vec<String> = (0..100).map(|i| format!("line{}", i)).collect();
        assert_eq!(*seen.lock().unwrap(), expected);
    }

    #[tokio::test]
    async fn test_outputs_are_routed() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut adapter = ParserAdapter::spawn(Recording { seen }, 4);

        adapter.lines.send_owned("cmd:sync".to_string()).await.unwrap();
        adapter.lines.send_owned(r#"event:{"cmd":"edit"}"#.to_string()).await.unwrap();

        assert_eq!(adapter.commands.next().await.unwrap().cmd, "sync");
        assert_eq!(adapter.events.next().await.unwrap(), r#"{"cmd":"edit"}"#);
    }

    #[tokio::test]
    async fn test_worker_exits_when_outputs_dropped() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let ParserAdapter {
            lines,
            commands,
            events,
            worker,
        } = ParserAdapter::spawn(Recording { seen }, 1);

        drop(commands);
        drop(events);
        lines.send_owned("cmd:a".to_string()).await.unwrap();

        tokio::time::timeout(std::time::Duration::from_secs(5), worker)
            .await
            .expect("worker should exit")
            .unwrap();
    }
}
