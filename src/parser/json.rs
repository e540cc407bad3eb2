// SPDX-License-Identifier: Apache-2.0

use serde_json::{Map, Value};
use tracing::debug;

use super::command::Command;
use super::traits::{LogParser, ParserOutput};

/// Parser for logs that already hold one JSON record per line.
///
/// Objects carrying a `processKey` or `tables` key are decoded as commands,
/// every other object is passed through as an event payload.
#[derive(Debug, Default)]
pub struct JsonRecordParser {
    skipped: u64,
}

impl JsonRecordParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of lines that were not usable records
    pub fn skipped(&self) -> u64 {
        self.skipped
    }

    fn is_command(map: &Map<String, Value>) -> bool {
        map.contains_key("processKey") || map.contains_key("tables")
    }
}

impl LogParser for JsonRecordParser {
    fn parse_line(&mut self, line: &str, out: &mut ParserOutput) {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return;
        }

        match serde_json::from_str::<Value>(trimmed) {
            Ok(Value::Object(map)) if Self::is_command(&map) => {
                match serde_json::from_value::<Command>(Value::Object(map)) {
                    Ok(command) => out.push_command(command),
                    Err(e) => {
                        self.skipped += 1;
                        debug!(error = %e, "Skipping malformed command record");
                    }
                }
            }
            Ok(Value::Object(_)) => out.push_event(trimmed),
            Ok(_) => {
                self.skipped += 1;
                debug!("Skipping line that is not a JSON object");
            }
            Err(e) => {
                self.skipped += 1;
                debug!(error = %e, "Skipping line that is not JSON");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(lines: &[&str]) -> (JsonRecordParser, ParserOutput) {
        let mut parser = JsonRecordParser::new();
        let mut out = ParserOutput::default();
        for line in lines {
            parser.parse_line(line, &mut out);
        }
        parser.finish(&mut out);
        (parser, out)
    }

    #[test]
    fn test_commands_and_events_are_split() {
        let (_, mut out) = parse(&[
            r#"{"processKey": "abc", "cmd": "user-sync", "pid": 10}"#,
            r#"{"cmd": "sync", "user": "bob"}"#,
            r#"{"tables": []}"#,
        ]);

        let commands = out.take_commands();
        assert_eq!(commands.len(), 2);
        assert_eq!(commands[0].process_key, "abc");
        assert_eq!(out.take_events(), vec![r#"{"cmd": "sync", "user": "bob"}"#]);
    }

    #[test]
    fn test_non_records_are_skipped() {
        let (parser, out) = parse(&[
            "Perforce server info:",
            "",
            "[1, 2]",
            r#"{"processKey": 5}"#,
        ]);
        assert!(out.is_empty());
        // the blank line is ignored without counting
        assert_eq!(parser.skipped(), 3);
    }
}
