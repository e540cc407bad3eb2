// SPDX-License-Identifier: Apache-2.0

use super::command::Command;

/// Records produced while parsing one or more lines.
#[derive(Debug, Default)]
pub struct ParserOutput {
    commands: Vec<Command>,
    events: Vec<String>,
}

impl ParserOutput {
    pub fn push_command(&mut self, command: Command) {
        self.commands.push(command);
    }

    /// Queue an event payload, a JSON object in text form
    pub fn push_event(&mut self, event: impl Into<String>) {
        self.events.push(event.into());
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty() && self.events.is_empty()
    }

    pub fn take_commands(&mut self) -> Vec<Command> {
        std::mem::take(&mut self.commands)
    }

    pub fn take_events(&mut self) -> Vec<String> {
        std::mem::take(&mut self.events)
    }
}

/// A log grammar engine.
///
/// Lines are handed over in file order, exactly once each. A command may span
/// many lines, so records are emitted whenever the engine knows they are
/// complete, not necessarily on the line that ended them.
pub trait LogParser: Send + 'static {
    fn parse_line(&mut self, line: &str, out: &mut ParserOutput);

    /// Called once when the input ends, to flush pending state.
    fn finish(&mut self, _out: &mut ParserOutput) {}
}

impl LogParser for Box<dyn LogParser> {
    fn parse_line(&mut self, line: &str, out: &mut ParserOutput) {
        (**self).parse_line(line, out)
    }

    fn finish(&mut self, out: &mut ParserOutput) {
        (**self).finish(out)
    }
}
