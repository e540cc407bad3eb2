// SPDX-License-Identifier: Apache-2.0

//! Boundary to the log grammar engine.
//!
//! The p4d log grammar itself lives outside this crate behind [`LogParser`].
//! [`JsonRecordParser`] handles logs that were already converted to one JSON
//! record per line.

mod adapter;
mod command;
mod json;
mod traits;

pub use adapter::ParserAdapter;
pub use command::{Command, TableStats};
pub use json::JsonRecordParser;
pub use traits::{LogParser, ParserOutput};
