// SPDX-License-Identifier: Apache-2.0

//! Tail-follow of a single growing log file.
//!
//! A dedicated thread reads complete lines from the target and hands them to
//! a bounded channel, waking on file system notifications. It survives the
//! file being truncated in place or rotated away and re-created.

mod config;
mod file_id;
mod line_follower;
mod reader;
pub mod watcher;

pub use config::FollowerConfig;
pub(crate) use config::default_channel_capacity;
pub use file_id::FileId;
pub use line_follower::{FollowerHandle, LineFollower};
pub use reader::{Line, LineReader};
