// SPDX-License-Identifier: Apache-2.0

//! Tails a Perforce p4d server log, hands each new line to a log parser,
//! publishes the completed commands and events it produces, and checkpoints
//! the read position so a restart resumes where it left off.

pub mod bounded_channel;
pub mod checkpoint;
pub mod error;
pub mod follower;
pub mod init;
pub mod parser;
pub mod pipeline;
pub mod publisher;
pub mod ticker;

pub use error::{Error, Result};
