// SPDX-License-Identifier: Apache-2.0

//! Checkpoint persistence for the tailer's read position.
//!
//! Uses JSON file storage with atomic writes. The stored value records the
//! byte offset together with the identity of the file it refers to, so a
//! rotation between checkpoint and restart is detected instead of silently
//! resuming inside a different file.

mod json_file;
mod schema;
mod store;

pub use json_file::{JsonFileDatabase, JsonFilePersister};
pub use schema::{
    CHECKPOINT_SCOPE, CHECKPOINT_VERSION, Checkpoint, OFFSET_KEY, PersistedCheckpointV1,
    decode_checkpoint,
};
pub use store::{
    CheckpointStore, JsonFileCheckpointStore, MemoryCheckpointStore, resolve_start_offset,
};
