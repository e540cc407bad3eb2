// SPDX-License-Identifier: Apache-2.0

//! Persisted checkpoint schema.
//!
//! Two layouts are understood:
//! - v0: legacy layout without a version, either a bare number or `{"offset": N}`
//! - v1: `{"version": 1, "offset": N, "dev": D, "ino": I, "path": "..."}`
//!
//! Saves always write v1.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::follower::FileId;

/// Scope used for all keys written by the tailer
pub const CHECKPOINT_SCOPE: &str = "p4dtail";

/// Key under which the checkpoint is stored
pub const OFFSET_KEY: &str = "offset";

/// Current schema version for persisted checkpoints
pub const CHECKPOINT_VERSION: u8 = 1;

/// Progress marker: the byte offset just after the last line whose records
/// were fully handled, plus the identity of the file generation it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Checkpoint {
    pub offset: u64,
    pub file_id: Option<FileId>,
    pub path: String,
}

impl Checkpoint {
    pub fn new(offset: u64, file_id: Option<FileId>, path: impl Into<String>) -> Self {
        Self {
            offset,
            file_id,
            path: path.into(),
        }
    }

    /// Checkpoint that carries only an offset (legacy data)
    pub fn offset_only(offset: u64) -> Self {
        Self {
            offset,
            file_id: None,
            path: String::new(),
        }
    }

    pub fn to_v1(&self) -> PersistedCheckpointV1 {
        PersistedCheckpointV1 {
            version: CHECKPOINT_VERSION,
            offset: self.offset,
            dev: self.file_id.map(|id| id.dev()),
            ino: self.file_id.map(|id| id.ino()),
            path: self.path.clone(),
        }
    }
}

/// On-disk checkpoint (v1)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PersistedCheckpointV1 {
    pub version: u8,
    pub offset: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dev: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ino: Option<u64>,
    #[serde(default)]
    pub path: String,
}

impl From<PersistedCheckpointV1> for Checkpoint {
    fn from(p: PersistedCheckpointV1) -> Self {
        let file_id = match (p.dev, p.ino) {
            (Some(dev), Some(ino)) => Some(FileId::new(dev, ino)),
            _ => None,
        };
        Checkpoint {
            offset: p.offset,
            file_id,
            path: p.path,
        }
    }
}

/// Decode a stored value in any supported layout.
pub fn decode_checkpoint(value: &Value) -> Result<Checkpoint, String> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64))
            .map(Checkpoint::offset_only)
            .ok_or_else(|| format!("invalid offset value: {}", n)),
        Value::Object(map) if map.contains_key("version") => {
            serde_json::from_value::<PersistedCheckpointV1>(value.clone())
                .map(Checkpoint::from)
                .map_err(|e| format!("invalid checkpoint: {}", e))
        }
        Value::Object(map) => match map.get("offset") {
            Some(inner @ Value::Number(_)) => decode_checkpoint(inner),
            Some(other) => Err(format!("invalid offset value: {}", other)),
            None => Err("checkpoint has no offset".to_string()),
        },
        other => Err(format!("unexpected checkpoint value: {}", other)),
    }
}
