// SPDX-License-Identifier: Apache-2.0

//! File identity used to tell log generations apart.
//!
//! A p4d log rotated by `p4 logrotate` or an external tool keeps its inode
//! under the new name while a fresh file appears at the configured path.
//! Comparing identities lets the follower notice the swap even when the new
//! file has already grown past the old offset.

use serde::{Deserialize, Serialize};
use std::fs::{File, Metadata};
use std::io;
use std::path::Path;

/// Device and inode pair of a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FileId {
    dev: u64,
    ino: u64,
}

impl FileId {
    /// Build from raw values, used for persisted checkpoints.
    pub fn new(dev: u64, ino: u64) -> Self {
        Self { dev, ino }
    }

    #[cfg(unix)]
    pub fn from_metadata(metadata: &Metadata) -> io::Result<Self> {
        use std::os::unix::fs::MetadataExt;

        Ok(Self {
            dev: metadata.dev(),
            ino: metadata.ino(),
        })
    }

    #[cfg(not(unix))]
    pub fn from_metadata(_metadata: &Metadata) -> io::Result<Self> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "file identity is not available on this platform",
        ))
    }

    pub fn from_file(file: &File) -> io::Result<Self> {
        Self::from_metadata(&file.metadata()?)
    }

    /// Identity of whatever currently lives at `path`.
    pub fn from_path(path: impl AsRef<Path>) -> io::Result<Self> {
        Self::from_metadata(&std::fs::metadata(path)?)
    }

    pub fn dev(&self) -> u64 {
        self.dev
    }

    pub fn ino(&self) -> u64 {
        self.ino
    }
}

impl std::fmt::Display for FileId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.dev, self.ino)
    }
}
