// SPDX-License-Identifier: Apache-2.0

use std::path::{Path, PathBuf};

use tokio::io::{AsyncWrite, AsyncWriteExt, BufWriter};
use tracing::{debug, warn};

use super::{PublishError, PublishRecord, Publisher};

/// Writes one JSON object per line to stdout or an append-mode file.
pub struct JsonLinesPublisher {
    writer: BufWriter<Box<dyn AsyncWrite + Send + Unpin>>,
    target: Option<PathBuf>,
    count: u64,
}

impl JsonLinesPublisher {
    pub fn stdout() -> Self {
        Self {
            writer: BufWriter::new(Box::new(tokio::io::stdout())),
            target: None,
            count: 0,
        }
    }

    /// Open `path` for appending, creating it if needed.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, PublishError> {
        let path = path.as_ref();
        let file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await?;

        debug!(path = ?path, "Opened JSON lines output");
        Ok(Self {
            writer: BufWriter::new(Box::new(file)),
            target: Some(path.to_path_buf()),
            count: 0,
        })
    }

    pub fn count(&self) -> u64 {
        self.count
    }
}

impl Publisher for JsonLinesPublisher {
    async fn publish(&mut self, record: PublishRecord) -> Result<(), PublishError> {
        let mut line = serde_json::to_vec(&record.to_json())?;
        line.push(b'\n');
        self.writer.write_all(&line).await?;
        self.writer.flush().await?;
        self.count += 1;
        Ok(())
    }

    async fn close(&mut self) {
        if let Err(e) = self.writer.flush().await {
            warn!(path = ?self.target, error = %e, "Failed to flush JSON lines output");
        }
        debug!(records = self.count, "JSON lines publisher closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    #[tokio::test]
    async fn test_appends_one_object_per_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.jsonl");
        std::fs::write(&path, "{\"existing\":true}\n").unwrap();

        let mut publisher = JsonLinesPublisher::open(&path).await.unwrap();
        let mut record = PublishRecord::new("p4dtail");
        record.insert("p4.cmd", "sync");
        publisher.publish(record).await.unwrap();
        publisher.publish(PublishRecord::new("p4dtail")).await.unwrap();
        publisher.close().await;
        assert_eq!(publisher.count(), 2);

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 3);

        let first: Value = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(first["p4.cmd"], "sync");
        assert_eq!(first["type"], "p4dtail");
        assert!(first["@timestamp"].is_string());
    }

    #[tokio::test]
    async fn test_open_fails_for_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("out.jsonl");
        assert!(JsonLinesPublisher::open(&path).await.is_err());
    }
}
