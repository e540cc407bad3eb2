// SPDX-License-Identifier: Apache-2.0

use std::sync::{Arc, Mutex};

use super::{PublishError, PublishRecord, Publisher};

#[derive(Debug, Default)]
struct MemoryState {
    records: Vec<PublishRecord>,
    fail: bool,
    closed: bool,
}

/// Keeps published records in memory. Clones share the same state.
#[derive(Debug, Clone, Default)]
pub struct MemoryPublisher {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent publishes fail. Failed records are not kept.
    pub fn fail_publishes(&self, fail: bool) {
        if let Ok(mut state) = self.state.lock() {
            state.fail = fail;
        }
    }

    pub fn records(&self) -> Vec<PublishRecord> {
        self.state
            .lock()
            .map(|s| s.records.clone())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.state.lock().map(|s| s.records.len()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().map(|s| s.closed).unwrap_or_default()
    }
}

impl Publisher for MemoryPublisher {
    async fn publish(&mut self, record: PublishRecord) -> Result<(), PublishError> {
        let mut state = self
            .state
            .lock()
            .map_err(|e| PublishError::Rejected(e.to_string()))?;
        if state.fail {
            return Err(PublishError::Rejected("publish failed".to_string()));
        }
        state.records.push(record);
        Ok(())
    }

    async fn close(&mut self) {
        if let Ok(mut state) = self.state.lock() {
            state.closed = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_clones_share_records() {
        let observer = MemoryPublisher::new();
        let mut publisher = observer.clone();

        publisher.publish(PublishRecord::new("a")).await.unwrap();
        observer.fail_publishes(true);
        assert!(publisher.publish(PublishRecord::new("b")).await.is_err());
        publisher.close().await;

        assert_eq!(observer.len(), 1);
        assert!(observer.is_closed());
    }
}
