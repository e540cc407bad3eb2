// SPDX-License-Identifier: Apache-2.0

use tracing::debug;

use super::{PublishError, PublishRecord, Publisher};

/// Discards every record
#[derive(Debug, Default)]
pub struct BlackholePublisher {
    count: u64,
}

impl BlackholePublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self) -> u64 {
        self.count
    }
}

impl Publisher for BlackholePublisher {
    async fn publish(&mut self, _record: PublishRecord) -> Result<(), PublishError> {
        self.count += 1;
        Ok(())
    }

    async fn close(&mut self) {
        debug!(records = self.count, "exiting blackhole publisher")
    }
}
