// SPDX-License-Identifier: Apache-2.0

//! Downstream delivery of structured records.

mod blackhole;
mod json_lines;
mod memory;
pub mod record;

pub use blackhole::BlackholePublisher;
pub use json_lines::JsonLinesPublisher;
pub use memory::MemoryPublisher;
pub use record::{PublishRecord, command_record, event_record};

use std::future::Future;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("invalid record: {0}")]
    InvalidRecord(String),

    #[error("publisher rejected record: {0}")]
    Rejected(String),
}

/// Accepts one record at a time.
///
/// Calls are awaited one after another by a single owner, so
/// implementations never see concurrent publishes.
pub trait Publisher: Send {
    fn publish(
        &mut self,
        record: PublishRecord,
    ) -> impl Future<Output = Result<(), PublishError>> + Send;

    /// Flush and release the underlying connection.
    fn close(&mut self) -> impl Future<Output = ()> + Send {
        async {}
    }
}

/// Publisher selected at startup
pub enum AnyPublisher {
    JsonLines(JsonLinesPublisher),
    Blackhole(BlackholePublisher),
}

impl Publisher for AnyPublisher {
    async fn publish(&mut self, record: PublishRecord) -> Result<(), PublishError> {
        match self {
            AnyPublisher::JsonLines(p) => p.publish(record).await,
            AnyPublisher::Blackhole(p) => p.publish(record).await,
        }
    }

    async fn close(&mut self) {
        match self {
            AnyPublisher::JsonLines(p) => p.close().await,
            AnyPublisher::Blackhole(p) => p.close().await,
        }
    }
}
