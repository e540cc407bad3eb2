// SPDX-License-Identifier: Apache-2.0

//! Heartbeat mode: publishes a counter record on a fixed period instead of
//! tailing a log. Useful to check the output path end to end.

use std::time::Duration;

use tokio::select;
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::publisher::{PublishRecord, Publisher};

pub struct Ticker {
    name: String,
    period: Duration,
}

impl Ticker {
    pub fn new(name: impl Into<String>, period: Duration) -> Self {
        Self {
            name: name.into(),
            period,
        }
    }

    /// Publish `{type, counter}` every period until cancelled. Returns the
    /// number of records published.
    pub async fn run<P: Publisher>(&self, mut publisher: P, cancel: CancellationToken) -> u64 {
        info!(period = ?self.period, "Ticker running");

        let mut ticker = interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // the first tick completes immediately
        ticker.tick().await;

        let mut counter: u64 = 1;
        let mut published = 0;
        loop {
            select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let mut record = PublishRecord::new(&self.name);
                    record.insert("counter", counter);
                    match publisher.publish(record).await {
                        Ok(()) => {
                            published += 1;
                            debug!(counter, "Event sent");
                        }
                        Err(e) => warn!(counter, error = %e, "Failed to publish tick"),
                    }
                    counter += 1;
                }
            }
        }

        publisher.close().await;
        published
    }
}
