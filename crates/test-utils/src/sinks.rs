//! Sinks for observing dispatch in tests.

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify};

use photometer_common::{Reading, ReaderError, ReaderResult};
use sinks::Sink;

/// Keeps every reading it receives.
#[derive(Default)]
pub struct RecordingSink {
    readings: Mutex<Vec<Reading>>,
    notify: Notify,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn readings(&self) -> Vec<Reading> {
        self.readings.lock().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.readings.lock().await.len()
    }

    /// Wait until at least `count` readings arrived.
    pub async fn wait_for(&self, count: usize) {
        loop {
            let notified = self.notify.notified();
            if self.len().await >= count {
                return;
            }
            notified.await;
        }
    }
}

#[async_trait]
impl Sink for RecordingSink {
    fn name(&self) -> &'static str {
        "recording"
    }

    async fn write(&self, reading: &Reading) -> ReaderResult<()> {
        self.readings.lock().await.push(reading.clone());
        self.notify.notify_waiters();
        Ok(())
    }
}

/// Always fails.
#[derive(Default)]
pub struct FailingSink;

#[async_trait]
impl Sink for FailingSink {
    fn name(&self) -> &'static str {
        "failing"
    }

    async fn write(&self, _reading: &Reading) -> ReaderResult<()> {
        Err(ReaderError::sink("failing", "configured to fail"))
    }
}
