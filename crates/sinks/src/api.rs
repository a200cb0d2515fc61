//! Publishing readings to an HTTP API.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, instrument};

use photometer_common::{Reading, ReaderError, ReaderResult};

use crate::Sink;

/// POSTs each reading as a JSON object.
pub struct ApiSink {
    client: Client,
    url: String,
}

impl ApiSink {
    pub fn new(url: impl Into<String>, timeout: Duration) -> ReaderResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| ReaderError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            url: url.into(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl Sink for ApiSink {
    fn name(&self) -> &'static str {
        "api"
    }

    #[instrument(skip(self, reading), fields(device = %reading.serial_id, url = %self.url))]
    async fn write(&self, reading: &Reading) -> ReaderResult<()> {
        let response = self
            .client
            .post(&self.url)
            .json(&reading.to_json())
            .send()
            .await
            .map_err(|e| ReaderError::sink("api", format!("Request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ReaderError::sink(
                "api",
                format!("Unexpected status {}", status),
            ));
        }

        debug!(status = %status, "Reading published");
        Ok(())
    }
}
