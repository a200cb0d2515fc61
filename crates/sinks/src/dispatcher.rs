//! Fan-out of readings to the enabled sinks.
//!
//! Sinks run one after another for a reading, but each is isolated: a
//! failure is logged and recorded in the report and the remaining sinks
//! are still attempted.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use tracing::{debug, error, info};

use photometer_common::{Reading, ReaderError, ReaderResult};

use crate::{ApiSink, DatabaseSink, FileFormat, FileSink, Sink};

/// Which sinks to build and how.
#[derive(Debug, Clone)]
pub struct SinkConfig {
    pub save_to_file: bool,
    pub save_to_database: bool,
    pub post_to_api: bool,
    pub save_files_to: PathBuf,
    pub file_format: FileFormat,
    pub database_url: String,
    pub api_url: Option<String>,
    pub api_timeout: Duration,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            save_to_file: true,
            save_to_database: false,
            post_to_api: false,
            save_files_to: PathBuf::from("."),
            file_format: FileFormat::Tsv,
            database_url: "sqlite://photometer.db".to_string(),
            api_url: None,
            api_timeout: Duration::from_secs(10),
        }
    }
}

/// Result of dispatching one reading.
#[derive(Debug, Default)]
pub struct DispatchReport {
    pub written: Vec<&'static str>,
    pub failed: Vec<(&'static str, ReaderError)>,
}

impl DispatchReport {
    pub fn all_succeeded(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Invokes every configured sink for each reading.
#[derive(Clone, Default)]
pub struct SinkDispatcher {
    sinks: Vec<Arc<dyn Sink>>,
}

impl SinkDispatcher {
    pub fn new(sinks: Vec<Arc<dyn Sink>>) -> Self {
        Self { sinks }
    }

    /// Build the enabled sinks from configuration.
    pub async fn from_config(config: &SinkConfig) -> ReaderResult<Self> {
        let mut sinks: Vec<Arc<dyn Sink>> = Vec::new();

        if config.save_to_file {
            info!(
                dir = %config.save_files_to.display(),
                format = %config.file_format,
                "File sink enabled"
            );
            sinks.push(Arc::new(FileSink::new(
                config.save_files_to.clone(),
                config.file_format,
            )));
        }

        if config.save_to_database {
            sinks.push(Arc::new(DatabaseSink::connect(&config.database_url).await?));
        }

        if config.post_to_api {
            let url = config.api_url.as_ref().ok_or_else(|| {
                ReaderError::Config("Posting to an API requires an API URL".to_string())
            })?;
            info!(url = %url, "API sink enabled");
            sinks.push(Arc::new(ApiSink::new(url.clone(), config.api_timeout)?));
        }

        Ok(Self { sinks })
    }

    pub fn sink_names(&self) -> Vec<&'static str> {
        self.sinks.iter().map(|sink| sink.name()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }

    pub async fn dispatch(&self, reading: &Reading) -> DispatchReport {
        let mut report = DispatchReport::default();

        for sink in &self.sinks {
            match sink.write(reading).await {
                Ok(()) => {
                    counter!("sink_writes_total", "sink" => sink.name(), "result" => "ok")
                        .increment(1);
                    report.written.push(sink.name());
                }
                Err(e) => {
                    counter!("sink_writes_total", "sink" => sink.name(), "result" => "error")
                        .increment(1);
                    error!(
                        sink = sink.name(),
                        device = %reading.serial_id,
                        error = %e,
                        "Sink write failed"
                    );
                    report.failed.push((sink.name(), e));
                }
            }
        }

        debug!(device = %reading.serial_id, written = ?report.written, "Reading dispatched");
        report
    }
}
