//! Sinks for enriched photometer readings.
//!
//! Provides:
//! - Day-rotated delimited text files (tsv/csv/txt)
//! - SQLite persistence via sqlx
//! - HTTP POST publishing via reqwest
//! - A dispatcher fanning one reading out to every enabled sink

pub mod api;
pub mod cli;
pub mod database;
pub mod dispatcher;
pub mod file;

use async_trait::async_trait;
use photometer_common::{Reading, ReaderResult};

pub use api::ApiSink;
pub use cli::SinkArgs;
pub use database::DatabaseSink;
pub use dispatcher::{DispatchReport, SinkConfig, SinkDispatcher};
pub use file::{FileFormat, FileSink};

/// A downstream consumer of finalized readings.
#[async_trait]
pub trait Sink: Send + Sync {
    /// Short name used in logs and metrics.
    fn name(&self) -> &'static str;

    /// Write one reading.
    async fn write(&self, reading: &Reading) -> ReaderResult<()>;
}
