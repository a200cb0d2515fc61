//! Command line flags shared by the reader binaries.

use std::path::PathBuf;
use std::time::Duration;

use clap::Args;

use crate::{FileFormat, SinkConfig};

#[derive(Args, Debug, Clone)]
pub struct SinkArgs {
    /// Do not write readings to plain text files
    #[arg(long = "no-save-to-file", env = "NO_SAVE_TO_FILE")]
    no_save_to_file: bool,

    /// Persist readings to the database
    #[arg(long, env = "SAVE_TO_DATABASE")]
    save_to_database: bool,

    /// POST readings to a REST API
    #[arg(long, env = "POST_TO_API")]
    post_to_api: bool,

    /// Destination directory for data files
    #[arg(long, env = "SAVE_FILES_TO", default_value = ".")]
    save_files_to: PathBuf,

    /// Data file format: tsv, csv or txt
    #[arg(long, env = "FILE_FORMAT", default_value = "tsv", value_parser = parse_format)]
    file_format: FileFormat,

    /// Database URL
    #[arg(long, env = "DATABASE_URL", default_value = "sqlite://photometer.db")]
    database_url: String,

    /// REST API endpoint receiving readings
    #[arg(long, env = "API_URL")]
    api_url: Option<String>,

    /// REST API request timeout in seconds
    #[arg(long, env = "API_TIMEOUT_SECS", default_value = "10")]
    api_timeout_secs: u64,
}

fn parse_format(s: &str) -> Result<FileFormat, String> {
    s.parse().map_err(|e: photometer_common::ReaderError| e.to_string())
}

impl SinkArgs {
    pub fn to_config(&self) -> SinkConfig {
        SinkConfig {
            save_to_file: !self.no_save_to_file,
            save_to_database: self.save_to_database,
            post_to_api: self.post_to_api,
            save_files_to: self.save_files_to.clone(),
            file_format: self.file_format,
            database_url: self.database_url.clone(),
            api_url: self.api_url.clone(),
            api_timeout: Duration::from_secs(self.api_timeout_secs),
        }
    }
}
