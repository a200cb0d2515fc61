//! Delimited text output, one file per device per observing night.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{Arc, Mutex as StdMutex};

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, Timelike, Utc};
use chrono_tz::Tz;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument};

use photometer_common::{Reading, ReaderError, ReaderResult};

use crate::Sink;

/// Output text format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FileFormat {
    #[default]
    Tsv,
    Csv,
    Txt,
}

impl FileFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Tsv => "tsv",
            Self::Csv => "csv",
            Self::Txt => "txt",
        }
    }

    pub fn delimiter(&self) -> &'static str {
        match self {
            Self::Tsv => "\t",
            Self::Csv => ",",
            Self::Txt => " ",
        }
    }
}

impl fmt::Display for FileFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for FileFormat {
    type Err = ReaderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "tsv" => Ok(Self::Tsv),
            "csv" => Ok(Self::Csv),
            "txt" => Ok(Self::Txt),
            other => Err(ReaderError::Config(format!(
                "Unsupported file format: {} (expected tsv, csv or txt)",
                other
            ))),
        }
    }
}

/// Observing-night date for an instant: the local calendar date at the
/// site, rolled back one day before local noon.
pub fn night_date(timestamp: DateTime<Utc>, timezone: Tz) -> NaiveDate {
    let local = timestamp.with_timezone(&timezone);
    if local.hour() < 12 {
        (local - Duration::days(1)).date_naive()
    } else {
        local.date_naive()
    }
}

/// Appends readings to `<dir>/<YYYYMMDD>_<identity>.<ext>`.
pub struct FileSink {
    dir: PathBuf,
    format: FileFormat,
    /// One lock per device identity. A device only ever appends to its own
    /// files, so this serializes every target path with one entry per device.
    locks: StdMutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl FileSink {
    pub fn new(dir: impl Into<PathBuf>, format: FileFormat) -> Self {
        Self {
            dir: dir.into(),
            format,
            locks: StdMutex::new(HashMap::new()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn format(&self) -> FileFormat {
        self.format
    }

    /// Target file for a reading.
    pub fn path_for(&self, reading: &Reading) -> PathBuf {
        let date = night_date(reading.timestamp, reading.timezone);
        self.dir.join(format!(
            "{}_{}.{}",
            date.format("%Y%m%d"),
            reading.identity,
            self.format.extension()
        ))
    }

    /// Two comment lines: the file name, then the column names.
    pub fn header(&self, reading: &Reading, path: &Path) -> String {
        format!(
            "# File name: {}\n# {}\n",
            path.display(),
            reading.columns().join(self.format.delimiter())
        )
    }

    pub fn line(&self, reading: &Reading) -> String {
        format!("{}\n", reading.values().join(self.format.delimiter()))
    }

    fn lock_for(&self, identity: &str) -> Arc<Mutex<()>> {
        let mut locks = match self.locks.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        locks
            .entry(identity.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

#[async_trait]
impl Sink for FileSink {
    fn name(&self) -> &'static str {
        "file"
    }

    #[instrument(skip(self, reading), fields(device = %reading.serial_id))]
    async fn write(&self, reading: &Reading) -> ReaderResult<()> {
        let path = self.path_for(reading);
        let lock = self.lock_for(&reading.identity);
        let _guard = lock.lock().await;

        tokio::fs::create_dir_all(&self.dir).await?;

        let mut content = String::new();
        if !tokio::fs::try_exists(&path).await? {
            info!(path = %path.display(), "Starting new data file");
            content.push_str(&self.header(reading, &path));
        }
        content.push_str(&self.line(reading));

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        file.write_all(content.as_bytes()).await?;
        file.flush().await?;

        debug!(path = %path.display(), "Reading written to file");
        Ok(())
    }
}
