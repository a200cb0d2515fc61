//! Reading persistence using SQLite with sqlx.

use std::str::FromStr;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use tracing::{debug, info};

use photometer_common::{Reading, ReaderError, ReaderResult};

use crate::Sink;

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS readings (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    device TEXT NOT NULL,
    device_type TEXT NOT NULL,
    site TEXT NOT NULL,
    timestamp TEXT NOT NULL,
    payload TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_readings_device_timestamp ON readings(device, timestamp)
"#;

/// A stored reading row.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct StoredReading {
    pub id: i64,
    pub device: String,
    pub device_type: String,
    pub site: String,
    pub timestamp: String,
    pub payload: String,
}

/// Persists readings into a `readings` table.
pub struct DatabaseSink {
    pool: SqlitePool,
}

fn db_error(context: &str, err: sqlx::Error) -> ReaderError {
    ReaderError::sink("database", format!("{}: {}", context, err))
}

impl DatabaseSink {
    /// Open or create the database at `url` (e.g. `sqlite://photometer.db`).
    pub async fn connect(url: &str) -> ReaderResult<Self> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(|e| ReaderError::Config(format!("Invalid database URL {}: {}", url, e)))?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| db_error("Connection failed", e))?;

        let sink = Self { pool };
        sink.migrate().await?;
        info!(url = %url, "Database sink ready");
        Ok(sink)
    }

    /// In-memory database for tests.
    pub async fn open_memory() -> ReaderResult<Self> {
        let options = SqliteConnectOptions::new()
            .filename(":memory:")
            .create_if_missing(true);

        // A single connection that never expires keeps the database alive.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(|e| db_error("Connection failed", e))?;

        let sink = Self { pool };
        sink.migrate().await?;
        Ok(sink)
    }

    async fn migrate(&self) -> ReaderResult<()> {
        for statement in SCHEMA_SQL.split(';') {
            let trimmed = statement.trim();
            if !trimmed.is_empty() {
                sqlx::query(trimmed)
                    .execute(&self.pool)
                    .await
                    .map_err(|e| db_error("Migration failed", e))?;
            }
        }
        Ok(())
    }

    /// Stored readings for a device, oldest first.
    pub async fn readings_for(&self, device: &str) -> ReaderResult<Vec<StoredReading>> {
        sqlx::query_as::<_, StoredReading>(
            "SELECT id, device, device_type, site, timestamp, payload \
             FROM readings WHERE device = ? ORDER BY id ASC",
        )
        .bind(device)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("Query failed", e))
    }

    pub async fn count(&self) -> ReaderResult<i64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM readings")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| db_error("Query failed", e))?;
        Ok(count)
    }

    /// Close the pool, waiting for in-flight statements.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl Sink for DatabaseSink {
    fn name(&self) -> &'static str {
        "database"
    }

    async fn write(&self, reading: &Reading) -> ReaderResult<()> {
        let payload = serde_json::to_string(&reading.to_json())
            .map_err(|e| ReaderError::sink("database", e.to_string()))?;

        sqlx::query(
            "INSERT INTO readings (device, device_type, site, timestamp, payload) \
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&reading.serial_id)
        .bind(reading.kind.as_str())
        .bind(&reading.site_id)
        .bind(reading.timestamp.to_rfc3339())
        .bind(payload)
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("Insert failed", e))?;

        debug!(device = %reading.serial_id, "Reading persisted");
        Ok(())
    }
}
