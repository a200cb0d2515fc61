//! Error types for photometer readers.

use thiserror::Error;

/// Result type alias using ReaderError.
pub type ReaderResult<T> = Result<T, ReaderError>;

/// Primary error type for acquisition, gating and dispatch.
#[derive(Debug, Error)]
pub enum ReaderError {
    // === Startup Errors ===
    #[error("Configuration error: {0}")]
    Config(String),

    // === Device I/O Errors ===
    #[error("Failed to connect to {addr}: {message}")]
    Connect { addr: String, message: String },

    #[error("Timed out during {stage} with {addr}")]
    Timeout { addr: String, stage: &'static str },

    // === Message Errors ===
    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Unknown device: {0}")]
    UnknownDevice(String),

    // === Sink Errors ===
    #[error("Sink '{sink}' failed: {message}")]
    Sink { sink: &'static str, message: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ReaderError {
    /// Build a sink error for the named sink.
    pub fn sink(sink: &'static str, message: impl Into<String>) -> Self {
        ReaderError::Sink {
            sink,
            message: message.into(),
        }
    }

    /// Whether this error should stop the process.
    ///
    /// Only configuration failures are fatal; everything else is scoped to a
    /// single message or poll.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ReaderError::Config(_))
    }
}

impl From<serde_json::Error> for ReaderError {
    fn from(err: serde_json::Error) -> Self {
        ReaderError::Parse(format!("JSON error: {}", err))
    }
}

impl From<serde_yaml::Error> for ReaderError {
    fn from(err: serde_yaml::Error) -> Self {
        ReaderError::Config(format!("YAML error: {}", err))
    }
}
