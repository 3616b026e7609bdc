//! Error types for the export pipeline
//!
//! Errors are split by how far they propagate:
//!
//! - [`FetchError`]: one page failed. Absorbed by the worker pool unless it
//!   hits the first page.
//! - [`SinkError`]: one persistence target failed. Reported next to the
//!   other sink's outcome, never aborts it.
//! - [`ConfigError`] and [`ExportError`]: the export cannot run at all.

use reqwest::StatusCode;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for export operations
pub type Result<T> = std::result::Result<T, ExportError>;

/// Failure of a single page request
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("request for offset {offset} failed: {source}")]
    Transport {
        offset: u64,
        #[source]
        source: reqwest::Error,
    },

    #[error("source answered HTTP {status} for offset {offset}")]
    Status { offset: u64, status: StatusCode },

    #[error("could not decode page at offset {offset}: {source}")]
    Decode {
        offset: u64,
        #[source]
        source: serde_json::Error,
    },
}

impl FetchError {
    pub fn offset(&self) -> u64 {
        match self {
            Self::Transport { offset, .. }
            | Self::Status { offset, .. }
            | Self::Decode { offset, .. } => *offset,
        }
    }

    /// Whether a repeated request has a chance of succeeding
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport { .. } => true,
            Self::Status { status, .. } => {
                status.is_server_error() || *status == StatusCode::TOO_MANY_REQUESTS
            },
            Self::Decode { .. } => false,
        }
    }
}

/// Failure of one persistence target
#[derive(Error, Debug)]
pub enum SinkError {
    #[error("CSV write to '{path}' failed: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("SQLite write to '{path}' failed: {source}")]
    Sqlite {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    #[error("File operation on '{path}' failed: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Could not encode fields of issue {id}: {source}")]
    Encode {
        id: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid table name '{0}'. Use letters, digits and underscores, not starting with a digit.")]
    InvalidTableName(String),

    #[error("Sink task did not complete: {0}")]
    Aborted(String),
}

/// Invalid or incomplete export settings
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required setting '{0}'. Pass it as a flag, in the config file, or via the environment.")]
    Missing(&'static str),

    #[error("Invalid value for '{key}': {message}")]
    Invalid { key: &'static str, message: String },

    #[error("Invalid header '{0}'. Expected 'Name: value'.")]
    Header(String),

    #[error("Could not read config file '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Could not parse config file '{path}': {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

impl ConfigError {
    pub fn invalid(key: &'static str, message: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            message: message.into(),
        }
    }
}

/// Failure that stops the export before anything is persisted
#[derive(Error, Debug)]
pub enum ExportError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("HTTP client could not be built: {0}")]
    Client(#[from] reqwest::Error),

    #[error("First page could not be fetched, nothing was exported: {0}")]
    FirstPage(#[source] FetchError),

    #[error("Export cancelled after collecting {collected} issues; no sink was written")]
    Cancelled { collected: usize },

    #[error("Page worker terminated abnormally: {0}")]
    WorkerPanicked(String),

    #[error("Result aggregator terminated abnormally: {0}")]
    Aggregator(String),
}
