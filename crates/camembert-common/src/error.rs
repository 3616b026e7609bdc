//! Error types shared across the workspace

use thiserror::Error;

/// Result type alias for common operations
pub type Result<T> = std::result::Result<T, CommonError>;

#[derive(Error, Debug)]
pub enum CommonError {
    #[error("Invalid value '{value}' for {key}")]
    InvalidValue { key: &'static str, value: String },

    #[error("Invalid log filter directive '{0}'")]
    InvalidDirective(String),

    #[error("Failed to install tracing subscriber: {0}")]
    SubscriberInit(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CommonError {
    pub fn invalid_value(key: &'static str, value: impl Into<String>) -> Self {
        Self::InvalidValue {
            key,
            value: value.into(),
        }
    }
}
