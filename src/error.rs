//! Unified error handling for the run-classifier library.
//!
//! The classification stages themselves are infallible: insufficient or
//! malformed data degrades to defaults instead of raising. Errors only come
//! from storage access and configuration parsing.

use thiserror::Error;

/// Unified error type for run-classifier operations.
#[derive(Debug, Error)]
pub enum ClassifyError {
    /// Underlying SQLite read or write failed
    #[cfg(feature = "persistence")]
    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    /// A persisted label could not be mapped back to a run type
    #[error("Unknown run type '{value}'")]
    InvalidRunType { value: String },

    /// Configuration is out of range
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Configuration JSON could not be parsed
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ClassifyError {
    pub(crate) fn config(message: impl Into<String>) -> Self {
        ClassifyError::Config {
            message: message.into(),
        }
    }
}

/// Result type alias for run-classifier operations.
pub type Result<T> = std::result::Result<T, ClassifyError>;
