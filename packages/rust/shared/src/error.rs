//! Error types for objectivedb.
//!
//! Library crates use [`ObjectiveDbError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all objectivedb operations.
#[derive(Debug, thiserror::Error)]
pub enum ObjectiveDbError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Network/HTTP error during search, fetch, or PDF checks.
    #[error("network error: {0}")]
    Network(String),

    /// Content or search-response parsing error.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Database or storage layer error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (malformed record, invalid reference data, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },

    /// HTML-to-text conversion error.
    #[error("conversion error: {0}")]
    Conversion(String),

    /// Illegal audit state transition.
    #[error("audit error: {message}")]
    Audit { message: String },

    /// Processing was cancelled cooperatively.
    #[error("cancelled")]
    Cancelled,
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, ObjectiveDbError>;

impl ObjectiveDbError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a parse error from any displayable message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Create an audit error from any displayable message.
    pub fn audit(msg: impl Into<String>) -> Self {
        Self::Audit {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formatting() {
        let err = ObjectiveDbError::config("missing search endpoint");
        assert_eq!(err.to_string(), "config error: missing search endpoint");

        let err = ObjectiveDbError::audit("audit abc already closed");
        assert!(err.to_string().contains("already closed"));

        assert_eq!(ObjectiveDbError::Cancelled.to_string(), "cancelled");
    }
}
