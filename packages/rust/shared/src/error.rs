//! Error types for Storyloom.
//!
//! Library crates use [`StoryloomError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all Storyloom operations.
#[derive(Debug, thiserror::Error)]
pub enum StoryloomError {
    /// Request rejected before a generation session started (empty prompt,
    /// out-of-range sampling parameter, unknown book, ...).
    #[error("validation error: {message}")]
    Validation { message: String },

    /// The inference collaborator failed mid-stream; the draft is discarded.
    #[error("stream error: {0}")]
    Stream(String),

    /// The segment write failed; nothing was committed.
    #[error("persistence error: {0}")]
    Persistence(String),

    /// The post-commit reload failed. The segment write itself stands.
    #[error("refresh error: {0}")]
    Refresh(String),

    /// Database or storage layer error outside the commit path.
    #[error("storage error: {0}")]
    Storage(String),

    /// Network/HTTP error talking to the inference service.
    #[error("network error: {0}")]
    Network(String),

    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, StoryloomError>;

impl StoryloomError {
    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
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
