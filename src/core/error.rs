//! Defines the custom error types for the `core` module.

use std::path::PathBuf;
use thiserror::Error;

/// The primary error type for the `core` module.
///
/// Per-entry traversal failures are not errors at this level; they travel as
/// [`super::EntryError`] values inside the scan progress.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A scan request was rejected before any traversal started.
    #[error("Invalid scan request: {0}")]
    InvalidRequest(#[from] InvalidRequest),

    /// The scan root could not be traversed at all.
    #[error("Cannot traverse scan root {path}: {source}")]
    FatalRoot {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A chunked content read failed part way through a file.
    #[error("Read error for path {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Represents an I/O error outside of scanning and reading, e.g. removal.
    #[error("I/O error for path {1}: {0}")]
    Io(#[source] std::io::Error, PathBuf),

    /// The scan worker panicked or was aborted.
    #[error("Task join error: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Reasons a request is refused synchronously.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidRequest {
    #[error("threshold must not be negative (got {0})")]
    NegativeThreshold(i64),

    #[error("root path does not exist: {0}")]
    RootNotFound(PathBuf),

    #[error("root path is not a directory: {0}")]
    NotADirectory(PathBuf),

    #[error("chunk size must be greater than zero")]
    ZeroChunkSize,

    #[error("channel capacity must be greater than zero")]
    ZeroChannelCapacity,
}

impl CoreError {
    /// `true` for errors that were raised before a session ever ran.
    pub fn is_invalid_request(&self) -> bool {
        matches!(self, CoreError::InvalidRequest(_))
    }
}
