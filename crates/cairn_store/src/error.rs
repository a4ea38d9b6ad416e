//! Store errors.

use std::io;

use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors raised by snapshot engines and manifest stores.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A snapshot, manifest, or content blob was not found.
    #[error("{what} not found: {id}")]
    NotFound {
        /// What kind of record was missed.
        what: &'static str,
        /// The identifier that missed.
        id: String,
    },

    /// Stored state failed an integrity check.
    #[error("store corruption: {message}")]
    Corrupt {
        /// Description of the corruption.
        message: String,
    },

    /// The operation was cancelled.
    #[error("cancelled while processing {path}")]
    Cancelled {
        /// The path being processed when cancellation was observed.
        path: String,
    },

    /// An entry source (collection item or base directory) failed.
    #[error("entry source failed: {message}")]
    Source {
        /// Description of the failure.
        message: String,
    },

    /// I/O error from a backing file or reader.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Serialization of store metadata failed.
    #[error("store metadata codec error: {0}")]
    Codec(#[from] serde_json::Error),
}

impl StoreError {
    /// Creates a not-found error.
    pub fn not_found(what: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            what,
            id: id.into(),
        }
    }

    /// Creates a corruption error.
    pub fn corrupt(message: impl Into<String>) -> Self {
        Self::Corrupt {
            message: message.into(),
        }
    }

    /// Creates a cancellation error carrying the in-flight path.
    pub fn cancelled(path: impl Into<String>) -> Self {
        Self::Cancelled { path: path.into() }
    }

    /// Creates an entry-source error.
    pub fn source(message: impl Into<String>) -> Self {
        Self::Source {
            message: message.into(),
        }
    }

    /// Whether this error is a cancellation.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}
