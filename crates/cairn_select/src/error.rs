//! Selector errors.

use cairn_path::ServiceType;
use thiserror::Error;

/// Result type for selector operations.
pub type SelectResult<T> = Result<T, SelectError>;

/// Errors raised by selector construction and casting.
#[derive(Debug, Error)]
pub enum SelectError {
    /// A generic selector was cast to the wrong service type.
    #[error("selector service mismatch: wanted {wanted}, got {got}")]
    ServiceMismatch {
        /// The service the cast expected.
        wanted: ServiceType,
        /// The service the selector carries.
        got: ServiceType,
    },

    /// A serialized scope referenced an unknown category key.
    #[error("unknown scope category: {name}")]
    UnknownCategory {
        /// The offending category key.
        name: String,
    },
}

impl SelectError {
    /// Creates a service-mismatch error.
    #[must_use]
    pub fn service_mismatch(wanted: ServiceType, got: ServiceType) -> Self {
        Self::ServiceMismatch { wanted, got }
    }

    /// Creates an unknown-category error.
    pub fn unknown_category(name: impl Into<String>) -> Self {
        Self::UnknownCategory { name: name.into() }
    }
}
