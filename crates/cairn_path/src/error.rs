//! Error types for path construction and parsing.

use thiserror::Error;

/// Result type for path operations.
pub type PathResult<T> = Result<T, PathError>;

/// Errors that can occur while building or parsing paths.
#[derive(Debug, Error)]
pub enum PathError {
    /// A path element was empty.
    #[error("empty path element")]
    EmptyElement,

    /// The path does not have enough elements to be canonical.
    #[error("path too short: {path}")]
    TooShort {
        /// The offending raw path.
        path: String,
    },

    /// The service element was not recognized.
    #[error("unknown service: {name}")]
    UnknownService {
        /// The raw service element.
        name: String,
    },

    /// The category element was not recognized for the service.
    #[error("unknown category {name} for service {service}")]
    UnknownCategory {
        /// The raw category element.
        name: String,
        /// The service the category was parsed under.
        service: String,
    },

    /// A stored element could not be base64-decoded.
    #[error("malformed encoded element: {element}")]
    BadEncoding {
        /// The offending encoded element.
        element: String,
    },

    /// Attempted to pop the directory of a path with no popable element.
    #[error("cannot take dir of {path}")]
    NoParent {
        /// The path whose parent was requested.
        path: String,
    },
}

impl PathError {
    /// Creates a too-short error.
    pub fn too_short(path: impl Into<String>) -> Self {
        Self::TooShort { path: path.into() }
    }

    /// Creates an unknown-service error.
    pub fn unknown_service(name: impl Into<String>) -> Self {
        Self::UnknownService { name: name.into() }
    }

    /// Creates an unknown-category error.
    pub fn unknown_category(name: impl Into<String>, service: impl Into<String>) -> Self {
        Self::UnknownCategory {
            name: name.into(),
            service: service.into(),
        }
    }

    /// Creates a bad-encoding error.
    pub fn bad_encoding(element: impl Into<String>) -> Self {
        Self::BadEncoding {
            element: element.into(),
        }
    }
}
