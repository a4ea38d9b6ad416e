//! Engine errors and the accumulated error list.

use std::fmt;

use thiserror::Error;

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors raised by the snapshot engine core.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A model-store lookup missed.
    #[error("{schema} model not found: {id}")]
    NotFound {
        /// Schema name of the missing model.
        schema: &'static str,
        /// The identifier that missed.
        id: String,
    },

    /// Repository initialization over an existing repository.
    #[error("a repository already exists with this configuration")]
    AlreadyExists,

    /// A typed read hit a record of a different schema.
    #[error("model schema mismatch: wanted {wanted}, got {got}")]
    SchemaMismatch {
        /// Schema the caller asked for.
        wanted: &'static str,
        /// Schema actually stored.
        got: String,
    },

    /// A typed read hit a record written under a different model version.
    #[error("model version mismatch: store expects {expected}, record has {actual}")]
    VersionMismatch {
        /// Version the store is configured with.
        expected: u32,
        /// Version found on the record.
        actual: u32,
    },

    /// A caller used a reserved tag key.
    #[error("reserved tag key: {key}")]
    BadTagKey {
        /// The offending key.
        key: String,
    },

    /// A model operation was attempted with the unknown schema.
    #[error("unrecognized model schema")]
    UnknownSchema,

    /// A model was missing a required identifier.
    #[error("invalid model: {message}")]
    InvalidModel {
        /// Description of the problem.
        message: String,
    },

    /// A collection was malformed, or the merge produced no unique root.
    #[error("invalid collection: {message}")]
    InvalidCollection {
        /// Description of the problem.
        message: String,
    },

    /// Base snapshot traversal exceeded the depth bound.
    #[error("base snapshot tree too tall at {path}")]
    BaseTreeTooDeep {
        /// The directory path where the bound was hit.
        path: String,
    },

    /// A restored stream carried an unexpected frame version.
    #[error("unexpected data format {got}, expected {expected}")]
    FrameVersionMismatch {
        /// The version this reader accepts.
        expected: u32,
        /// The version found on the stream.
        got: u32,
    },

    /// The repository handle was already closed.
    #[error("repository is closed")]
    Closed,

    /// The snapshot layer failed in a way the engine cannot interpret.
    #[error("snapshot layer failure: {message}")]
    Fatal {
        /// The underlying failure.
        message: String,
    },

    /// Multiple accumulated errors.
    #[error("{list}")]
    Multiple {
        /// The accumulated errors.
        list: ErrorList,
    },

    /// Error from the snapshot or manifest store.
    #[error(transparent)]
    Store(#[from] cairn_store::StoreError),

    /// Error from path handling.
    #[error(transparent)]
    Path(#[from] cairn_path::PathError),

    /// Error from selector handling.
    #[error(transparent)]
    Select(#[from] cairn_select::SelectError),

    /// Error from details catalog serialization.
    #[error(transparent)]
    Details(#[from] cairn_details::CatalogError),

    /// Model body serialization failed.
    #[error("model codec error: {0}")]
    Codec(#[from] serde_json::Error),
}

impl EngineError {
    /// Creates a not-found error.
    pub fn not_found(schema: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            schema,
            id: id.into(),
        }
    }

    /// Creates a bad-tag-key error.
    pub fn bad_tag_key(key: impl Into<String>) -> Self {
        Self::BadTagKey { key: key.into() }
    }

    /// Creates an invalid-model error.
    pub fn invalid_model(message: impl Into<String>) -> Self {
        Self::InvalidModel {
            message: message.into(),
        }
    }

    /// Creates an invalid-collection error.
    pub fn invalid_collection(message: impl Into<String>) -> Self {
        Self::InvalidCollection {
            message: message.into(),
        }
    }

    /// Creates a fatal snapshot-layer error.
    pub fn fatal(message: impl Into<String>) -> Self {
        Self::Fatal {
            message: message.into(),
        }
    }

    /// Whether this error is (or wraps) a cancellation.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Store(e) if e.is_cancelled())
    }
}

/// An accumulator for per-item errors.
///
/// Operations collect item failures here and keep going; the terminal
/// [`ErrorList::into_result`] yields `Ok` iff nothing accumulated.
#[derive(Debug, Default)]
pub struct ErrorList {
    errors: Vec<EngineError>,
}

impl ErrorList {
    /// Creates an empty list.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an error.
    pub fn push(&mut self, err: EngineError) {
        self.errors.push(err);
    }

    /// Whether nothing accumulated.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// Number of accumulated errors.
    #[must_use]
    pub fn len(&self) -> usize {
        self.errors.len()
    }

    /// The accumulated errors.
    #[must_use]
    pub fn errors(&self) -> &[EngineError] {
        &self.errors
    }

    /// `Ok` iff the list is empty; one error is returned as itself.
    pub fn into_result(mut self) -> EngineResult<()> {
        match self.errors.len() {
            0 => Ok(()),
            1 => Err(self.errors.remove(0)),
            _ => Err(EngineError::Multiple { list: self }),
        }
    }
}

impl fmt::Display for ErrorList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} errors occurred: ", self.errors.len())?;

        for (i, err) in self.errors.iter().enumerate() {
            if i > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{err}")?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_list_is_ok() {
        assert!(ErrorList::new().into_result().is_ok());
    }

    #[test]
    fn single_error_returned_as_itself() {
        let mut list = ErrorList::new();
        list.push(EngineError::AlreadyExists);

        assert!(matches!(
            list.into_result(),
            Err(EngineError::AlreadyExists)
        ));
    }

    #[test]
    fn multiple_errors_joined() {
        let mut list = ErrorList::new();
        list.push(EngineError::AlreadyExists);
        list.push(EngineError::UnknownSchema);

        let err = list.into_result().unwrap_err();
        let text = err.to_string();
        assert!(text.contains("2 errors"));
        assert!(text.contains("already exists"));
    }
}
