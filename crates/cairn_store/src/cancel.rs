//! Cooperative cancellation for long-running store operations.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::{StoreError, StoreResult};

/// A cloneable cancellation token polled at item and directory boundaries.
///
/// Operations never enforce internal timeouts; callers cancel the token from
/// another thread to stop work at the next poll.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    /// Creates a token that is not cancelled.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation. Idempotent.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Fails with a cancellation error naming the in-flight path.
    pub fn check(&self, path: &str) -> StoreResult<()> {
        if self.is_cancelled() {
            return Err(StoreError::cancelled(path));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancel_is_observed_by_clones() {
        let token = CancelToken::new();
        let clone = token.clone();

        assert!(token.check("some/path").is_ok());

        clone.cancel();
        assert!(token.is_cancelled());

        let err = token.check("some/path").unwrap_err();
        assert!(err.is_cancelled());
        assert!(err.to_string().contains("some/path"));
    }
}
