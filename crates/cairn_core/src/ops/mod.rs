//! Backup and restore operations.

mod backup;
mod restore;

pub use backup::{BackupOperation, BackupOptions, BackupResults};
pub use restore::{RestoreOperation, RestoreResults};

use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle of an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpStatus {
    /// Constructed, not yet run.
    Pending,
    /// Currently running.
    Running,
    /// Finished; the run produced data. Per-item errors may have occurred.
    Completed,
    /// Finished without errors, but nothing was produced.
    NoData,
    /// Aborted by a non-recoverable error.
    Failed,
}

impl OpStatus {
    /// The stable name of the status.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::NoData => "no_data",
            Self::Failed => "failed",
        }
    }

    /// Whether the operation ended without a hard failure.
    #[must_use]
    pub const fn succeeded(self) -> bool {
        matches!(self, Self::Completed | Self::NoData)
    }
}

impl fmt::Display for OpStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
