//! Operation statistics.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Aggregated statistics of a backup run, persisted with the backup model.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupStats {
    /// Items streamed from the collectors.
    pub items_read: u64,
    /// Items finalized into the snapshot, base reuse included.
    pub items_written: u64,
    /// Bytes hashed from newly streamed content.
    pub hashed_bytes: u64,
    /// Bytes newly written to the content store.
    pub uploaded_bytes: u64,
    /// Items that failed to read or store.
    pub error_count: u64,
    /// Distinct resource owners covered by the run.
    pub resource_owners: u64,
}

/// Wall-clock bounds of an operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartAndEndTime {
    /// When the operation started running.
    pub started_at: Option<DateTime<Utc>>,
    /// When the operation reached a terminal status.
    pub completed_at: Option<DateTime<Utc>>,
}

impl StartAndEndTime {
    /// Duration between start and completion, when both are set.
    #[must_use]
    pub fn duration(&self) -> Option<chrono::Duration> {
        match (self.started_at, self.completed_at) {
            (Some(start), Some(end)) => Some(end - start),
            _ => None,
        }
    }
}
