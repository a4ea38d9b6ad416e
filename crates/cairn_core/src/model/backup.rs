//! Persisted backup and repository records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use cairn_select::Selector;
use cairn_store::SnapshotId;

use crate::model::{BaseModel, Model};
use crate::stats::BackupStats;

/// One persisted result of a backup operation, referencing exactly one
/// snapshot and one details blob.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupModel {
    /// Identity and location tags.
    pub base: BaseModel,
    /// When the backup completed.
    pub created_at: DateTime<Utc>,
    /// The item snapshot this backup references.
    pub snapshot_id: SnapshotId,
    /// The details blob recorded for this backup.
    pub details_id: String,
    /// The selector the backup ran with.
    pub selector: Selector,
    /// Aggregated run statistics.
    pub stats: BackupStats,
}

impl Model for BackupModel {
    fn base(&self) -> &BaseModel {
        &self.base
    }

    fn base_mut(&mut self) -> &mut BaseModel {
        &mut self.base
    }
}

/// The repository identity record, written once at initialization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepositoryModel {
    /// Identity and tags.
    pub base: BaseModel,
    /// The repository's UUID.
    pub repo_id: String,
    /// Repository format version.
    pub version: String,
    /// The model version records in this repository are written with.
    pub model_version: u32,
    /// When the repository was initialized.
    pub created_at: DateTime<Utc>,
}

impl Model for RepositoryModel {
    fn base(&self) -> &BaseModel {
        &self.base
    }

    fn base_mut(&mut self) -> &mut BaseModel {
        &mut self.base
    }
}
