//! Typed models persisted through the manifest store.

mod backup;
mod store;

pub use backup::{BackupModel, RepositoryModel};
pub use store::{ModelStore, CURRENT_MODEL_VERSION};

use std::collections::BTreeMap;
use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use cairn_store::ManifestId;

/// Engine-assigned identifier of a model, stable across updates.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StableId(pub String);

impl StableId {
    /// Creates a stable ID from its raw form.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generates a fresh stable ID.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// The raw ID value.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the ID is unset.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for StableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The schema of a model-store record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Schema {
    /// No schema; rejected by every operation.
    Unknown,
    /// A backup operation record.
    BackupOp,
    /// A restore operation record.
    RestoreOp,
    /// A persisted backup.
    Backup,
    /// A details catalog reference.
    Details,
    /// The repository identity record.
    Repository,
}

impl Schema {
    /// The stable label value of a schema.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::BackupOp => "backup_op",
            Self::RestoreOp => "restore_op",
            Self::Backup => "backup",
            Self::Details => "details",
            Self::Repository => "repository",
        }
    }
}

impl fmt::Display for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity and tags shared by every persisted model.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BaseModel {
    /// Engine-assigned stable ID, set on first put.
    pub stable_id: Option<StableId>,
    /// Underlying manifest ID, reassigned on every update.
    pub store_id: Option<ManifestId>,
    /// Caller-owned tags. Reserved keys are rejected.
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
}

/// A value persistable through the [`ModelStore`].
pub trait Model: Serialize + DeserializeOwned + Send {
    /// The model's identity block.
    fn base(&self) -> &BaseModel;

    /// Mutable access to the identity block.
    fn base_mut(&mut self) -> &mut BaseModel;
}
