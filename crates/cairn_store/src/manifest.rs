//! The opaque manifest store the model layer builds on.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StoreResult;

/// Identifier of a manifest record, reassigned on every rewrite.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ManifestId(pub String);

impl ManifestId {
    /// Creates a manifest ID from its raw form.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The raw ID value.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ManifestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Metadata of a stored manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestMeta {
    /// The manifest's current ID.
    pub id: ManifestId,
    /// The manifest's labels.
    pub labels: BTreeMap<String, String>,
    /// When the manifest was written.
    pub created_at: DateTime<Utc>,
}

/// Mutations staged inside a write session.
pub trait ManifestWriter {
    /// Stages a new manifest, returning the ID it will have on commit.
    fn put(&mut self, labels: BTreeMap<String, String>, body: Vec<u8>) -> StoreResult<ManifestId>;

    /// Stages the deletion of a manifest. Missing IDs are a no-op.
    fn delete(&mut self, id: &ManifestId) -> StoreResult<()>;
}

/// A label-tagged record store with transactional writes.
///
/// All mutation happens inside [`ManifestStore::session`]: when the session
/// body returns an error, none of its staged writes become visible, and IDs
/// handed out by the staged `put`s never resolve.
pub trait ManifestStore: Send + Sync {
    /// Fetches a manifest's labels and body by ID.
    fn get(&self, id: &ManifestId) -> StoreResult<(BTreeMap<String, String>, Vec<u8>)>;

    /// Lists manifests whose labels are a superset of the filter.
    fn find(&self, labels: &BTreeMap<String, String>) -> StoreResult<Vec<ManifestMeta>>;

    /// Runs a write session, committing its staged mutations only on success.
    fn session(
        &self,
        body: &mut dyn FnMut(&mut dyn ManifestWriter) -> StoreResult<()>,
    ) -> StoreResult<()>;
}

/// Whether `labels` contains every key/value pair of `filter`.
#[must_use]
pub fn labels_match(labels: &BTreeMap<String, String>, filter: &BTreeMap<String, String>) -> bool {
    filter
        .iter()
        .all(|(k, v)| labels.get(k).is_some_and(|have| have == v))
}
