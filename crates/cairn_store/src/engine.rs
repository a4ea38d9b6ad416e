//! The snapshot engine interface.

use std::collections::BTreeMap;
use std::fmt;
use std::io::Read;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use cairn_path::Path;

use crate::cancel::CancelToken;
use crate::error::StoreResult;
use crate::upload::{ContentRef, StreamDir, UploadProgress};

/// Identifier of an immutable snapshot held by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SnapshotId(pub String);

impl SnapshotId {
    /// Creates a snapshot ID from its raw form.
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

impl fmt::Display for SnapshotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Statistics returned by an upload.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotStats {
    /// Files finalized into the snapshot, cached reuse included.
    pub file_count: u64,
    /// Files reused from the content store without re-hashing.
    pub cached_files: u64,
    /// Bytes hashed from streamed sources.
    pub hashed_bytes: u64,
    /// Bytes newly written to the content store.
    pub uploaded_bytes: u64,
    /// Files that failed to read or store.
    pub error_count: u64,
}

/// Metadata of a stored snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotManifest {
    /// The snapshot's ID.
    pub id: SnapshotId,
    /// Caller-supplied tags, used to locate incremental bases.
    pub tags: BTreeMap<String, String>,
    /// Non-empty when the snapshot is a checkpoint of an interrupted run.
    pub incomplete_reason: String,
    /// When the snapshot was created.
    pub created_at: DateTime<Utc>,
}

/// A directory inside a stored snapshot.
pub trait BaseDir: Send + Sync {
    /// Encoded directory name.
    fn name(&self) -> &str;

    /// The directory's immediate entries.
    fn entries(&self) -> StoreResult<Vec<BaseEntry>>;
}

/// One entry of a stored directory.
pub enum BaseEntry {
    /// A subdirectory.
    Dir(Arc<dyn BaseDir>),
    /// A file.
    File(BaseFile),
}

/// A file inside a stored snapshot.
#[derive(Debug, Clone)]
pub struct BaseFile {
    /// Encoded file name.
    pub name: String,
    /// The stored content.
    pub content: ContentRef,
    /// Modification time recorded at upload.
    pub mod_time: DateTime<Utc>,
}

/// An item streamed out of a snapshot during restore.
pub struct RestoredItem {
    /// The item's canonical path.
    pub path: Path,
    /// The item body as stored (frame prefix included).
    pub reader: Box<dyn Read + Send>,
}

/// Concurrency-safe byte counter shared across restore reads.
#[derive(Debug, Default)]
pub struct ByteCounter(AtomicU64);

impl ByteCounter {
    /// Creates a zeroed counter.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds to the running total.
    pub fn add(&self, bytes: u64) {
        self.0.fetch_add(bytes, Ordering::Relaxed);
    }

    /// The current total.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// A content-addressed snapshot store.
///
/// The engine owns the on-store layout; Cairn hands it virtual directory
/// trees to upload and reads items back by path. Implementations must be
/// safe to share across threads.
pub trait SnapshotEngine: Send + Sync {
    /// Uploads a virtual directory tree, returning the snapshot ID and stats.
    ///
    /// `progress` receives finalize callbacks, possibly concurrently.
    fn upload(
        &self,
        root: Arc<dyn StreamDir>,
        tags: &BTreeMap<String, String>,
        progress: Arc<dyn UploadProgress>,
        ctx: &CancelToken,
    ) -> StoreResult<(SnapshotId, SnapshotStats)>;

    /// Opens the root directory of a stored snapshot.
    fn open_root(&self, id: &SnapshotId) -> StoreResult<Arc<dyn BaseDir>>;

    /// Streams the items at the given paths out of a snapshot.
    fn restore_items(
        &self,
        id: &SnapshotId,
        paths: &[Path],
        counter: &ByteCounter,
        ctx: &CancelToken,
    ) -> StoreResult<Vec<RestoredItem>>;

    /// Lists snapshots whose tags are a superset of the filter.
    fn find_snapshots(
        &self,
        tag_filter: &BTreeMap<String, String>,
    ) -> StoreResult<Vec<SnapshotManifest>>;

    /// Deletes a snapshot. Content blobs may be shared and are left in place.
    fn delete_snapshot(&self, id: &SnapshotId) -> StoreResult<()>;
}
