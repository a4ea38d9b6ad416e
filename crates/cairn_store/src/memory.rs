//! In-memory snapshot engine and manifest store.
//!
//! These backends hold everything in process memory. They are the test
//! substrate for the whole engine and also back ephemeral repositories.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use cairn_path::encode::encode_element;
use cairn_path::Path;

use crate::cancel::CancelToken;
use crate::engine::{
    BaseDir, BaseEntry, BaseFile, ByteCounter, RestoredItem, SnapshotEngine, SnapshotId,
    SnapshotManifest, SnapshotStats,
};
use crate::error::{StoreError, StoreResult};
use crate::manifest::{
    labels_match, ManifestId, ManifestMeta, ManifestStore, ManifestWriter,
};
use crate::upload::{read_all, ContentRef, Entry, FileSource, StreamDir, UploadProgress};

/// Computes the content address of a blob.
fn content_id(data: &[u8]) -> String {
    format!("{:x}", Sha256::digest(data))
}

/// A file stored inside a snapshot directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct StoredFile {
    pub(crate) content: ContentRef,
    pub(crate) mod_time: DateTime<Utc>,
}

/// A directory stored inside a snapshot. Names are encoded.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub(crate) struct StoredDir {
    pub(crate) name: String,
    pub(crate) dirs: BTreeMap<String, StoredDir>,
    pub(crate) files: BTreeMap<String, StoredFile>,
}

impl StoredDir {
    fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Self::default()
        }
    }
}

/// Read-side adapter exposing a stored directory as a [`BaseDir`].
struct MemDir {
    node: StoredDir,
}

impl BaseDir for MemDir {
    fn name(&self) -> &str {
        &self.node.name
    }

    fn entries(&self) -> StoreResult<Vec<BaseEntry>> {
        let mut out = Vec::with_capacity(self.node.dirs.len() + self.node.files.len());

        for dir in self.node.dirs.values() {
            out.push(BaseEntry::Dir(Arc::new(MemDir { node: dir.clone() })));
        }

        for (name, file) in &self.node.files {
            out.push(BaseEntry::File(BaseFile {
                name: name.clone(),
                content: file.content.clone(),
                mod_time: file.mod_time,
            }));
        }

        Ok(out)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct StoredSnapshot {
    pub(crate) manifest: SnapshotManifest,
    pub(crate) root: StoredDir,
}

/// An in-memory content-addressed snapshot engine.
#[derive(Default)]
pub struct MemoryEngine {
    blobs: RwLock<HashMap<String, Vec<u8>>>,
    snapshots: RwLock<BTreeMap<String, StoredSnapshot>>,
}

impl MemoryEngine {
    /// Creates an empty engine.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks a stored snapshot as an incomplete checkpoint.
    ///
    /// Incomplete snapshots are skipped during base discovery; this exists so
    /// tests and tools can stage that state.
    pub fn mark_incomplete(&self, id: &SnapshotId, reason: &str) -> StoreResult<()> {
        let mut snapshots = self.snapshots.write();

        let snap = snapshots
            .get_mut(id.as_str())
            .ok_or_else(|| StoreError::not_found("snapshot", id.as_str()))?;

        snap.manifest.incomplete_reason = reason.to_string();
        Ok(())
    }

    pub(crate) fn dump_snapshots(&self) -> Vec<StoredSnapshot> {
        self.snapshots.read().values().cloned().collect()
    }

    pub(crate) fn load_snapshot(&self, snap: StoredSnapshot) {
        self.snapshots
            .write()
            .insert(snap.manifest.id.as_str().to_string(), snap);
    }

    pub(crate) fn blob_ids(&self) -> Vec<String> {
        self.blobs.read().keys().cloned().collect()
    }

    pub(crate) fn blob(&self, id: &str) -> Option<Vec<u8>> {
        self.blobs.read().get(id).cloned()
    }

    pub(crate) fn load_blob(&self, id: String, data: Vec<u8>) {
        self.blobs.write().insert(id, data);
    }

    fn walk_dir(
        &self,
        dir: &dyn StreamDir,
        rel: &[String],
        stats: &mut SnapshotStats,
        progress: &dyn UploadProgress,
        ctx: &CancelToken,
    ) -> StoreResult<StoredDir> {
        ctx.check(&rel.join("/"))?;

        let mut out = StoredDir::named(dir.name());

        dir.enumerate(ctx, &mut |entry| {
            match entry {
                Entry::Dir(child) => {
                    let mut child_rel = rel.to_vec();
                    child_rel.push(child.name().to_string());

                    let sub = self.walk_dir(child.as_ref(), &child_rel, stats, progress, ctx)?;
                    out.dirs.insert(sub.name.clone(), sub);
                }

                Entry::Base(base) => {
                    let mut child_rel = rel.to_vec();
                    child_rel.push(base.name().to_string());

                    let sub = self.copy_base(base.as_ref(), &child_rel, stats, progress, ctx)?;
                    out.dirs.insert(sub.name.clone(), sub);
                }

                Entry::File(file) => {
                    let mut file_rel = rel.to_vec();
                    file_rel.push(file.name.clone());
                    let rel_path = file_rel.join("/");

                    match file.source {
                        FileSource::Stream(reader) => {
                            match read_all(reader, ctx, &rel_path) {
                                Ok(bytes) => {
                                    let len = bytes.len() as u64;
                                    let id = content_id(&bytes);

                                    stats.hashed_bytes += len;
                                    progress.finished_hashing(&rel_path, len);

                                    {
                                        let mut blobs = self.blobs.write();
                                        if !blobs.contains_key(&id) {
                                            blobs.insert(id.clone(), bytes);
                                            stats.uploaded_bytes += len;
                                        }
                                    }

                                    out.files.insert(
                                        file.name.clone(),
                                        StoredFile {
                                            content: ContentRef { id, size: len },
                                            mod_time: file.mod_time,
                                        },
                                    );

                                    stats.file_count += 1;
                                    progress.finished_file(&rel_path, Ok(()));
                                }
                                Err(e) if e.is_cancelled() => return Err(e),
                                Err(e) => {
                                    // Per-item failures don't abort the upload.
                                    stats.error_count += 1;
                                    progress.finished_file(&rel_path, Err(&e));
                                }
                            }
                        }

                        FileSource::Cached(content) => {
                            if !self.blobs.read().contains_key(&content.id) {
                                return Err(StoreError::corrupt(format!(
                                    "cached content {} not in store",
                                    content.id
                                )));
                            }

                            out.files.insert(
                                file.name.clone(),
                                StoredFile {
                                    content,
                                    mod_time: file.mod_time,
                                },
                            );

                            stats.file_count += 1;
                            stats.cached_files += 1;
                            progress.finished_file(&rel_path, Ok(()));
                        }
                    }
                }
            }

            Ok(())
        })?;

        Ok(out)
    }

    fn copy_base(
        &self,
        base: &dyn BaseDir,
        rel: &[String],
        stats: &mut SnapshotStats,
        progress: &dyn UploadProgress,
        ctx: &CancelToken,
    ) -> StoreResult<StoredDir> {
        ctx.check(&rel.join("/"))?;

        let mut out = StoredDir::named(base.name());

        for entry in base.entries()? {
            match entry {
                BaseEntry::Dir(child) => {
                    let mut child_rel = rel.to_vec();
                    child_rel.push(child.name().to_string());

                    let sub = self.copy_base(child.as_ref(), &child_rel, stats, progress, ctx)?;
                    out.dirs.insert(sub.name.clone(), sub);
                }

                BaseEntry::File(file) => {
                    let mut file_rel = rel.to_vec();
                    file_rel.push(file.name.clone());
                    let rel_path = file_rel.join("/");

                    if !self.blobs.read().contains_key(&file.content.id) {
                        return Err(StoreError::corrupt(format!(
                            "base content {} not in store",
                            file.content.id
                        )));
                    }

                    out.files.insert(
                        file.name.clone(),
                        StoredFile {
                            content: file.content,
                            mod_time: file.mod_time,
                        },
                    );

                    stats.file_count += 1;
                    stats.cached_files += 1;
                    progress.finished_file(&rel_path, Ok(()));
                }
            }
        }

        Ok(out)
    }

    fn lookup_file(root: &StoredDir, path: &Path) -> StoreResult<StoredFile> {
        let elements = path.elements();

        let missing = || StoreError::not_found("item", path.to_string());

        if elements.len() < 2 || root.name != encode_element(elements[0]) {
            return Err(missing());
        }

        let mut dir = root;
        for elem in &elements[1..elements.len() - 1] {
            dir = dir.dirs.get(&encode_element(elem)).ok_or_else(missing)?;
        }

        let last = encode_element(elements[elements.len() - 1]);
        dir.files.get(&last).cloned().ok_or_else(missing)
    }
}

impl SnapshotEngine for MemoryEngine {
    fn upload(
        &self,
        root: Arc<dyn StreamDir>,
        tags: &BTreeMap<String, String>,
        progress: Arc<dyn UploadProgress>,
        ctx: &CancelToken,
    ) -> StoreResult<(SnapshotId, SnapshotStats)> {
        let mut stats = SnapshotStats::default();

        let stored = self.walk_dir(root.as_ref(), &[], &mut stats, progress.as_ref(), ctx)?;

        let manifest = SnapshotManifest {
            id: SnapshotId::new(format!("snap-{}", Uuid::new_v4())),
            tags: tags.clone(),
            incomplete_reason: String::new(),
            created_at: Utc::now(),
        };

        let id = manifest.id.clone();

        self.snapshots.write().insert(
            id.as_str().to_string(),
            StoredSnapshot {
                manifest,
                root: stored,
            },
        );

        Ok((id, stats))
    }

    fn open_root(&self, id: &SnapshotId) -> StoreResult<Arc<dyn BaseDir>> {
        let snapshots = self.snapshots.read();

        let snap = snapshots
            .get(id.as_str())
            .ok_or_else(|| StoreError::not_found("snapshot", id.as_str()))?;

        Ok(Arc::new(MemDir {
            node: snap.root.clone(),
        }))
    }

    fn restore_items(
        &self,
        id: &SnapshotId,
        paths: &[Path],
        counter: &ByteCounter,
        ctx: &CancelToken,
    ) -> StoreResult<Vec<RestoredItem>> {
        let snapshots = self.snapshots.read();

        let snap = snapshots
            .get(id.as_str())
            .ok_or_else(|| StoreError::not_found("snapshot", id.as_str()))?;

        let mut out = Vec::with_capacity(paths.len());

        for path in paths {
            ctx.check(&path.to_string())?;

            let file = Self::lookup_file(&snap.root, path)?;

            let data = self
                .blobs
                .read()
                .get(&file.content.id)
                .cloned()
                .ok_or_else(|| {
                    StoreError::corrupt(format!("content {} not in store", file.content.id))
                })?;

            counter.add(data.len() as u64);

            out.push(RestoredItem {
                path: path.clone(),
                reader: Box::new(std::io::Cursor::new(data)),
            });
        }

        Ok(out)
    }

    fn find_snapshots(
        &self,
        tag_filter: &BTreeMap<String, String>,
    ) -> StoreResult<Vec<SnapshotManifest>> {
        let mut found: Vec<SnapshotManifest> = self
            .snapshots
            .read()
            .values()
            .filter(|s| labels_match(&s.manifest.tags, tag_filter))
            .map(|s| s.manifest.clone())
            .collect();

        // Newest first so callers can take the front as the preferred base.
        found.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(found)
    }

    fn delete_snapshot(&self, id: &SnapshotId) -> StoreResult<()> {
        self.snapshots.write().remove(id.as_str());
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct StoredManifest {
    pub(crate) id: ManifestId,
    pub(crate) labels: BTreeMap<String, String>,
    pub(crate) body: Vec<u8>,
    pub(crate) created_at: DateTime<Utc>,
}

/// An in-memory manifest store with transactional writes.
#[derive(Default)]
pub struct MemoryManifests {
    records: RwLock<BTreeMap<String, StoredManifest>>,
}

enum StagedOp {
    Put(StoredManifest),
    Delete(ManifestId),
}

struct MemoryWriter {
    staged: Vec<StagedOp>,
}

impl ManifestWriter for MemoryWriter {
    fn put(&mut self, labels: BTreeMap<String, String>, body: Vec<u8>) -> StoreResult<ManifestId> {
        let id = ManifestId::new(format!("m-{}", Uuid::new_v4()));

        self.staged.push(StagedOp::Put(StoredManifest {
            id: id.clone(),
            labels,
            body,
            created_at: Utc::now(),
        }));

        Ok(id)
    }

    fn delete(&mut self, id: &ManifestId) -> StoreResult<()> {
        self.staged.push(StagedOp::Delete(id.clone()));
        Ok(())
    }
}

impl MemoryManifests {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn dump_records(&self) -> Vec<StoredManifest> {
        self.records.read().values().cloned().collect()
    }

    pub(crate) fn load_record(&self, record: StoredManifest) {
        self.records
            .write()
            .insert(record.id.as_str().to_string(), record);
    }
}

impl ManifestStore for MemoryManifests {
    fn get(&self, id: &ManifestId) -> StoreResult<(BTreeMap<String, String>, Vec<u8>)> {
        let records = self.records.read();

        let record = records
            .get(id.as_str())
            .ok_or_else(|| StoreError::not_found("manifest", id.as_str()))?;

        Ok((record.labels.clone(), record.body.clone()))
    }

    fn find(&self, labels: &BTreeMap<String, String>) -> StoreResult<Vec<ManifestMeta>> {
        let mut found: Vec<ManifestMeta> = self
            .records
            .read()
            .values()
            .filter(|r| labels_match(&r.labels, labels))
            .map(|r| ManifestMeta {
                id: r.id.clone(),
                labels: r.labels.clone(),
                created_at: r.created_at,
            })
            .collect();

        found.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(found)
    }

    fn session(
        &self,
        body: &mut dyn FnMut(&mut dyn ManifestWriter) -> StoreResult<()>,
    ) -> StoreResult<()> {
        let mut writer = MemoryWriter { staged: Vec::new() };

        // Staged mutations are discarded wholesale when the body fails.
        body(&mut writer)?;

        let mut records = self.records.write();

        for op in writer.staged {
            match op {
                StagedOp::Put(record) => {
                    records.insert(record.id.as_str().to_string(), record);
                }
                StagedOp::Delete(id) => {
                    records.remove(id.as_str());
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::upload::StaticDir;
    use std::io::Read;

    fn upload_static(engine: &MemoryEngine, files: &[(&str, &[u8])]) -> (SnapshotId, SnapshotStats) {
        let mut dir = StaticDir::new(encode_element("tenant"));
        for (name, body) in files {
            dir = dir.with_file(encode_element(name), Utc::now(), body.to_vec());
        }

        engine
            .upload(
                Arc::new(dir),
                &BTreeMap::new(),
                Arc::new(crate::upload::NoopProgress),
                &CancelToken::new(),
            )
            .unwrap()
    }

    #[test]
    fn upload_counts_hashed_and_uploaded_bytes() {
        let engine = MemoryEngine::new();
        let (_, stats) = upload_static(&engine, &[("a", b"hello"), ("b", b"world!")]);

        assert_eq!(stats.file_count, 2);
        assert_eq!(stats.hashed_bytes, 11);
        assert_eq!(stats.uploaded_bytes, 11);
        assert_eq!(stats.error_count, 0);
    }

    #[test]
    fn duplicate_content_is_stored_once() {
        let engine = MemoryEngine::new();
        let (_, stats) = upload_static(&engine, &[("a", b"same"), ("b", b"same")]);

        assert_eq!(stats.hashed_bytes, 8);
        assert_eq!(stats.uploaded_bytes, 4);
        assert_eq!(engine.blob_ids().len(), 1);
    }

    #[test]
    fn find_snapshots_filters_by_tag_superset() {
        let engine = MemoryEngine::new();

        let mut tags = BTreeMap::new();
        tags.insert("owner".to_string(), "alice".to_string());
        tags.insert("category".to_string(), "mail".to_string());

        let dir = StaticDir::new(encode_element("tenant"));
        engine
            .upload(
                Arc::new(dir),
                &tags,
                Arc::new(crate::upload::NoopProgress),
                &CancelToken::new(),
            )
            .unwrap();

        let mut filter = BTreeMap::new();
        filter.insert("owner".to_string(), "alice".to_string());
        assert_eq!(engine.find_snapshots(&filter).unwrap().len(), 1);

        filter.insert("owner".to_string(), "bob".to_string());
        assert!(engine.find_snapshots(&filter).unwrap().is_empty());
    }

    #[test]
    fn restore_items_by_typed_path() {
        let engine = MemoryEngine::new();

        let root = StaticDir::new(encode_element("tenant")).with_dir(
            StaticDir::new(encode_element("exchange")).with_dir(
                StaticDir::new(encode_element("alice")).with_dir(
                    StaticDir::new(encode_element("mail")).with_dir(
                        StaticDir::new(encode_element("Inbox")).with_file(
                            encode_element("m1"),
                            Utc::now(),
                            b"mail body".to_vec(),
                        ),
                    ),
                ),
            ),
        );

        let (id, _) = engine
            .upload(
                Arc::new(root),
                &BTreeMap::new(),
                Arc::new(crate::upload::NoopProgress),
                &CancelToken::new(),
            )
            .unwrap();

        let path = Path::new(
            "tenant",
            cairn_path::ServiceType::Exchange,
            "alice",
            cairn_path::CategoryType::Mail,
            vec!["Inbox".to_string()],
            Some("m1".to_string()),
        )
        .unwrap();

        let counter = ByteCounter::new();
        let items = engine
            .restore_items(&id, &[path.clone()], &counter, &CancelToken::new())
            .unwrap();

        assert_eq!(items.len(), 1);
        assert_eq!(counter.total(), 9);

        let mut body = Vec::new();
        let mut items = items;
        items.pop().unwrap().reader.read_to_end(&mut body).unwrap();
        assert_eq!(body, b"mail body");

        let missing = path.dir().unwrap().append("m2", true).unwrap();
        assert!(matches!(
            engine.restore_items(&id, &[missing], &counter, &CancelToken::new()),
            Err(StoreError::NotFound { .. })
        ));
    }

    #[test]
    fn cancelled_upload_fails_with_path() {
        let engine = MemoryEngine::new();
        let ctx = CancelToken::new();
        ctx.cancel();

        let dir = StaticDir::new(encode_element("tenant"));
        let err = engine
            .upload(
                Arc::new(dir),
                &BTreeMap::new(),
                Arc::new(crate::upload::NoopProgress),
                &ctx,
            )
            .unwrap_err();

        assert!(err.is_cancelled());
    }

    #[test]
    fn manifest_session_commits_on_success() {
        let store = MemoryManifests::new();
        let mut id = None;

        store
            .session(&mut |w| {
                id = Some(w.put(BTreeMap::new(), b"body".to_vec())?);
                Ok(())
            })
            .unwrap();

        let (_, body) = store.get(&id.unwrap()).unwrap();
        assert_eq!(body, b"body");
    }

    #[test]
    fn failed_session_publishes_nothing() {
        let store = MemoryManifests::new();
        let mut id = None;

        let result = store.session(&mut |w| {
            id = Some(w.put(BTreeMap::new(), b"body".to_vec())?);
            Err(StoreError::corrupt("boom"))
        });

        assert!(result.is_err());
        assert!(matches!(
            store.get(&id.unwrap()),
            Err(StoreError::NotFound { .. })
        ));
    }
}
