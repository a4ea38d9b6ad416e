//! Directory-backed snapshot engine and manifest store.
//!
//! Persists content blobs and JSON metadata under a directory so a
//! repository survives across process runs. State is loaded fully at open;
//! every mutation is written back before the call returns.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use cairn_path::Path as ItemPath;

use crate::cancel::CancelToken;
use crate::engine::{
    BaseDir, ByteCounter, RestoredItem, SnapshotEngine, SnapshotId, SnapshotManifest,
    SnapshotStats,
};
use crate::error::{StoreError, StoreResult};
use crate::manifest::{ManifestId, ManifestMeta, ManifestStore, ManifestWriter};
use crate::memory::{MemoryEngine, MemoryManifests, StoredManifest, StoredSnapshot};
use crate::upload::{StreamDir, UploadProgress};

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> StoreResult<T> {
    let data = fs::read(path)?;
    serde_json::from_slice(&data)
        .map_err(|e| StoreError::corrupt(format!("{}: {e}", path.display())))
}

fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> StoreResult<()> {
    let data = serde_json::to_vec_pretty(value)?;

    // Write through a sibling temp file so readers never observe a torn file.
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, data)?;
    fs::rename(&tmp, path)?;

    Ok(())
}

fn json_files(dir: &Path) -> StoreResult<Vec<PathBuf>> {
    let mut out = Vec::new();

    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.extension().is_some_and(|e| e == "json") {
            out.push(path);
        }
    }

    Ok(out)
}

/// A snapshot engine persisting under `<root>/blobs` and `<root>/snapshots`.
pub struct DirEngine {
    inner: MemoryEngine,
    blob_dir: PathBuf,
    snap_dir: PathBuf,
}

impl DirEngine {
    /// Opens (or creates) an engine rooted at the given directory.
    pub fn open(root: impl AsRef<Path>) -> StoreResult<Self> {
        let root = root.as_ref();
        let blob_dir = root.join("blobs");
        let snap_dir = root.join("snapshots");

        fs::create_dir_all(&blob_dir)?;
        fs::create_dir_all(&snap_dir)?;

        let inner = MemoryEngine::new();

        for entry in fs::read_dir(&blob_dir)? {
            let path = entry?.path();
            if !path.is_file() {
                continue;
            }

            let id = path
                .file_name()
                .and_then(|n| n.to_str())
                .ok_or_else(|| StoreError::corrupt(format!("bad blob name {}", path.display())))?
                .to_string();

            inner.load_blob(id, fs::read(&path)?);
        }

        for path in json_files(&snap_dir)? {
            let snap: StoredSnapshot = read_json(&path)?;
            inner.load_snapshot(snap);
        }

        Ok(Self {
            inner,
            blob_dir,
            snap_dir,
        })
    }

    fn persist(&self) -> StoreResult<()> {
        for id in self.inner.blob_ids() {
            let path = self.blob_dir.join(&id);
            if !path.exists() {
                if let Some(data) = self.inner.blob(&id) {
                    fs::write(&path, data)?;
                }
            }
        }

        let snapshots = self.inner.dump_snapshots();

        for snap in &snapshots {
            write_json(
                &self.snap_dir.join(format!("{}.json", snap.manifest.id)),
                snap,
            )?;
        }

        // Drop metadata files for snapshots that no longer exist.
        let live: Vec<String> = snapshots
            .iter()
            .map(|s| format!("{}.json", s.manifest.id))
            .collect();

        for path in json_files(&self.snap_dir)? {
            let keep = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|name| live.iter().any(|l| l == name));

            if !keep {
                fs::remove_file(&path)?;
            }
        }

        Ok(())
    }
}

impl SnapshotEngine for DirEngine {
    fn upload(
        &self,
        root: Arc<dyn StreamDir>,
        tags: &BTreeMap<String, String>,
        progress: Arc<dyn UploadProgress>,
        ctx: &CancelToken,
    ) -> StoreResult<(SnapshotId, SnapshotStats)> {
        let result = self.inner.upload(root, tags, progress, ctx)?;
        self.persist()?;
        Ok(result)
    }

    fn open_root(&self, id: &SnapshotId) -> StoreResult<Arc<dyn BaseDir>> {
        self.inner.open_root(id)
    }

    fn restore_items(
        &self,
        id: &SnapshotId,
        paths: &[ItemPath],
        counter: &ByteCounter,
        ctx: &CancelToken,
    ) -> StoreResult<Vec<RestoredItem>> {
        self.inner.restore_items(id, paths, counter, ctx)
    }

    fn find_snapshots(
        &self,
        tag_filter: &BTreeMap<String, String>,
    ) -> StoreResult<Vec<SnapshotManifest>> {
        self.inner.find_snapshots(tag_filter)
    }

    fn delete_snapshot(&self, id: &SnapshotId) -> StoreResult<()> {
        self.inner.delete_snapshot(id)?;
        self.persist()
    }
}

/// A manifest store persisting under `<root>/manifests`.
pub struct DirManifests {
    inner: MemoryManifests,
    dir: PathBuf,
}

impl DirManifests {
    /// Opens (or creates) a manifest store rooted at the given directory.
    pub fn open(root: impl AsRef<Path>) -> StoreResult<Self> {
        let dir = root.as_ref().join("manifests");
        fs::create_dir_all(&dir)?;

        let inner = MemoryManifests::new();

        for path in json_files(&dir)? {
            let record: StoredManifest = read_json(&path)?;
            inner.load_record(record);
        }

        Ok(Self { inner, dir })
    }

    fn persist(&self) -> StoreResult<()> {
        let records = self.inner.dump_records();

        for record in &records {
            write_json(&self.dir.join(format!("{}.json", record.id)), record)?;
        }

        let live: Vec<String> = records.iter().map(|r| format!("{}.json", r.id)).collect();

        for path in json_files(&self.dir)? {
            let keep = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|name| live.iter().any(|l| l == name));

            if !keep {
                fs::remove_file(&path)?;
            }
        }

        Ok(())
    }
}

impl ManifestStore for DirManifests {
    fn get(&self, id: &ManifestId) -> StoreResult<(BTreeMap<String, String>, Vec<u8>)> {
        self.inner.get(id)
    }

    fn find(&self, labels: &BTreeMap<String, String>) -> StoreResult<Vec<ManifestMeta>> {
        self.inner.find(labels)
    }

    fn session(
        &self,
        body: &mut dyn FnMut(&mut dyn ManifestWriter) -> StoreResult<()>,
    ) -> StoreResult<()> {
        self.inner.session(body)?;
        self.persist()
    }
}
