//! The merge of streamed collections with base snapshot hierarchies.
//!
//! A backup builds one virtual directory tree out of two sources: the
//! collections produced by the service collectors for this run, and the
//! directory hierarchies of prior base snapshots. The merge happens in three
//! phases: inflate the collection tree, traverse the bases honoring moves and
//! deletions, then materialize streaming directories for upload.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use chrono::Utc;

use cairn_data::{Collection, CollectionState};
use cairn_path::encode::{decode_element, encode_as_path, encode_element};
use cairn_path::{Path, PathBuilder};
use cairn_store::{
    BaseDir, BaseEntry, CancelToken, EmitFn, Entry, FileEntry, FileSource, SnapshotEngine,
    SnapshotManifest, StoreError, StoreResult, StreamDir,
};

use crate::error::{EngineError, EngineResult, ErrorList};
use crate::frame::{FrameWriter, SERIALIZATION_VERSION};
use crate::progress::{ItemDetails, ItemProgress};

/// Bound on base-hierarchy traversal depth, against malformed bases.
const MAX_TRAVERSAL_DEPTH: usize = 500;

/// A base snapshot selected as incremental reference, with the subtree
/// prefixes (owner/service/category roots) it is consulted for.
#[derive(Clone)]
pub struct IncrementalBase {
    /// The base snapshot's manifest.
    pub manifest: SnapshotManifest,
    /// Category-root paths to merge from this base.
    pub subtree_paths: Vec<Path>,
}

/// Moves and deletions registered by incoming collections, keyed by the old
/// directory path string. `None` marks a deleted subtree.
pub type UpdatedPaths = HashMap<String, Option<Path>>;

/// Result of the merge: the upload root plus the path rewrites applied.
pub struct MergeResult {
    /// The single root directory to hand to the snapshot engine.
    pub root: Arc<dyn StreamDir>,
    /// Path rewrites, used to carry base details forward.
    pub updated: UpdatedPaths,
}

#[derive(Default)]
struct TreeNode {
    children: BTreeMap<String, TreeNode>,
    collection: Option<Arc<dyn Collection>>,
    base_dir: Option<Arc<dyn BaseDir>>,
}

/// Walks the roots map, creating nodes on demand, and returns the node at
/// the given element sequence. Empty sequences return `None`.
fn tree_node<'a>(
    roots: &'a mut BTreeMap<String, TreeNode>,
    elements: &[&str],
) -> Option<&'a mut TreeNode> {
    let (first, rest) = elements.split_first()?;

    let mut node = roots.entry((*first).to_string()).or_default();

    for elem in rest {
        node = node.children.entry((*elem).to_string()).or_default();
    }

    Some(node)
}

/// Phase 1: builds the tree of incoming collections and the map of moves
/// and deletions.
fn inflate_collection_tree(
    collections: &[Arc<dyn Collection>],
) -> EngineResult<(BTreeMap<String, TreeNode>, UpdatedPaths)> {
    let mut roots = BTreeMap::new();
    let mut updated = UpdatedPaths::new();

    for collection in collections {
        match collection.state() {
            CollectionState::Deleted => {
                let prev = collection.previous_path().ok_or_else(|| {
                    EngineError::invalid_collection("deleted collection without previous path")
                })?;

                updated.insert(prev.to_string(), None);
                continue;
            }

            CollectionState::Moved => {
                let prev = collection.previous_path().ok_or_else(|| {
                    EngineError::invalid_collection("moved collection without previous path")
                })?;

                let full = collection.full_path().ok_or_else(|| {
                    EngineError::invalid_collection("moved collection without full path")
                })?;

                updated.insert(prev.to_string(), Some(full.clone()));
            }

            CollectionState::New | CollectionState::NotMoved => {}
        }

        let full = collection
            .full_path()
            .ok_or_else(|| EngineError::invalid_collection("no identifier for collection"))?;

        let elements = full.elements();
        let node = tree_node(&mut roots, &elements).ok_or_else(|| {
            EngineError::invalid_collection(format!("unable to get tree node for {full}"))
        })?;

        node.collection = Some(Arc::clone(collection));
    }

    Ok((roots, updated))
}

/// Phase 2: descends a base directory, tracking both the path it would have
/// if nothing moved and the path after honoring registered moves and
/// deletions. Directories that still exist and hold at least one file are
/// attached to the merge tree; empty directories are elided.
fn traverse_base_dir(
    depth: usize,
    updated: &UpdatedPaths,
    parent_old: &PathBuilder,
    parent_new: Option<&PathBuilder>,
    dir: &Arc<dyn BaseDir>,
    roots: &mut BTreeMap<String, TreeNode>,
) -> EngineResult<()> {
    if depth >= MAX_TRAVERSAL_DEPTH {
        return Err(EngineError::BaseTreeTooDeep {
            path: parent_old.to_string(),
        });
    }

    let dir_name = decode_element(dir.name())?;

    let old_path = parent_old.append(&dir_name);
    let mut current = parent_new.map(|p| p.append(&dir_name));

    // An explicit entry for this directory overrides any ancestor rewrite.
    if let Some(update) = updated.get(&old_path.to_string()) {
        current = update.as_ref().map(Path::to_builder);
    }

    let mut has_items = false;

    for entry in dir.entries().map_err(EngineError::from)? {
        match entry {
            BaseEntry::Dir(child) => {
                traverse_base_dir(depth + 1, updated, &old_path, current.as_ref(), &child, roots)?;
            }
            BaseEntry::File(_) => has_items = true,
        }
    }

    if let Some(current) = current {
        if has_items {
            let elements: Vec<&str> = current.elements().iter().map(String::as_str).collect();

            let node = tree_node(roots, &elements).ok_or_else(|| {
                EngineError::invalid_collection(format!("unable to get tree node for {current}"))
            })?;

            node.base_dir = Some(Arc::clone(dir));
        }
    }

    Ok(())
}

/// Finds a nested directory of a stored snapshot by encoded element names.
fn descend(root: Arc<dyn BaseDir>, encoded: &[String]) -> EngineResult<Arc<dyn BaseDir>> {
    let mut dir = root;

    'elements: for name in encoded {
        for entry in dir.entries().map_err(EngineError::from)? {
            if let BaseEntry::Dir(child) = entry {
                if child.name() == name.as_str() {
                    dir = child;
                    continue 'elements;
                }
            }
        }

        return Err(EngineError::invalid_collection(format!(
            "base snapshot missing subtree element {}",
            decode_element(name).unwrap_or_else(|_| name.clone())
        )));
    }

    Ok(dir)
}

fn inflate_base_tree(
    engine: &dyn SnapshotEngine,
    base: &IncrementalBase,
    updated: &UpdatedPaths,
    roots: &mut BTreeMap<String, TreeNode>,
) -> EngineResult<()> {
    // Checkpoint snapshots rely on store-assisted dedup instead.
    if !base.manifest.incomplete_reason.is_empty() {
        return Ok(());
    }

    let root = engine.open_root(&base.manifest.id)?;

    for subtree in &base.subtree_paths {
        let elements = subtree.elements();

        // The root directory is the first element; descend past it.
        let encoded: Vec<String> = elements[1..]
            .iter()
            .map(|e| encode_element(e))
            .collect();

        let subtree_dir = descend(Arc::clone(&root), &encoded)?;

        let parent =
            PathBuilder::from_elements(elements[..elements.len() - 1].iter().copied());

        traverse_base_dir(0, updated, &parent, Some(&parent), &subtree_dir, roots)?;
    }

    Ok(())
}

/// A materialized merge directory: either an unchanged base subtree reused
/// wholesale, or a streaming directory fusing children, collection items,
/// and surviving base files.
enum MergedDir {
    Reused(Arc<dyn BaseDir>),
    Streaming(Arc<MergeDirectory>),
}

impl MergedDir {
    fn as_entry(&self) -> Entry {
        match self {
            Self::Reused(base) => Entry::Base(Arc::clone(base)),
            Self::Streaming(dir) => Entry::Dir(Arc::clone(dir) as Arc<dyn StreamDir>),
        }
    }
}

/// Phase 3 output: a directory enumerated on demand during upload.
struct MergeDirectory {
    encoded_name: String,
    children: Vec<MergedDir>,
    collection: Option<Arc<dyn Collection>>,
    base_dir: Option<Arc<dyn BaseDir>>,
    progress: Arc<ItemProgress>,
}

impl MergeDirectory {
    /// Streams collection items, registering details and framing bodies.
    /// Returns the set of encoded names seen, deleted items included, so
    /// base entries cannot resurrect superseded names.
    fn stream_collection(
        &self,
        ctx: &CancelToken,
        emit: &mut EmitFn<'_>,
        errs: &mut ErrorList,
    ) -> StoreResult<HashSet<String>> {
        let mut seen = HashSet::new();

        let Some(collection) = &self.collection else {
            return Ok(seen);
        };

        let Some(full_path) = collection.full_path() else {
            return Ok(seen);
        };

        for item in collection.items() {
            ctx.check(&full_path.to_string())?;

            let encoded_name = encode_element(item.id());

            // A deleted item is still recorded as seen so it does not leak
            // back in from the base snapshot.
            seen.insert(encoded_name.clone());

            let item_path = match full_path.append(item.id(), true) {
                Ok(p) => p,
                Err(e) => {
                    errs.push(EngineError::from(e));
                    continue;
                }
            };

            tracing::debug!(path = %item_path, "streaming item");

            if item.deleted() {
                continue;
            }

            // Register before yielding so the finalize callback can never
            // race ahead of the pending entry.
            if let Some(info) = item.info() {
                let elements = item_path.elements();
                let key = encode_as_path(elements[1..].iter().copied());

                self.progress.put(
                    key,
                    ItemDetails {
                        info,
                        repo_path: item_path.clone(),
                    },
                );
            }

            let mod_time = item.mod_time().unwrap_or_else(Utc::now);
            let reader = FrameWriter::new(SERIALIZATION_VERSION, item.into_reader());

            // The snapshot layer swallows most per-file problems; an error
            // surfacing from the callback itself aborts enumeration.
            emit(Entry::File(FileEntry {
                name: encoded_name,
                mod_time,
                source: FileSource::Stream(Box::new(reader)),
            }))?;
        }

        Ok(seen)
    }

    /// Streams base file entries not superseded by the current snapshot.
    fn stream_base_entries(
        &self,
        emit: &mut EmitFn<'_>,
        seen: &HashSet<String>,
    ) -> StoreResult<()> {
        let Some(base) = &self.base_dir else {
            return Ok(());
        };

        for entry in base.entries()? {
            let BaseEntry::File(file) = entry else {
                // Subdirectories were merged while building the hierarchy.
                continue;
            };

            if seen.contains(&file.name) {
                continue;
            }

            emit(Entry::File(FileEntry {
                name: file.name.clone(),
                mod_time: file.mod_time,
                source: FileSource::Cached(file.content),
            }))?;
        }

        Ok(())
    }
}

impl StreamDir for MergeDirectory {
    fn name(&self) -> &str {
        &self.encoded_name
    }

    fn enumerate(&self, ctx: &CancelToken, emit: &mut EmitFn<'_>) -> StoreResult<()> {
        // Materialized child directories go first, then streamed items, then
        // surviving base entries; the per-name dedup depends on this order.
        for child in &self.children {
            emit(child.as_entry())?;
        }

        let mut errs = ErrorList::new();

        let seen = self.stream_collection(ctx, emit, &mut errs)?;
        self.stream_base_entries(emit, &seen)?;

        errs.into_result()
            .map_err(|e| StoreError::source(e.to_string()))
    }
}

/// Phase 3: materializes the merge tree bottom-up.
fn build_merged_dirs(
    name: &str,
    node: TreeNode,
    progress: &Arc<ItemProgress>,
) -> EngineResult<MergedDir> {
    // An untouched subtree is reused directly from the base snapshot. This
    // is what makes an incremental run cheap.
    if node.collection.is_none() && node.children.is_empty() {
        if let Some(base) = node.base_dir {
            return Ok(MergedDir::Reused(base));
        }
    }

    let mut children = Vec::with_capacity(node.children.len());

    for (child_name, child) in node.children {
        children.push(build_merged_dirs(&child_name, child, progress)?);
    }

    Ok(MergedDir::Streaming(Arc::new(MergeDirectory {
        encoded_name: encode_element(name),
        children,
        collection: node.collection,
        base_dir: node.base_dir,
        progress: Arc::clone(progress),
    })))
}

/// Runs the full merge, returning the upload root.
///
/// Exactly one root (one tenant) may result; anything else is an invalid
/// collection set.
pub fn merge_collections(
    engine: &dyn SnapshotEngine,
    bases: &[IncrementalBase],
    collections: &[Arc<dyn Collection>],
    progress: &Arc<ItemProgress>,
) -> EngineResult<MergeResult> {
    let (mut roots, updated) = inflate_collection_tree(collections)?;

    for base in bases {
        inflate_base_tree(engine, base, &updated, &mut roots)?;
    }

    if roots.len() != 1 {
        return Err(EngineError::invalid_collection(format!(
            "expected exactly one root directory, got {}",
            roots.len()
        )));
    }

    let Some((name, node)) = roots.into_iter().next() else {
        return Err(EngineError::invalid_collection("no root directory"));
    };

    let root = match build_merged_dirs(&name, node, progress)? {
        MergedDir::Streaming(dir) => dir as Arc<dyn StreamDir>,
        MergedDir::Reused(_) => {
            // The root node always has children when collections exist.
            return Err(EngineError::invalid_collection(
                "merge produced no streamable root",
            ));
        }
    };

    Ok(MergeResult { root, updated })
}

/// Rewrites a base-snapshot item path through the registered moves and
/// deletions, mirroring the traversal's path tracking. Returns `None` when
/// the item's directory was deleted.
#[must_use]
pub fn rewrite_base_path(item_path: &Path, updated: &UpdatedPaths) -> Option<PathBuilder> {
    let elements = item_path.elements();

    if elements.len() < 2 {
        return None;
    }

    let mut old = PathBuilder::new();
    let mut new = Some(PathBuilder::new());

    // The final element is the item itself; rewrites apply to directories.
    for elem in &elements[..elements.len() - 1] {
        old = old.append(elem);
        new = new.map(|p| p.append(elem));

        if let Some(update) = updated.get(&old.to_string()) {
            new = update.as_ref().map(Path::to_builder);
        }
    }

    new.map(|p| p.append(elements[elements.len() - 1]))
}
