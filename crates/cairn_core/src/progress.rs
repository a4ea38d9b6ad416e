//! Per-item progress tracking during upload.
//!
//! The snapshot engine finalizes files from its own threads. This sidecar is
//! the single cross-thread mutable structure of a backup: a lock-guarded map
//! of in-flight item details keyed by encoded relative path, drained into the
//! details catalog as finalize callbacks arrive.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use cairn_details::{Catalog, Entry, FolderInfo, ItemInfo};
use cairn_path::Path;
use cairn_store::{StoreError, UploadProgress};

/// Details of one item registered before its file entry is yielded.
#[derive(Debug, Clone)]
pub struct ItemDetails {
    /// Typed metadata for the catalog.
    pub info: ItemInfo,
    /// The item's canonical path in the new snapshot.
    pub repo_path: Path,
}

/// Tracks in-flight items and records finalized ones in the catalog.
///
/// `put` is called from directory enumeration just before a file entry is
/// yielded; `finished_file` and `finished_hashing` arrive concurrently from
/// the snapshot layer. Items reused from a base snapshot are resolved through
/// a pre-built base index instead of the pending map.
pub struct ItemProgress {
    pending: RwLock<HashMap<String, ItemDetails>>,
    base_index: RwLock<HashMap<String, ItemDetails>>,
    catalog: Arc<Catalog>,
    total_bytes: AtomicU64,
    errors: Mutex<Vec<(String, String)>>,
}

impl ItemProgress {
    /// Creates a sidecar recording into the given catalog.
    #[must_use]
    pub fn new(catalog: Arc<Catalog>) -> Self {
        Self {
            pending: RwLock::new(HashMap::new()),
            base_index: RwLock::new(HashMap::new()),
            catalog,
            total_bytes: AtomicU64::new(0),
            errors: Mutex::new(Vec::new()),
        }
    }

    /// Registers an in-flight item under its encoded relative path.
    pub fn put(&self, rel_path: String, details: ItemDetails) {
        self.pending.write().insert(rel_path, details);
    }

    /// Looks up an in-flight item.
    #[must_use]
    pub fn get(&self, rel_path: &str) -> Option<ItemDetails> {
        self.pending.read().get(rel_path).cloned()
    }

    /// Installs the details index for items carried over from base snapshots.
    pub fn set_base_index(&self, index: HashMap<String, ItemDetails>) {
        *self.base_index.write() = index;
    }

    /// Total bytes hashed so far.
    #[must_use]
    pub fn total_bytes(&self) -> u64 {
        self.total_bytes.load(Ordering::Relaxed)
    }

    /// Per-item failures seen so far, as `(rel_path, message)` pairs.
    #[must_use]
    pub fn item_errors(&self) -> Vec<(String, String)> {
        self.errors.lock().clone()
    }

    /// The catalog entries are recorded into.
    #[must_use]
    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    fn record(&self, details: &ItemDetails) {
        let repo_path = &details.repo_path;
        let parent = repo_path.to_builder().dir();

        self.catalog.add(
            repo_path.to_string(),
            repo_path.short_ref(),
            parent.short_ref(),
            true,
            details.info.clone(),
        );

        // Register every ancestor folder up to the root.
        let mut folders = Vec::new();
        let mut current = parent;

        while !current.is_empty() {
            let next = current.dir();

            folders.push(Entry {
                repo_ref: current.to_string(),
                short_ref: current.short_ref(),
                parent_ref: next.short_ref(),
                is_item: false,
                info: ItemInfo::Folder(FolderInfo {
                    display_name: current.last().unwrap_or_default().to_string(),
                }),
            });

            current = next;
        }

        self.catalog.add_folders(folders);
    }
}

impl UploadProgress for ItemProgress {
    fn finished_file(&self, rel_path: &str, outcome: Result<(), &StoreError>) {
        // Drop the pending entry whether the file succeeded or failed.
        let pending = self.pending.write().remove(rel_path);

        if let Err(e) = outcome {
            self.errors
                .lock()
                .push((rel_path.to_string(), e.to_string()));
            return;
        }

        // Items without registered details (metadata sidecar files) are
        // finalized silently. Base-carried items resolve through the index,
        // which also makes a double finish a no-op.
        let details = pending.or_else(|| self.base_index.write().remove(rel_path));

        if let Some(details) = details {
            self.record(&details);
        }
    }

    fn finished_hashing(&self, _rel_path: &str, bytes: u64) {
        self.total_bytes.fetch_add(bytes, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cairn_details::MailInfo;
    use cairn_path::{CategoryType, ServiceType};

    fn details_for(item: &str) -> ItemDetails {
        let repo_path = Path::new(
            "tenant",
            ServiceType::Exchange,
            "alice",
            CategoryType::Mail,
            vec!["Inbox".to_string()],
            Some(item.to_string()),
        )
        .unwrap();

        ItemDetails {
            info: ItemInfo::Mail(MailInfo::default()),
            repo_path,
        }
    }

    fn progress() -> ItemProgress {
        ItemProgress::new(Arc::new(Catalog::new()))
    }

    #[test]
    fn finished_file_records_item_and_ancestors() {
        let p = progress();
        p.put("k1".to_string(), details_for("m1"));
        p.finished_file("k1", Ok(()));

        let entries = p.catalog().entries();
        let items: Vec<_> = entries.iter().filter(|e| e.is_item).collect();
        let folders: Vec<_> = entries.iter().filter(|e| !e.is_item).collect();

        assert_eq!(items.len(), 1);
        // Inbox, mail, alice, exchange, tenant.
        assert_eq!(folders.len(), 5);
        assert!(folders
            .iter()
            .any(|f| matches!(&f.info, ItemInfo::Folder(i) if i.display_name == "Inbox")));
    }

    #[test]
    fn failed_file_is_dropped_and_counted() {
        let p = progress();
        p.put("k1".to_string(), details_for("m1"));
        p.finished_file("k1", Err(&StoreError::corrupt("boom")));

        assert!(p.catalog().entries().is_empty());
        assert!(p.get("k1").is_none());
        assert_eq!(p.item_errors().len(), 1);
    }

    #[test]
    fn double_finish_is_idempotent() {
        let p = progress();
        p.put("k1".to_string(), details_for("m1"));
        p.finished_file("k1", Ok(()));
        p.finished_file("k1", Ok(()));

        let items: Vec<_> = p.catalog().entries().into_iter().filter(|e| e.is_item).collect();
        assert_eq!(items.len(), 1);
    }

    #[test]
    fn base_index_resolves_carried_items() {
        let p = progress();

        let mut index = HashMap::new();
        index.insert("k-base".to_string(), details_for("old"));
        p.set_base_index(index);

        p.finished_file("k-base", Ok(()));
        p.finished_file("k-base", Ok(())); // second finish finds nothing

        let items: Vec<_> = p.catalog().entries().into_iter().filter(|e| e.is_item).collect();
        assert_eq!(items.len(), 1);
    }

    #[test]
    fn unknown_file_is_ignored() {
        let p = progress();
        p.finished_file("mystery", Ok(()));
        assert!(p.catalog().entries().is_empty());
    }

    #[test]
    fn concurrent_callbacks_do_not_lose_bytes_or_items() {
        let p = Arc::new(progress());

        std::thread::scope(|scope| {
            for t in 0..4 {
                let p = Arc::clone(&p);
                scope.spawn(move || {
                    for i in 0..100 {
                        let key = format!("k-{t}-{i}");
                        p.put(key.clone(), details_for(&format!("m-{t}-{i}")));
                        p.finished_hashing(&key, 10);
                        p.finished_file(&key, Ok(()));
                    }
                });
            }
        });

        assert_eq!(p.total_bytes(), 4000);
        let items: Vec<_> = p.catalog().entries().into_iter().filter(|e| e.is_item).collect();
        assert_eq!(items.len(), 400);
    }
}
