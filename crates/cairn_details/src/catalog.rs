//! The append-only catalog of snapshot contents.

use std::collections::HashSet;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::info::ItemInfo;

/// Result type for catalog operations.
pub type CatalogResult<T> = Result<T, CatalogError>;

/// Errors raised while serializing or deserializing a catalog.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// The stored blob could not be decoded.
    #[error("malformed details blob: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// One record in the catalog: an item or a folder placed in a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    /// Canonical repository path of the entry.
    pub repo_ref: String,
    /// Stable short hash of `repo_ref`.
    pub short_ref: String,
    /// Short hash of the parent directory.
    pub parent_ref: String,
    /// Whether the entry is an item (false for folders).
    pub is_item: bool,
    /// Typed metadata.
    pub info: ItemInfo,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct CatalogInner {
    entries: Vec<Entry>,
    #[serde(skip)]
    folder_refs: HashSet<String>,
}

/// Append-only record of everything a snapshot contains.
///
/// `add` and `add_folders` are called concurrently from the snapshot layer's
/// finalize callbacks; the catalog deduplicates folders by repo ref so each
/// ancestor is registered exactly once.
#[derive(Debug, Default)]
pub struct Catalog {
    inner: RwLock<CatalogInner>,
}

impl Catalog {
    /// Creates an empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records an item the snapshot contains.
    pub fn add(
        &self,
        repo_ref: String,
        short_ref: String,
        parent_ref: String,
        is_item: bool,
        info: ItemInfo,
    ) {
        self.inner.write().entries.push(Entry {
            repo_ref,
            short_ref,
            parent_ref,
            is_item,
            info,
        });
    }

    /// Registers ancestor folders, skipping repo refs already present.
    pub fn add_folders(&self, folders: Vec<Entry>) {
        let mut inner = self.inner.write();

        for folder in folders {
            if inner.folder_refs.insert(folder.repo_ref.clone()) {
                inner.entries.push(folder);
            }
        }
    }

    /// All entries, items and folders, in insertion order.
    #[must_use]
    pub fn entries(&self) -> Vec<Entry> {
        self.inner.read().entries.clone()
    }

    /// Item entries only.
    #[must_use]
    pub fn items(&self) -> Vec<Entry> {
        self.inner
            .read()
            .entries
            .iter()
            .filter(|e| e.is_item)
            .cloned()
            .collect()
    }

    /// The set of item repo refs the snapshot contains.
    #[must_use]
    pub fn paths(&self) -> Vec<String> {
        self.inner
            .read()
            .entries
            .iter()
            .filter(|e| e.is_item)
            .map(|e| e.repo_ref.clone())
            .collect()
    }

    /// Builds a catalog holding exactly the given entries.
    #[must_use]
    pub fn from_entries(entries: Vec<Entry>) -> Self {
        let folder_refs = entries
            .iter()
            .filter(|e| !e.is_item)
            .map(|e| e.repo_ref.clone())
            .collect();

        Self {
            inner: RwLock::new(CatalogInner {
                entries,
                folder_refs,
            }),
        }
    }

    /// Serializes the catalog into an opaque blob.
    pub fn to_bytes(&self) -> CatalogResult<Vec<u8>> {
        Ok(serde_json::to_vec(&*self.inner.read())?)
    }

    /// Restores a catalog from a blob written by [`Catalog::to_bytes`].
    pub fn from_bytes(data: &[u8]) -> CatalogResult<Self> {
        let mut inner: CatalogInner = serde_json::from_slice(data)?;

        inner.folder_refs = inner
            .entries
            .iter()
            .filter(|e| !e.is_item)
            .map(|e| e.repo_ref.clone())
            .collect();

        Ok(Self {
            inner: RwLock::new(inner),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::info::{FolderInfo, MailInfo};

    fn folder_entry(repo_ref: &str) -> Entry {
        Entry {
            repo_ref: repo_ref.to_string(),
            short_ref: format!("sr-{repo_ref}"),
            parent_ref: "parent".to_string(),
            is_item: false,
            info: ItemInfo::Folder(FolderInfo {
                display_name: repo_ref.rsplit('/').next().unwrap_or("").to_string(),
            }),
        }
    }

    fn mail_entry(repo_ref: &str) -> (String, String, String, bool, ItemInfo) {
        (
            repo_ref.to_string(),
            format!("sr-{repo_ref}"),
            "parent".to_string(),
            true,
            ItemInfo::Mail(MailInfo::default()),
        )
    }

    #[test]
    fn add_records_items() {
        let catalog = Catalog::new();
        let (r, s, p, i, info) = mail_entry("t/exchange/u/mail/Inbox/m1");
        catalog.add(r.clone(), s, p, i, info);

        assert_eq!(catalog.paths(), vec![r]);
        assert_eq!(catalog.items().len(), 1);
    }

    #[test]
    fn folders_dedup_by_repo_ref() {
        let catalog = Catalog::new();
        catalog.add_folders(vec![folder_entry("a/b"), folder_entry("a")]);
        catalog.add_folders(vec![folder_entry("a/b")]);

        let folders: Vec<_> = catalog.entries().into_iter().filter(|e| !e.is_item).collect();
        assert_eq!(folders.len(), 2);
    }

    #[test]
    fn concurrent_adds_do_not_lose_entries() {
        let catalog = std::sync::Arc::new(Catalog::new());

        std::thread::scope(|scope| {
            for t in 0..4 {
                let catalog = std::sync::Arc::clone(&catalog);
                scope.spawn(move || {
                    for i in 0..50 {
                        let (r, s, p, is_item, info) =
                            mail_entry(&format!("t/exchange/u/mail/f/{t}-{i}"));
                        catalog.add(r, s, p, is_item, info);
                        catalog.add_folders(vec![folder_entry("t/exchange/u/mail/f")]);
                    }
                });
            }
        });

        assert_eq!(catalog.items().len(), 200);
        let folders: Vec<_> = catalog.entries().into_iter().filter(|e| !e.is_item).collect();
        assert_eq!(folders.len(), 1);
    }

    #[test]
    fn blob_roundtrip_preserves_entries_and_dedup() {
        let catalog = Catalog::new();
        let (r, s, p, i, info) = mail_entry("t/exchange/u/mail/Inbox/m1");
        catalog.add(r, s, p, i, info);
        catalog.add_folders(vec![folder_entry("t/exchange/u/mail/Inbox")]);

        let blob = catalog.to_bytes().unwrap();
        let restored = Catalog::from_bytes(&blob).unwrap();

        assert_eq!(restored.entries(), catalog.entries());

        // Dedup state is rebuilt from the entries.
        restored.add_folders(vec![folder_entry("t/exchange/u/mail/Inbox")]);
        assert_eq!(restored.entries().len(), catalog.entries().len());
    }

    #[test]
    fn malformed_blob_rejected() {
        assert!(Catalog::from_bytes(b"{not json").is_err());
    }
}
