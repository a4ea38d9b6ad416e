//! # Cairn Store
//!
//! The interfaces Cairn speaks to its storage collaborators through, plus
//! in-tree backends.
//!
//! The [`SnapshotEngine`] trait covers the content-addressed snapshot store:
//! upload a virtual directory tree, read items back by path, enumerate prior
//! snapshot manifests. The [`ManifestStore`] trait is the opaque record store
//! the model layer builds typed CRUD on. Two backend pairs are provided:
//! fully in-memory ([`MemoryEngine`] / [`MemoryManifests`]) and
//! directory-backed ([`DirEngine`] / [`DirManifests`]).

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod cancel;
mod engine;
mod error;
mod fs;
mod manifest;
mod memory;
mod upload;

pub use cancel::CancelToken;
pub use engine::{
    BaseDir, BaseEntry, BaseFile, ByteCounter, RestoredItem, SnapshotEngine, SnapshotId,
    SnapshotManifest, SnapshotStats,
};
pub use error::{StoreError, StoreResult};
pub use fs::{DirEngine, DirManifests};
pub use manifest::{labels_match, ManifestId, ManifestMeta, ManifestStore, ManifestWriter};
pub use memory::{MemoryEngine, MemoryManifests};
pub use upload::{
    ContentRef, EmitFn, Entry, FileEntry, FileSource, NoopProgress, StaticDir, StreamDir,
    UploadProgress,
};
