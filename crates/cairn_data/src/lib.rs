//! # Cairn Data
//!
//! The seam between Cairn and its service collectors.
//!
//! Collectors produce [`Collection`] values: lazy, finite sequences of
//! [`ItemStream`]s bound to a single directory path. The engine consumes them
//! exactly once during a backup; on restore it hands collections of the same
//! shape back to the collectors.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use std::io::Read;

use chrono::{DateTime, Utc};

use cairn_details::ItemInfo;
use cairn_path::Path;

/// How a collection relates to the previous snapshot's hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectionState {
    /// The directory did not exist in the previous snapshot.
    New,
    /// The directory exists at the same path as before.
    NotMoved,
    /// The directory moved; `previous_path` holds its old location.
    Moved,
    /// The directory was deleted; `previous_path` holds its old location.
    Deleted,
}

/// A lazy, finite sequence of item streams bound to one directory.
pub trait Collection: Send + Sync {
    /// The directory the items live at. `None` only for deleted collections.
    fn full_path(&self) -> Option<&Path>;

    /// The directory's path in the previous snapshot, when known.
    fn previous_path(&self) -> Option<&Path>;

    /// How this collection relates to the previous snapshot.
    fn state(&self) -> CollectionState;

    /// The item streams. May be consumed at most once.
    fn items(&self) -> Box<dyn Iterator<Item = Box<dyn ItemStream>> + Send + '_>;
}

/// A single item produced by a collector.
pub trait ItemStream: Send {
    /// Stable identifier of the item within its directory.
    fn id(&self) -> &str;

    /// Consumes the stream, yielding the item body.
    fn into_reader(self: Box<Self>) -> Box<dyn Read + Send>;

    /// Whether the item was deleted since the previous snapshot.
    fn deleted(&self) -> bool;

    /// Typed metadata for the details catalog.
    ///
    /// Metadata sidecar files return `None` and are never cataloged.
    fn info(&self) -> Option<ItemInfo> {
        None
    }

    /// Declared modification time, if the collector knows one.
    fn mod_time(&self) -> Option<DateTime<Utc>> {
        None
    }

    /// Declared size in bytes, if the collector knows one.
    fn size(&self) -> Option<u64> {
        None
    }
}
