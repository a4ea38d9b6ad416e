//! # Cairn Details
//!
//! The details catalog: an append-only record of every item and folder a
//! snapshot contains, with stable short references and typed per-service
//! metadata. One catalog is produced per backup, serialized opaquely, and
//! stored through the snapshot engine under its own ID.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod catalog;
mod info;

pub use catalog::{Catalog, CatalogError, CatalogResult, Entry};
pub use info::{
    ContactInfo, EventInfo, FileInfo, FolderInfo, ItemInfo, MailInfo,
};
