//! # Cairn Core
//!
//! The incremental snapshot engine.
//!
//! This crate provides:
//! - Versioned stream framing for item bodies ([`frame`])
//! - The merge of streamed collections with base snapshots ([`tree`])
//! - Per-item progress tracking under concurrent callbacks ([`progress`])
//! - Typed models over the opaque manifest store ([`model`])
//! - Backup and restore operation state machines ([`ops`])
//! - The repository facade and event bus ([`repository`], [`events`])

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod events;
pub mod frame;
pub mod model;
pub mod ops;
pub mod tree;

mod connector;
mod error;
mod progress;
mod repository;
mod restored;
mod stats;
mod streamstore;

pub use connector::{ConsumeStatus, ServiceConnector};
pub use error::{EngineError, EngineResult, ErrorList};
pub use progress::{ItemDetails, ItemProgress};
pub use repository::Repository;
pub use restored::{RestoredCollection, RestoredStream};
pub use stats::{BackupStats, StartAndEndTime};
pub use streamstore::DetailsStore;

/// Crate version, surfaced by the CLI.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
