//! # Cairn Path
//!
//! Canonical, service-qualified resource paths.
//!
//! Every item Cairn touches is addressed by a [`Path`]: a tuple of
//! `(tenant, service, resource owner, category, folders..., item)`. Paths are
//! immutable and carry their own escaping rules; the raw element names are
//! only base64-encoded at the snapshot-store boundary (see [`encode`]).

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod encode;

mod builder;
mod error;
mod path;

pub use builder::PathBuilder;
pub use error::{PathError, PathResult};
pub use path::{CategoryType, Path, ServiceType, SHORT_REF_LEN};
