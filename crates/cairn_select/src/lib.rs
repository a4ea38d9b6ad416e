//! # Cairn Select
//!
//! Scope algebra for choosing what gets backed up and restored.
//!
//! A [`Selector`] carries a service tag plus three ordered scope sets:
//! includes, filters, and excludes. Service-specific APIs
//! ([`ExchangeSelector`], [`OneDriveSelector`], [`SharePointSelector`]) build
//! scopes and reduce a details catalog down to the concrete path set an
//! operation acts on.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod exchange;
mod onedrive;
mod pattern;
mod scope;
mod selector;
mod sharepoint;

pub use error::{SelectError, SelectResult};
pub use exchange::{ExchangeCategory, ExchangeSelector};
pub use onedrive::{OneDriveCategory, OneDriveSelector};
pub use pattern::{Comparator, Pattern, ANY_TARGET, NONE_TARGET};
pub use scope::{discrete_scopes, reduce, Categorizer, RawScope, Scope};
pub use selector::Selector;
pub use sharepoint::{SharePointCategory, SharePointSelector};
