//! # Cairn Testkit
//!
//! Fixtures for exercising the engine without live collectors: scripted
//! collections and streams, a stub service connector, and an event-capturing
//! sink.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod collections;
mod connector;
mod sink;

pub use collections::{TestCollection, TestStream};
pub use connector::{ConsumedItem, StubConnector};
pub use sink::CollectingSink;
