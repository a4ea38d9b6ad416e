//! The event bus operations publish lifecycle events to.
//!
//! Telemetry backends live outside the engine; the bus only fans events out
//! to registered sinks. A tracing-backed sink is installed by default.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;

/// Repository initialized.
pub const REPO_INIT: &str = "repo_init";
/// Repository connected.
pub const REPO_CONNECT: &str = "repo_connect";
/// Backup operation started.
pub const BACKUP_START: &str = "backup_start";
/// Backup operation reached a terminal status.
pub const BACKUP_END: &str = "backup_end";
/// Restore operation started.
pub const RESTORE_START: &str = "restore_start";
/// Restore operation reached a terminal status.
pub const RESTORE_END: &str = "restore_end";

/// One published event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    /// The event key.
    pub key: &'static str,
    /// Event payload, string-valued.
    pub data: BTreeMap<String, String>,
}

/// A receiver of published events.
pub trait EventSink: Send + Sync {
    /// Handles one event. Must not block.
    fn handle(&self, event: &Event);
}

/// Sink logging events through `tracing`.
#[derive(Debug, Default)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn handle(&self, event: &Event) {
        tracing::info!(target: "cairn::events", key = event.key, data = ?event.data, "event");
    }
}

#[derive(Default)]
struct BusInner {
    repo_id: RwLock<String>,
    sinks: RwLock<Vec<Arc<dyn EventSink>>>,
}

/// Fans lifecycle events out to registered sinks.
///
/// Cheap to clone; clones share sinks and the repo ID.
#[derive(Clone, Default)]
pub struct Bus {
    inner: Arc<BusInner>,
}

impl Bus {
    /// Creates a bus with the tracing sink installed.
    #[must_use]
    pub fn new() -> Self {
        let bus = Self::default();
        bus.subscribe(Arc::new(TracingSink));
        bus
    }

    /// Creates a bus with no sinks.
    #[must_use]
    pub fn silent() -> Self {
        Self::default()
    }

    /// Registers an additional sink.
    pub fn subscribe(&self, sink: Arc<dyn EventSink>) {
        self.inner.sinks.write().push(sink);
    }

    /// Sets the repository ID stamped onto every event.
    pub fn set_repo_id(&self, repo_id: impl Into<String>) {
        *self.inner.repo_id.write() = repo_id.into();
    }

    /// Publishes an event to every sink.
    pub fn event(&self, key: &'static str, mut data: BTreeMap<String, String>) {
        let repo_id = self.inner.repo_id.read().clone();
        if !repo_id.is_empty() {
            data.insert("repo_id".to_string(), repo_id);
        }

        let event = Event { key, data };

        for sink in self.inner.sinks.read().iter() {
            sink.handle(&event);
        }
    }
}
