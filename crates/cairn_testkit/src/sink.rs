//! An event sink that captures everything for assertions.

use parking_lot::Mutex;

use cairn_core::events::{Event, EventSink};

/// Captures published events in order.
#[derive(Debug, Default)]
pub struct CollectingSink {
    events: Mutex<Vec<Event>>,
}

impl CollectingSink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every event captured so far.
    #[must_use]
    pub fn events(&self) -> Vec<Event> {
        self.events.lock().clone()
    }

    /// The keys of every captured event, in order.
    #[must_use]
    pub fn keys(&self) -> Vec<&'static str> {
        self.events.lock().iter().map(|e| e.key).collect()
    }
}

impl EventSink for CollectingSink {
    fn handle(&self, event: &Event) {
        self.events.lock().push(event.clone());
    }
}
