//! Concrete collections for data streamed out of a snapshot.

use std::io::Read;

use parking_lot::Mutex;

use cairn_data::{Collection, CollectionState, ItemStream};
use cairn_path::Path;

/// One item streamed out of a snapshot.
pub struct RestoredStream {
    id: String,
    reader: Option<Box<dyn Read + Send>>,
}

impl RestoredStream {
    /// Creates a stream over an already-unframed reader.
    #[must_use]
    pub fn new(id: impl Into<String>, reader: Box<dyn Read + Send>) -> Self {
        Self {
            id: id.into(),
            reader: Some(reader),
        }
    }
}

impl ItemStream for RestoredStream {
    fn id(&self) -> &str {
        &self.id
    }

    fn into_reader(self: Box<Self>) -> Box<dyn Read + Send> {
        self.reader
            .unwrap_or_else(|| Box::new(std::io::empty()))
    }

    fn deleted(&self) -> bool {
        false
    }
}

/// A directory's worth of restored items, handed back to a connector.
pub struct RestoredCollection {
    path: Path,
    items: Mutex<Vec<RestoredStream>>,
}

impl RestoredCollection {
    /// Creates a collection at the given directory path.
    #[must_use]
    pub fn new(path: Path) -> Self {
        Self {
            path,
            items: Mutex::new(Vec::new()),
        }
    }

    /// Adds an item stream.
    pub fn push(&self, stream: RestoredStream) {
        self.items.lock().push(stream);
    }

    /// Number of items not yet consumed.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    /// Whether no items remain.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }

    /// The directory path of this collection.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Collection for RestoredCollection {
    fn full_path(&self) -> Option<&Path> {
        Some(&self.path)
    }

    fn previous_path(&self) -> Option<&Path> {
        None
    }

    fn state(&self) -> CollectionState {
        CollectionState::NotMoved
    }

    fn items(&self) -> Box<dyn Iterator<Item = Box<dyn ItemStream>> + Send + '_> {
        let drained: Vec<RestoredStream> = std::mem::take(&mut *self.items.lock());

        Box::new(
            drained
                .into_iter()
                .map(|s| Box::new(s) as Box<dyn ItemStream>),
        )
    }
}
