//! Scripted collections and streams.

use std::io::Read;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use cairn_data::{Collection, CollectionState, ItemStream};
use cairn_details::ItemInfo;
use cairn_path::Path;

/// A scripted item stream backed by an in-memory body.
pub struct TestStream {
    id: String,
    body: Vec<u8>,
    deleted: bool,
    info: Option<ItemInfo>,
    mod_time: Option<DateTime<Utc>>,
}

impl TestStream {
    /// Creates a stream with the given ID and body.
    #[must_use]
    pub fn new(id: impl Into<String>, body: impl Into<Vec<u8>>) -> Self {
        Self {
            id: id.into(),
            body: body.into(),
            deleted: false,
            info: None,
            mod_time: None,
        }
    }

    /// Marks the stream as deleted.
    #[must_use]
    pub fn deleted(mut self) -> Self {
        self.deleted = true;
        self
    }

    /// Attaches typed metadata.
    #[must_use]
    pub fn with_info(mut self, info: ItemInfo) -> Self {
        self.info = Some(info);
        self
    }

    /// Declares a modification time.
    #[must_use]
    pub fn with_mod_time(mut self, mod_time: DateTime<Utc>) -> Self {
        self.mod_time = Some(mod_time);
        self
    }
}

impl ItemStream for TestStream {
    fn id(&self) -> &str {
        &self.id
    }

    fn into_reader(self: Box<Self>) -> Box<dyn Read + Send> {
        Box::new(std::io::Cursor::new(self.body))
    }

    fn deleted(&self) -> bool {
        self.deleted
    }

    fn info(&self) -> Option<ItemInfo> {
        self.info.clone()
    }

    fn mod_time(&self) -> Option<DateTime<Utc>> {
        self.mod_time
    }

    fn size(&self) -> Option<u64> {
        Some(self.body.len() as u64)
    }
}

/// A scripted collection bound to one directory path.
pub struct TestCollection {
    full_path: Option<Path>,
    previous_path: Option<Path>,
    state: CollectionState,
    streams: Mutex<Vec<TestStream>>,
}

impl TestCollection {
    /// A collection new in this snapshot.
    #[must_use]
    pub fn new(path: Path) -> Self {
        Self {
            full_path: Some(path),
            previous_path: None,
            state: CollectionState::New,
            streams: Mutex::new(Vec::new()),
        }
    }

    /// A collection at the same path as the previous snapshot.
    #[must_use]
    pub fn not_moved(path: Path) -> Self {
        Self {
            previous_path: Some(path.clone()),
            full_path: Some(path),
            state: CollectionState::NotMoved,
            streams: Mutex::new(Vec::new()),
        }
    }

    /// A collection that moved between snapshots.
    #[must_use]
    pub fn moved(previous: Path, current: Path) -> Self {
        Self {
            full_path: Some(current),
            previous_path: Some(previous),
            state: CollectionState::Moved,
            streams: Mutex::new(Vec::new()),
        }
    }

    /// A collection deleted since the previous snapshot.
    #[must_use]
    pub fn tombstone(previous: Path) -> Self {
        Self {
            full_path: None,
            previous_path: Some(previous),
            state: CollectionState::Deleted,
            streams: Mutex::new(Vec::new()),
        }
    }

    /// Adds a stream.
    #[must_use]
    pub fn with_stream(self, stream: TestStream) -> Self {
        self.streams.lock().push(stream);
        self
    }
}

impl Collection for TestCollection {
    fn full_path(&self) -> Option<&Path> {
        self.full_path.as_ref()
    }

    fn previous_path(&self) -> Option<&Path> {
        self.previous_path.as_ref()
    }

    fn state(&self) -> CollectionState {
        self.state
    }

    fn items(&self) -> Box<dyn Iterator<Item = Box<dyn ItemStream>> + Send + '_> {
        let drained: Vec<TestStream> = std::mem::take(&mut *self.streams.lock());

        Box::new(
            drained
                .into_iter()
                .map(|s| Box::new(s) as Box<dyn ItemStream>),
        )
    }
}
