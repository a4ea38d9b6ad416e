//! The virtual directory tree handed to a snapshot engine for upload.

use std::io::Read;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::cancel::CancelToken;
use crate::engine::BaseDir;
use crate::error::{StoreError, StoreResult};

/// A reference to content already held by the engine's blob store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentRef {
    /// Content-address of the blob.
    pub id: String,
    /// Size of the blob in bytes.
    pub size: u64,
}

/// Where a file entry's bytes come from.
pub enum FileSource {
    /// New content streamed from a collector; will be hashed and stored.
    Stream(Box<dyn Read + Send>),
    /// Content already present in the store, reused from a base snapshot.
    Cached(ContentRef),
}

/// A file yielded during directory enumeration.
pub struct FileEntry {
    /// Encoded file name.
    pub name: String,
    /// Modification time recorded in the snapshot.
    pub mod_time: DateTime<Utc>,
    /// The file body.
    pub source: FileSource,
}

/// One entry yielded during directory enumeration.
pub enum Entry {
    /// A child directory that streams its own entries.
    Dir(Arc<dyn StreamDir>),
    /// A whole unchanged subtree reused from a base snapshot.
    Base(Arc<dyn BaseDir>),
    /// A file.
    File(FileEntry),
}

/// Callback receiving enumerated entries.
pub type EmitFn<'a> = dyn FnMut(Entry) -> StoreResult<()> + 'a;

/// A virtual directory whose contents are produced on demand.
///
/// `enumerate` is invoked once per upload by a single consumer; different
/// directories may be enumerated concurrently. Implementations yield child
/// directories before files.
pub trait StreamDir: Send + Sync {
    /// Encoded directory name.
    fn name(&self) -> &str;

    /// Produces the directory's entries in order.
    fn enumerate(&self, ctx: &CancelToken, emit: &mut EmitFn<'_>) -> StoreResult<()>;
}

/// Callbacks the engine invokes as it finalizes files.
///
/// Both callbacks may be invoked concurrently with enumeration and with each
/// other. `rel_path` is the `/`-joined encoded path of the file below the
/// upload root (the root element itself is omitted).
pub trait UploadProgress: Send + Sync {
    /// A file finished uploading, successfully or not.
    fn finished_file(&self, rel_path: &str, outcome: Result<(), &StoreError>);

    /// A file's content finished hashing.
    fn finished_hashing(&self, rel_path: &str, bytes: u64);
}

/// Progress sink that ignores every callback.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopProgress;

impl UploadProgress for NoopProgress {
    fn finished_file(&self, _rel_path: &str, _outcome: Result<(), &StoreError>) {}

    fn finished_hashing(&self, _rel_path: &str, _bytes: u64) {}
}

/// A static in-memory directory, for single-blob containers and tests.
pub struct StaticDir {
    name: String,
    dirs: Vec<Arc<StaticDir>>,
    files: Vec<(String, DateTime<Utc>, Vec<u8>)>,
}

impl StaticDir {
    /// Creates a directory with the given encoded name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            dirs: Vec::new(),
            files: Vec::new(),
        }
    }

    /// Adds a child directory.
    #[must_use]
    pub fn with_dir(mut self, dir: StaticDir) -> Self {
        self.dirs.push(Arc::new(dir));
        self
    }

    /// Adds a file with the given encoded name and body.
    #[must_use]
    pub fn with_file(
        mut self,
        name: impl Into<String>,
        mod_time: DateTime<Utc>,
        body: Vec<u8>,
    ) -> Self {
        self.files.push((name.into(), mod_time, body));
        self
    }
}

impl StreamDir for StaticDir {
    fn name(&self) -> &str {
        &self.name
    }

    fn enumerate(&self, ctx: &CancelToken, emit: &mut EmitFn<'_>) -> StoreResult<()> {
        for dir in &self.dirs {
            emit(Entry::Dir(Arc::clone(dir) as Arc<dyn StreamDir>))?;
        }

        for (name, mod_time, body) in &self.files {
            ctx.check(name)?;

            emit(Entry::File(FileEntry {
                name: name.clone(),
                mod_time: *mod_time,
                source: FileSource::Stream(Box::new(std::io::Cursor::new(body.clone()))),
            }))?;
        }

        Ok(())
    }
}

/// Reads a stream source to its end, polling cancellation per chunk.
pub(crate) fn read_all(
    mut reader: Box<dyn Read + Send>,
    ctx: &CancelToken,
    path: &str,
) -> StoreResult<Vec<u8>> {
    let mut out = Vec::new();
    let mut buf = [0u8; 16 * 1024];

    loop {
        ctx.check(path)?;

        match reader.read(&mut buf) {
            Ok(0) => return Ok(out),
            Ok(n) => out.extend_from_slice(&buf[..n]),
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
            Err(e) => return Err(StoreError::source(format!("reading {path}: {e}"))),
        }
    }
}
