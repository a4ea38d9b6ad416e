//! Details blobs stored as single-file snapshots.
//!
//! The details catalog of a backup is serialized opaquely and written through
//! the snapshot engine as its own tiny snapshot, tagged as a container blob.
//! The resulting snapshot ID is the details ID recorded on the backup model.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;

use cairn_details::Catalog;
use cairn_path::encode::encode_element;
use cairn_path::{CategoryType, Path, ServiceType};
use cairn_store::{
    ByteCounter, CancelToken, NoopProgress, SnapshotEngine, SnapshotId, StaticDir,
};

use crate::error::{EngineError, EngineResult};
use crate::frame::{frame_bytes, read_framed, SERIALIZATION_VERSION};

/// Label marking details-container snapshots in the engine.
const CONTAINER_TAG: &str = "container";

/// Value of the container label for details blobs.
const DETAILS_CONTAINER: &str = "details";

/// Owner element details containers are filed under.
const CONTAINER_OWNER: &str = "streamstore";

/// Item element of the single details file.
const DETAILS_ITEM: &str = "details";

/// Reads and writes details catalogs through a snapshot engine.
pub struct DetailsStore {
    engine: Arc<dyn SnapshotEngine>,
    tenant: String,
    service: ServiceType,
}

impl DetailsStore {
    /// Creates a store writing under the given tenant and service.
    #[must_use]
    pub fn new(engine: Arc<dyn SnapshotEngine>, tenant: impl Into<String>, service: ServiceType) -> Self {
        Self {
            engine,
            tenant: tenant.into(),
            service,
        }
    }

    fn container_path(&self) -> EngineResult<Path> {
        let category = CategoryType::all_for(self.service)[0];

        Ok(Path::new(
            &self.tenant,
            self.service,
            CONTAINER_OWNER,
            category,
            Vec::new(),
            Some(DETAILS_ITEM.to_string()),
        )?)
    }

    /// Writes a catalog, returning its details ID.
    pub fn write(&self, catalog: &Catalog, ctx: &CancelToken) -> EngineResult<String> {
        let path = self.container_path()?;
        let body = frame_bytes(SERIALIZATION_VERSION, &catalog.to_bytes()?);

        // Materialize the container path as nested static directories with
        // the single framed details file at the leaf.
        let elements = path.elements();

        let Some((item, dirs)) = elements.split_last() else {
            return Err(EngineError::fatal("details container path is empty"));
        };
        let Some((leaf, parents)) = dirs.split_last() else {
            return Err(EngineError::fatal("details container path is empty"));
        };

        let mut dir =
            StaticDir::new(encode_element(leaf)).with_file(encode_element(item), Utc::now(), body);

        for parent in parents.iter().rev() {
            dir = StaticDir::new(encode_element(parent)).with_dir(dir);
        }

        let mut tags = BTreeMap::new();
        tags.insert(CONTAINER_TAG.to_string(), DETAILS_CONTAINER.to_string());

        let (id, _) = self
            .engine
            .upload(Arc::new(dir), &tags, Arc::new(NoopProgress), ctx)?;

        Ok(id.as_str().to_string())
    }

    /// Reads a catalog back by its details ID.
    pub fn read(&self, details_id: &str, ctx: &CancelToken) -> EngineResult<Catalog> {
        let path = self.container_path()?;
        let counter = ByteCounter::new();

        let mut items = self.engine.restore_items(
            &SnapshotId::new(details_id),
            &[path],
            &counter,
            ctx,
        )?;

        let item = items
            .pop()
            .ok_or_else(|| EngineError::not_found("details", details_id))?;

        let body = read_framed(SERIALIZATION_VERSION, item.reader).map_err(|e| {
            match crate::frame::version_mismatch(&e) {
                Some(v) => EngineError::FrameVersionMismatch {
                    expected: v.expected,
                    got: v.got,
                },
                None => EngineError::fatal(format!("reading details blob: {e}")),
            }
        })?;

        Ok(Catalog::from_bytes(&body)?)
    }

    /// Deletes the details container snapshot.
    pub fn delete(&self, details_id: &str) -> EngineResult<()> {
        self.engine
            .delete_snapshot(&SnapshotId::new(details_id))?;
        Ok(())
    }
}
