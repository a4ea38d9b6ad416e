//! The restore operation state machine.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;

use cairn_details::Catalog;
use cairn_select::Selector;
use cairn_store::{ByteCounter, CancelToken, SnapshotEngine};

use crate::connector::ServiceConnector;
use crate::error::{EngineResult, ErrorList};
use crate::events::{Bus, RESTORE_END, RESTORE_START};
use crate::frame::{FrameReader, SERIALIZATION_VERSION};
use crate::model::{BackupModel, ModelStore, Schema, StableId};
use crate::ops::OpStatus;
use crate::restored::{RestoredCollection, RestoredStream};
use crate::stats::StartAndEndTime;
use crate::streamstore::DetailsStore;

/// Aggregated results of a restore run.
#[derive(Debug, Clone, Default)]
pub struct RestoreResults {
    /// Items read out of the snapshot.
    pub items_read: u64,
    /// Items the connector re-materialized.
    pub items_written: u64,
    /// Bytes read out of the snapshot.
    pub bytes_read: u64,
    /// Wall-clock bounds.
    pub times: StartAndEndTime,
    /// Per-item write failures, as `(path, message)` pairs.
    pub write_errors: Vec<(String, String)>,
}

/// One restore: load the backup, reduce the selector, stream items out.
pub struct RestoreOperation {
    /// The backup to restore from.
    pub backup_id: StableId,
    /// The selector narrowing what gets restored.
    pub selector: Selector,
    /// Current lifecycle status.
    pub status: OpStatus,
    /// Results, populated as the run progresses.
    pub results: RestoreResults,

    tenant: String,
    bus: Bus,
    engine: Arc<dyn SnapshotEngine>,
    models: Arc<ModelStore>,
}

impl RestoreOperation {
    pub(crate) fn new(
        tenant: String,
        backup_id: StableId,
        selector: Selector,
        bus: Bus,
        engine: Arc<dyn SnapshotEngine>,
        models: Arc<ModelStore>,
    ) -> Self {
        Self {
            backup_id,
            selector,
            status: OpStatus::Pending,
            results: RestoreResults::default(),
            tenant,
            bus,
            engine,
            models,
        }
    }

    /// Runs the restore synchronously to a terminal status, returning the
    /// reduced details of what was targeted.
    pub fn run(
        &mut self,
        ctx: &CancelToken,
        connector: &dyn ServiceConnector,
    ) -> EngineResult<Catalog> {
        self.status = OpStatus::Running;
        self.results.times.started_at = Some(Utc::now());

        let mut data = BTreeMap::new();
        data.insert("backup_id".to_string(), self.backup_id.to_string());
        self.bus.event(RESTORE_START, data);

        let outcome = self.execute(ctx, connector);

        self.results.times.completed_at = Some(Utc::now());

        if outcome.is_err() {
            self.status = OpStatus::Failed;
        }

        let mut data = BTreeMap::new();
        data.insert("backup_id".to_string(), self.backup_id.to_string());
        data.insert("status".to_string(), self.status.to_string());
        data.insert(
            "items_read".to_string(),
            self.results.items_read.to_string(),
        );
        data.insert(
            "items_written".to_string(),
            self.results.items_written.to_string(),
        );
        data.insert("bytes_read".to_string(), self.results.bytes_read.to_string());
        if let Some(duration) = self.results.times.duration() {
            data.insert(
                "duration_ms".to_string(),
                duration.num_milliseconds().to_string(),
            );
        }
        self.bus.event(RESTORE_END, data);

        outcome
    }

    fn execute(
        &mut self,
        ctx: &CancelToken,
        connector: &dyn ServiceConnector,
    ) -> EngineResult<Catalog> {
        let backup: BackupModel = self.models.get(Schema::Backup, &self.backup_id)?;

        let details_store = DetailsStore::new(
            Arc::clone(&self.engine),
            self.tenant.clone(),
            self.selector.service,
        );
        let details = details_store.read(&backup.details_id, ctx)?;

        let reduced = self.selector.reduce(&details)?;

        let mut parse_errors = ErrorList::new();
        let mut paths = Vec::new();

        for repo_ref in reduced.paths() {
            match cairn_path::Path::from_repo_ref(&repo_ref, true) {
                Ok(path) => paths.push(path),
                Err(e) => parse_errors.push(e.into()),
            }
        }

        parse_errors.into_result()?;

        if paths.is_empty() {
            self.status = OpStatus::NoData;
            return Ok(reduced);
        }

        let counter = ByteCounter::new();
        let items = self
            .engine
            .restore_items(&backup.snapshot_id, &paths, &counter, ctx)?;

        self.results.items_read = items.len() as u64;
        self.results.bytes_read = counter.total();

        // Group restored items into per-directory collections, bodies
        // unframed on the way out.
        let mut by_dir: BTreeMap<String, RestoredCollection> = BTreeMap::new();

        for item in items {
            let dir = item.path.dir()?;
            let item_id = item.path.item().unwrap_or_default().to_string();

            let collection = by_dir
                .entry(dir.to_string())
                .or_insert_with(|| RestoredCollection::new(dir));

            collection.push(RestoredStream::new(
                item_id,
                Box::new(FrameReader::new(SERIALIZATION_VERSION, item.reader)),
            ));
        }

        let collections: Vec<RestoredCollection> = by_dir.into_values().collect();

        let consume = connector.consume(ctx, &self.selector, collections)?;

        self.results.items_written = consume.items_written;
        self.results.write_errors = consume.errors;

        self.status = if self.results.items_written == 0 && self.results.write_errors.is_empty() {
            OpStatus::NoData
        } else {
            OpStatus::Completed
        };

        Ok(reduced)
    }
}
