//! The backup operation state machine.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::Utc;

use cairn_data::Collection;
use cairn_details::Catalog;
use cairn_path::encode::encode_as_path;
use cairn_path::{CategoryType, Path, ServiceType};
use cairn_select::Selector;
use cairn_store::{ByteCounter, CancelToken, SnapshotEngine, UploadProgress};

use crate::connector::ServiceConnector;
use crate::error::{EngineError, EngineResult};
use crate::events::{Bus, BACKUP_END, BACKUP_START};
use crate::frame::{FrameReader, SERIALIZATION_VERSION};
use crate::model::{BackupModel, BaseModel, ModelStore, Schema, StableId};
use crate::ops::OpStatus;
use crate::progress::{ItemDetails, ItemProgress};
use crate::restored::{RestoredCollection, RestoredStream};
use crate::stats::{BackupStats, StartAndEndTime};
use crate::streamstore::DetailsStore;
use crate::tree::{merge_collections, rewrite_base_path, IncrementalBase, UpdatedPaths};

/// Options controlling a backup run.
#[derive(Debug, Clone, Copy, Default)]
pub struct BackupOptions {
    /// Skip base discovery and run a full backup.
    pub disable_incrementals: bool,
}

/// Aggregated results of a backup run.
#[derive(Debug, Clone, Default)]
pub struct BackupResults {
    /// Run statistics, persisted with the backup model.
    pub stats: BackupStats,
    /// Wall-clock bounds.
    pub times: StartAndEndTime,
    /// Per-item write failures, as `(rel_path, message)` pairs.
    pub write_errors: Vec<(String, String)>,
}

/// One backup: locate bases, merge, upload, persist.
pub struct BackupOperation {
    /// Pre-declared stable ID of the backup record.
    pub backup_id: StableId,
    /// The selector driving this backup.
    pub selector: Selector,
    /// Current lifecycle status.
    pub status: OpStatus,
    /// Results, populated as the run progresses.
    pub results: BackupResults,

    tenant: String,
    options: BackupOptions,
    bus: Bus,
    engine: Arc<dyn SnapshotEngine>,
    models: Arc<ModelStore>,
}

/// Tag set identifying one `(owner, service, category)` reason.
fn reason_tags(
    owner: &str,
    service: ServiceType,
    category: CategoryType,
) -> BTreeMap<String, String> {
    let mut tags = BTreeMap::new();
    tags.insert("service".to_string(), service.as_str().to_string());
    tags.insert(format!("owner:{owner}"), String::new());
    tags.insert(format!("category:{category}"), String::new());
    tags
}

impl BackupOperation {
    pub(crate) fn new(
        tenant: String,
        selector: Selector,
        options: BackupOptions,
        bus: Bus,
        engine: Arc<dyn SnapshotEngine>,
        models: Arc<ModelStore>,
    ) -> Self {
        Self {
            backup_id: StableId::generate(),
            selector,
            status: OpStatus::Pending,
            results: BackupResults::default(),
            tenant,
            options,
            bus,
            engine,
            models,
        }
    }

    /// Runs the backup synchronously to a terminal status.
    pub fn run(
        &mut self,
        ctx: &CancelToken,
        connector: &dyn ServiceConnector,
    ) -> EngineResult<StableId> {
        self.status = OpStatus::Running;
        self.results.times.started_at = Some(Utc::now());

        let mut data = BTreeMap::new();
        data.insert("backup_id".to_string(), self.backup_id.to_string());
        data.insert(
            "service".to_string(),
            self.selector.service.as_str().to_string(),
        );
        self.bus.event(BACKUP_START, data);

        let outcome = self.execute(ctx, connector);

        self.results.times.completed_at = Some(Utc::now());

        if outcome.is_err() {
            self.status = OpStatus::Failed;
        }

        let mut data = BTreeMap::new();
        data.insert("backup_id".to_string(), self.backup_id.to_string());
        data.insert("status".to_string(), self.status.to_string());
        data.insert(
            "items_written".to_string(),
            self.results.stats.items_written.to_string(),
        );
        if let Some(duration) = self.results.times.duration() {
            data.insert("duration_ms".to_string(), duration.num_milliseconds().to_string());
        }
        self.bus.event(BACKUP_END, data);

        outcome.map(|()| self.backup_id.clone())
    }

    fn execute(&mut self, ctx: &CancelToken, connector: &dyn ServiceConnector) -> EngineResult<()> {
        let service = self.selector.service;

        // Owner discovery: wildcard scopes resolve against the connector.
        let (mut owners, wildcard) = self.selector.owners()?;
        if wildcard {
            owners.extend(connector.owners()?);
            owners.sort();
            owners.dedup();
        }

        let reasons = self.selector.reasons(&owners)?;

        let mut bases = if self.options.disable_incrementals {
            Vec::new()
        } else {
            self.find_bases(&reasons)?
        };

        let metadata = self.collect_metadata(ctx, &mut bases, connector)?;

        let collections = connector.produce(ctx, &self.selector, metadata)?;

        if collections.is_empty() && bases.is_empty() {
            self.status = OpStatus::NoData;
            return Ok(());
        }

        let collections: Vec<Arc<dyn Collection>> =
            collections.into_iter().map(Arc::from).collect();

        let catalog = Arc::new(Catalog::new());
        let progress = Arc::new(ItemProgress::new(catalog));

        let merged = merge_collections(self.engine.as_ref(), &bases, &collections, &progress)?;

        progress.set_base_index(self.build_base_index(ctx, &bases, &merged.updated)?);

        // Snapshot tags reflect what the collections actually cover, so base
        // discovery never selects a snapshot for a category it lacks.
        let mut tags = BTreeMap::new();
        for collection in &collections {
            if let Some(path) = collection.full_path() {
                tags.append(&mut reason_tags(
                    path.owner(),
                    path.service(),
                    path.category(),
                ));
            }
        }

        let (snapshot_id, snap_stats) = self
            .engine
            .upload(
                merged.root,
                &tags,
                Arc::clone(&progress) as Arc<dyn UploadProgress>,
                ctx,
            )
            .map_err(|e| {
                if e.is_cancelled() {
                    EngineError::from(e)
                } else {
                    EngineError::fatal(format!("uploading snapshot: {e}"))
                }
            })?;

        self.results.stats = BackupStats {
            items_read: snap_stats.file_count - snap_stats.cached_files,
            items_written: snap_stats.file_count - snap_stats.error_count,
            hashed_bytes: snap_stats.hashed_bytes,
            uploaded_bytes: snap_stats.uploaded_bytes,
            error_count: snap_stats.error_count,
            resource_owners: owners.len() as u64,
        };
        self.results.write_errors = progress.item_errors();

        let details_store =
            DetailsStore::new(Arc::clone(&self.engine), self.tenant.clone(), service);
        let details_id = details_store.write(progress.catalog(), ctx)?;

        // A put failure here is fatal and leaves the uploaded snapshot
        // orphaned in the engine; see DESIGN.md.
        let mut model_tags = tags.clone();
        model_tags.insert("snapshot_id".to_string(), snapshot_id.as_str().to_string());

        let mut model = BackupModel {
            base: BaseModel {
                stable_id: Some(self.backup_id.clone()),
                store_id: None,
                tags: model_tags,
            },
            created_at: Utc::now(),
            snapshot_id,
            details_id,
            selector: self.selector.clone(),
            stats: self.results.stats,
        };

        self.models.put(Schema::Backup, &mut model)?;

        self.status = if self.results.stats.items_written == 0
            && self.results.stats.error_count == 0
            && self.results.write_errors.is_empty()
        {
            OpStatus::NoData
        } else {
            OpStatus::Completed
        };

        Ok(())
    }

    /// Locates the newest complete snapshot for each reason, grouped by
    /// snapshot so shared bases are traversed once.
    fn find_bases(
        &self,
        reasons: &[(String, CategoryType)],
    ) -> EngineResult<Vec<IncrementalBase>> {
        let service = self.selector.service;
        let mut by_id: BTreeMap<String, IncrementalBase> = BTreeMap::new();

        for (owner, category) in reasons {
            let filter = reason_tags(owner, service, *category);
            let manifests = self.engine.find_snapshots(&filter)?;

            // Checkpoint snapshots of interrupted runs are skipped; the
            // store's own dedup covers their content.
            let Some(manifest) = manifests
                .into_iter()
                .find(|m| m.incomplete_reason.is_empty())
            else {
                continue;
            };

            let subtree = Path::new(
                &self.tenant,
                service,
                owner.clone(),
                *category,
                Vec::new(),
                None,
            )?;

            by_id
                .entry(manifest.id.as_str().to_string())
                .or_insert_with(|| IncrementalBase {
                    manifest,
                    subtree_paths: Vec::new(),
                })
                .subtree_paths
                .push(subtree);
        }

        Ok(by_id.into_values().collect())
    }

    /// Restores the metadata sidecar files of each base and bundles them for
    /// the connector. A base whose metadata cannot be read is dropped, and
    /// the run degrades to a full backup for its reasons.
    fn collect_metadata(
        &self,
        ctx: &CancelToken,
        bases: &mut Vec<IncrementalBase>,
        connector: &dyn ServiceConnector,
    ) -> EngineResult<Vec<RestoredCollection>> {
        let names = connector.metadata_items();
        if names.is_empty() {
            return Ok(Vec::new());
        }

        let counter = ByteCounter::new();
        let mut kept = Vec::with_capacity(bases.len());
        let mut collections = Vec::new();

        for base in bases.drain(..) {
            let mut base_collections = Vec::new();
            let mut usable = true;

            'subtrees: for subtree in &base.subtree_paths {
                let mut paths = Vec::with_capacity(names.len());
                for name in names {
                    paths.push(subtree.append(name, true)?);
                }

                match self
                    .engine
                    .restore_items(&base.manifest.id, &paths, &counter, ctx)
                {
                    Ok(items) => {
                        let collection = RestoredCollection::new(subtree.clone());

                        for item in items {
                            let reader =
                                FrameReader::new(SERIALIZATION_VERSION, item.reader);
                            collection.push(RestoredStream::new(
                                item.path.item().unwrap_or_default(),
                                Box::new(reader),
                            ));
                        }

                        base_collections.push(collection);
                    }
                    Err(e) if e.is_cancelled() => return Err(e.into()),
                    Err(e) => {
                        tracing::warn!(
                            snapshot = %base.manifest.id,
                            error = %e,
                            "dropping base: metadata unreadable, falling back to full backup"
                        );
                        usable = false;
                        break 'subtrees;
                    }
                }
            }

            if usable {
                collections.extend(base_collections);
                kept.push(base);
            }
        }

        *bases = kept;
        Ok(collections)
    }

    /// Builds the details index for items carried over from base snapshots,
    /// rewriting their paths through the registered moves and deletions.
    fn build_base_index(
        &self,
        ctx: &CancelToken,
        bases: &[IncrementalBase],
        updated: &UpdatedPaths,
    ) -> EngineResult<HashMap<String, ItemDetails>> {
        let mut index = HashMap::new();

        if bases.is_empty() {
            return Ok(index);
        }

        let details_store = DetailsStore::new(
            Arc::clone(&self.engine),
            self.tenant.clone(),
            self.selector.service,
        );

        for base in bases {
            let catalog = match self.base_catalog(ctx, base, &details_store) {
                Ok(Some(catalog)) => catalog,
                Ok(None) => continue,
                Err(e) if e.is_cancelled() => return Err(e),
                Err(e) => {
                    tracing::warn!(
                        snapshot = %base.manifest.id,
                        error = %e,
                        "base details unavailable, carried items will lack details"
                    );
                    continue;
                }
            };

            for entry in catalog.items() {
                let Ok(path) = Path::from_repo_ref(&entry.repo_ref, true) else {
                    continue;
                };

                let Some(rewritten) = rewrite_base_path(&path, updated) else {
                    continue;
                };

                let Ok(new_path) = Path::from_repo_ref(&rewritten.to_string(), true) else {
                    continue;
                };

                let elements = new_path.elements();
                let key = encode_as_path(elements[1..].iter().copied());

                index.insert(
                    key,
                    ItemDetails {
                        info: entry.info,
                        repo_path: new_path,
                    },
                );
            }
        }

        Ok(index)
    }

    /// Loads the details catalog of the backup owning a base snapshot.
    fn base_catalog(
        &self,
        ctx: &CancelToken,
        base: &IncrementalBase,
        details_store: &DetailsStore,
    ) -> EngineResult<Option<Catalog>> {
        let mut filter = BTreeMap::new();
        filter.insert(
            "snapshot_id".to_string(),
            base.manifest.id.as_str().to_string(),
        );

        let found = self.models.get_ids_for_type(Schema::Backup, &filter)?;

        let Some(stable_id) = found.first().and_then(|b| b.stable_id.clone()) else {
            return Ok(None);
        };

        let backup: BackupModel = self.models.get(Schema::Backup, &stable_id)?;

        Ok(Some(details_store.read(&backup.details_id, ctx)?))
    }
}
