//! The repository facade: lifecycle of the store pair and admission of
//! operations.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use cairn_details::Catalog;
use cairn_select::Selector;
use cairn_store::{CancelToken, ManifestStore, SnapshotEngine};

use crate::error::{EngineError, EngineResult};
use crate::events::{Bus, REPO_CONNECT, REPO_INIT};
use crate::model::{
    BackupModel, BaseModel, ModelStore, RepositoryModel, Schema, StableId, CURRENT_MODEL_VERSION,
};
use crate::ops::{BackupOperation, BackupOptions, RestoreOperation};
use crate::streamstore::DetailsStore;

/// Repository format version written by this build.
const REPO_VERSION: &str = "v1";

/// An open repository: the snapshot engine and model store pair, the event
/// bus, and the admission point for operations.
pub struct Repository {
    id: String,
    created_at: DateTime<Utc>,
    tenant: String,
    bus: Bus,
    engine: Option<Arc<dyn SnapshotEngine>>,
    models: Option<Arc<ModelStore>>,
}

impl Repository {
    /// Creates the repository record in a fresh store pair.
    ///
    /// Refuses to initialize over a store that already holds a repository
    /// record.
    pub fn initialize(
        tenant: impl Into<String>,
        engine: Arc<dyn SnapshotEngine>,
        manifests: Arc<dyn ManifestStore>,
        bus: Bus,
    ) -> EngineResult<Self> {
        let models = ModelStore::new(manifests, CURRENT_MODEL_VERSION);

        if !models
            .get_ids_for_type(Schema::Repository, &BTreeMap::new())?
            .is_empty()
        {
            return Err(EngineError::AlreadyExists);
        }

        let mut record = RepositoryModel {
            base: BaseModel::default(),
            repo_id: Uuid::new_v4().to_string(),
            version: REPO_VERSION.to_string(),
            model_version: CURRENT_MODEL_VERSION,
            created_at: Utc::now(),
        };

        models.put(Schema::Repository, &mut record)?;

        bus.set_repo_id(&record.repo_id);
        bus.event(REPO_INIT, BTreeMap::new());

        Ok(Self {
            id: record.repo_id,
            created_at: record.created_at,
            tenant: tenant.into(),
            bus,
            engine: Some(engine),
            models: Some(Arc::new(models)),
        })
    }

    /// Connects to an initialized repository, loading its record and
    /// configuring the model store with the recorded model version.
    pub fn connect(
        tenant: impl Into<String>,
        engine: Arc<dyn SnapshotEngine>,
        manifests: Arc<dyn ManifestStore>,
        bus: Bus,
    ) -> EngineResult<Self> {
        // Bootstrap with the current version just to read the repo record.
        let bootstrap = ModelStore::new(Arc::clone(&manifests), CURRENT_MODEL_VERSION);

        let ids = bootstrap.get_ids_for_type(Schema::Repository, &BTreeMap::new())?;

        let stable_id = ids
            .first()
            .and_then(|b| b.stable_id.clone())
            .ok_or_else(|| EngineError::not_found("repository", "repository record"))?;

        let record: RepositoryModel = bootstrap.get(Schema::Repository, &stable_id)?;

        let models = ModelStore::new(manifests, record.model_version);

        bus.set_repo_id(&record.repo_id);
        bus.event(REPO_CONNECT, BTreeMap::new());

        Ok(Self {
            id: record.repo_id,
            created_at: record.created_at,
            tenant: tenant.into(),
            bus,
            engine: Some(engine),
            models: Some(Arc::new(models)),
        })
    }

    /// The repository's UUID.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// When the repository was initialized.
    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// The event bus.
    #[must_use]
    pub fn bus(&self) -> &Bus {
        &self.bus
    }

    /// Releases the store handles in LIFO order. A second close is a no-op.
    pub fn close(&mut self) {
        drop(self.models.take());
        drop(self.engine.take());
    }

    fn engine(&self) -> EngineResult<Arc<dyn SnapshotEngine>> {
        self.engine.clone().ok_or(EngineError::Closed)
    }

    fn models(&self) -> EngineResult<Arc<ModelStore>> {
        self.models.clone().ok_or(EngineError::Closed)
    }

    /// Admits a new backup operation for the given selector.
    pub fn new_backup(
        &self,
        selector: Selector,
        options: BackupOptions,
    ) -> EngineResult<BackupOperation> {
        Ok(BackupOperation::new(
            self.tenant.clone(),
            selector,
            options,
            self.bus.clone(),
            self.engine()?,
            self.models()?,
        ))
    }

    /// Admits a new restore operation against an existing backup.
    pub fn new_restore(
        &self,
        backup_id: StableId,
        selector: Selector,
    ) -> EngineResult<RestoreOperation> {
        Ok(RestoreOperation::new(
            self.tenant.clone(),
            backup_id,
            selector,
            self.bus.clone(),
            self.engine()?,
            self.models()?,
        ))
    }

    /// Fetches one backup record.
    pub fn backup(&self, id: &StableId) -> EngineResult<BackupModel> {
        self.models()?.get(Schema::Backup, id)
    }

    /// Fetches several backup records.
    pub fn backups(&self, ids: &[StableId]) -> EngineResult<Vec<BackupModel>> {
        let models = self.models()?;
        ids.iter().map(|id| models.get(Schema::Backup, id)).collect()
    }

    /// Lists backup records whose tags are a superset of the filter.
    pub fn backups_by_tag(
        &self,
        filter: &BTreeMap<String, String>,
    ) -> EngineResult<Vec<BackupModel>> {
        let models = self.models()?;
        let mut out: Vec<BackupModel> = Vec::new();

        for base in models.get_ids_for_type(Schema::Backup, filter)? {
            let Some(stable_id) = base.stable_id else {
                continue;
            };

            out.push(models.get(Schema::Backup, &stable_id)?);
        }

        out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(out)
    }

    /// Loads a backup together with its details catalog.
    pub fn backup_details(&self, id: &StableId) -> EngineResult<(Catalog, BackupModel)> {
        let backup = self.backup(id)?;

        let details_store = DetailsStore::new(
            self.engine()?,
            self.tenant.clone(),
            backup.selector.service,
        );

        let catalog = details_store.read(&backup.details_id, &CancelToken::new())?;
        Ok((catalog, backup))
    }

    /// Deletes a backup: its record, its details blob, and its snapshot.
    pub fn delete_backup(&self, id: &StableId) -> EngineResult<()> {
        let backup = self.backup(id)?;

        let engine = self.engine()?;
        engine.delete_snapshot(&backup.snapshot_id)?;

        let details_store = DetailsStore::new(
            Arc::clone(&engine),
            self.tenant.clone(),
            backup.selector.service,
        );
        details_store.delete(&backup.details_id)?;

        self.models()?.delete(Schema::Backup, id)
    }
}

impl Drop for Repository {
    fn drop(&mut self) {
        self.close();
    }
}
