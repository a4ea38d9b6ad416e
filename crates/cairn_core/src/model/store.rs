//! Schema-tagged typed CRUD over the opaque manifest store.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use cairn_store::{ManifestId, ManifestMeta, ManifestStore};

use crate::error::{EngineError, EngineResult};
use crate::model::{BaseModel, Model, Schema, StableId};

/// Model version written by this build.
pub const CURRENT_MODEL_VERSION: u32 = 1;

/// Label carrying a record's stable ID. Reserved.
const STABLE_ID_LABEL: &str = "stable_id";

/// Label carrying a record's schema. Reserved.
const SCHEMA_LABEL: &str = "schema";

#[derive(Serialize, Deserialize)]
struct Envelope {
    version: u32,
    model: serde_json::Value,
}

/// Typed CRUD over an opaque manifest store.
///
/// Records are labeled with their schema and stable ID; bodies carry a
/// version envelope compared against the store's configured model version on
/// every read. The version is a constructor argument, configured from the
/// repository record at connect time.
pub struct ModelStore {
    store: Arc<dyn ManifestStore>,
    model_version: u32,
}

impl ModelStore {
    /// Creates a model store reading and writing the given model version.
    #[must_use]
    pub fn new(store: Arc<dyn ManifestStore>, model_version: u32) -> Self {
        Self {
            store,
            model_version,
        }
    }

    /// The model version this store is configured with.
    #[must_use]
    pub fn model_version(&self) -> u32 {
        self.model_version
    }

    fn check_schema(schema: Schema) -> EngineResult<()> {
        if schema == Schema::Unknown {
            return Err(EngineError::UnknownSchema);
        }

        Ok(())
    }

    fn check_tags(tags: &BTreeMap<String, String>) -> EngineResult<()> {
        for key in tags.keys() {
            if key == STABLE_ID_LABEL || key == SCHEMA_LABEL {
                return Err(EngineError::bad_tag_key(key));
            }
        }

        Ok(())
    }

    fn labels_for(schema: Schema, stable_id: &StableId, tags: &BTreeMap<String, String>) -> BTreeMap<String, String> {
        let mut labels = tags.clone();
        labels.insert(SCHEMA_LABEL.to_string(), schema.as_str().to_string());
        labels.insert(STABLE_ID_LABEL.to_string(), stable_id.as_str().to_string());
        labels
    }

    fn schema_of(labels: &BTreeMap<String, String>) -> String {
        labels.get(SCHEMA_LABEL).cloned().unwrap_or_default()
    }

    fn verify_schema(schema: Schema, labels: &BTreeMap<String, String>) -> EngineResult<()> {
        let got = Self::schema_of(labels);

        if got != schema.as_str() {
            return Err(EngineError::SchemaMismatch {
                wanted: schema.as_str(),
                got,
            });
        }

        Ok(())
    }

    fn encode_body<T: Model>(&self, model: &T, version: u32) -> EngineResult<Vec<u8>> {
        let envelope = Envelope {
            version,
            model: serde_json::to_value(model)?,
        };

        Ok(serde_json::to_vec(&envelope)?)
    }

    fn decode_body<T: Model>(&self, body: &[u8]) -> EngineResult<T> {
        let envelope: Envelope = serde_json::from_slice(body)?;

        if envelope.version != self.model_version {
            return Err(EngineError::VersionMismatch {
                expected: self.model_version,
                actual: envelope.version,
            });
        }

        Ok(serde_json::from_value(envelope.model)?)
    }

    fn stored_version(body: &[u8]) -> EngineResult<u32> {
        let envelope: Envelope = serde_json::from_slice(body)?;
        Ok(envelope.version)
    }

    /// Writes a new record, assigning a store ID and, if absent, a stable ID.
    ///
    /// Both IDs are set on the in-memory model only when the write commits.
    pub fn put<T: Model>(&self, schema: Schema, model: &mut T) -> EngineResult<()> {
        Self::check_schema(schema)?;
        Self::check_tags(&model.base().tags)?;

        let prior_stable = model.base().stable_id.clone();

        let stable_id = prior_stable.clone().unwrap_or_else(StableId::generate);
        model.base_mut().stable_id = Some(stable_id.clone());

        let labels = Self::labels_for(schema, &stable_id, &model.base().tags);

        let body = match self.encode_body(model, self.model_version) {
            Ok(body) => body,
            Err(e) => {
                model.base_mut().stable_id = prior_stable;
                return Err(e);
            }
        };

        let mut new_id = None;

        let result = self.store.session(&mut |w| {
            new_id = Some(w.put(labels.clone(), body.clone())?);
            Ok(())
        });

        match result {
            Ok(()) => {
                model.base_mut().store_id = new_id;
                Ok(())
            }
            Err(e) => {
                model.base_mut().stable_id = prior_stable;
                Err(e.into())
            }
        }
    }

    /// Rewrites an existing record, preserving its stored model version.
    pub fn update<T: Model>(&self, schema: Schema, model: &mut T) -> EngineResult<()> {
        Self::check_schema(schema)?;
        Self::check_tags(&model.base().tags)?;

        let stable_id = model
            .base()
            .stable_id
            .clone()
            .filter(|id| !id.is_empty())
            .ok_or_else(|| EngineError::invalid_model("update requires a stable ID"))?;

        let old_store_id = model
            .base()
            .store_id
            .clone()
            .filter(|id| !id.as_str().is_empty())
            .ok_or_else(|| EngineError::invalid_model("update requires a store ID"))?;

        let (prior_labels, prior_body) = self.store.get(&old_store_id).map_err(|e| {
            if matches!(e, cairn_store::StoreError::NotFound { .. }) {
                EngineError::not_found(schema.as_str(), old_store_id.as_str())
            } else {
                e.into()
            }
        })?;

        Self::verify_schema(schema, &prior_labels)?;

        if prior_labels.get(STABLE_ID_LABEL) != Some(&stable_id.as_str().to_string()) {
            return Err(EngineError::invalid_model(
                "stable ID does not match the stored record",
            ));
        }

        // Callers cannot downgrade or upgrade a record's version by updating.
        let prior_version = Self::stored_version(&prior_body)?;

        let labels = Self::labels_for(schema, &stable_id, &model.base().tags);
        let body = self.encode_body(model, prior_version)?;

        let mut new_id = None;

        self.store.session(&mut |w| {
            w.delete(&old_store_id)?;
            new_id = Some(w.put(labels.clone(), body.clone())?);
            Ok(())
        })?;

        model.base_mut().store_id = new_id;
        Ok(())
    }

    fn find_by_stable(&self, stable_id: &StableId) -> EngineResult<Option<ManifestMeta>> {
        let mut filter = BTreeMap::new();
        filter.insert(STABLE_ID_LABEL.to_string(), stable_id.as_str().to_string());

        let mut found = self.store.find(&filter)?;
        Ok(if found.is_empty() {
            None
        } else {
            Some(found.remove(0))
        })
    }

    /// Fetches a record by schema and stable ID.
    pub fn get<T: Model>(&self, schema: Schema, stable_id: &StableId) -> EngineResult<T> {
        Self::check_schema(schema)?;

        if stable_id.is_empty() {
            return Err(EngineError::invalid_model("get requires a stable ID"));
        }

        let meta = self
            .find_by_stable(stable_id)?
            .ok_or_else(|| EngineError::not_found(schema.as_str(), stable_id.as_str()))?;

        Self::verify_schema(schema, &meta.labels)?;

        let (_, body) = self.store.get(&meta.id)?;
        let mut model: T = self.decode_body(&body)?;

        model.base_mut().stable_id = Some(stable_id.clone());
        model.base_mut().store_id = Some(meta.id);

        Ok(model)
    }

    /// Fetches a record by schema and store ID.
    pub fn get_by_store_id<T: Model>(
        &self,
        schema: Schema,
        store_id: &ManifestId,
    ) -> EngineResult<T> {
        Self::check_schema(schema)?;

        if store_id.as_str().is_empty() {
            return Err(EngineError::invalid_model("get requires a store ID"));
        }

        let (labels, body) = self.store.get(store_id).map_err(|e| {
            if matches!(e, cairn_store::StoreError::NotFound { .. }) {
                EngineError::not_found(schema.as_str(), store_id.as_str())
            } else {
                e.into()
            }
        })?;

        Self::verify_schema(schema, &labels)?;

        let mut model: T = self.decode_body(&body)?;

        model.base_mut().stable_id = labels
            .get(STABLE_ID_LABEL)
            .map(|id| StableId::new(id.clone()));
        model.base_mut().store_id = Some(store_id.clone());

        Ok(model)
    }

    /// Lists the identity blocks of records of a schema whose tags are a
    /// superset of the filter.
    pub fn get_ids_for_type(
        &self,
        schema: Schema,
        tag_filter: &BTreeMap<String, String>,
    ) -> EngineResult<Vec<BaseModel>> {
        Self::check_schema(schema)?;
        Self::check_tags(tag_filter)?;

        let mut filter = tag_filter.clone();
        filter.insert(SCHEMA_LABEL.to_string(), schema.as_str().to_string());

        let found = self.store.find(&filter)?;

        Ok(found
            .into_iter()
            .map(|meta| {
                let mut tags = meta.labels;
                let stable_id = tags.remove(STABLE_ID_LABEL).map(StableId::new);
                tags.remove(SCHEMA_LABEL);

                BaseModel {
                    stable_id,
                    store_id: Some(meta.id),
                    tags,
                }
            })
            .collect())
    }

    /// Deletes a record by schema and stable ID. Missing records are a no-op.
    pub fn delete(&self, schema: Schema, stable_id: &StableId) -> EngineResult<()> {
        Self::check_schema(schema)?;

        if stable_id.is_empty() {
            return Err(EngineError::invalid_model("delete requires a stable ID"));
        }

        let Some(meta) = self.find_by_stable(stable_id)? else {
            return Ok(());
        };

        Self::verify_schema(schema, &meta.labels)?;

        self.store.session(&mut |w| w.delete(&meta.id))?;
        Ok(())
    }

    /// Deletes a record by store ID. Missing records are a no-op.
    pub fn delete_by_store_id(&self, store_id: &ManifestId) -> EngineResult<()> {
        if store_id.as_str().is_empty() {
            return Err(EngineError::invalid_model("delete requires a store ID"));
        }

        self.store.session(&mut |w| w.delete(store_id))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cairn_store::{
        ManifestWriter, MemoryManifests, StoreError, StoreResult,
    };
    use serde::{Deserialize, Serialize};
    use uuid::Uuid;

    #[derive(Debug, Default, Clone, Serialize, Deserialize, PartialEq)]
    struct FooModel {
        base: BaseModel,
        bar: String,
    }

    impl Model for FooModel {
        fn base(&self) -> &BaseModel {
            &self.base
        }

        fn base_mut(&mut self) -> &mut BaseModel {
            &mut self.base
        }
    }

    fn store() -> ModelStore {
        ModelStore::new(Arc::new(MemoryManifests::new()), CURRENT_MODEL_VERSION)
    }

    fn foo(bar: &str) -> FooModel {
        FooModel {
            base: BaseModel::default(),
            bar: bar.to_string(),
        }
    }

    #[test]
    fn put_then_get_roundtrips() {
        let ms = store();
        let mut model = foo("hello");
        model
            .base
            .tags
            .insert("color".to_string(), "blue".to_string());

        ms.put(Schema::BackupOp, &mut model).unwrap();

        let stable = model.base.stable_id.clone().unwrap();
        assert!(model.base.store_id.is_some());

        let got: FooModel = ms.get(Schema::BackupOp, &stable).unwrap();
        assert_eq!(got.bar, "hello");
        assert_eq!(got.base.tags.get("color"), Some(&"blue".to_string()));
        assert_eq!(got.base.stable_id, model.base.stable_id);
    }

    #[test]
    fn reserved_tag_keys_rejected() {
        let ms = store();

        for key in [STABLE_ID_LABEL, SCHEMA_LABEL] {
            let mut model = foo("x");
            model.base.tags.insert(key.to_string(), "v".to_string());

            assert!(matches!(
                ms.put(Schema::BackupOp, &mut model),
                Err(EngineError::BadTagKey { .. })
            ));

            model.base.tags.clear();
            ms.put(Schema::BackupOp, &mut model).unwrap();

            model.base.tags.insert(key.to_string(), "v".to_string());
            assert!(matches!(
                ms.update(Schema::BackupOp, &mut model),
                Err(EngineError::BadTagKey { .. })
            ));

            let mut filter = BTreeMap::new();
            filter.insert(key.to_string(), "v".to_string());
            assert!(matches!(
                ms.get_ids_for_type(Schema::BackupOp, &filter),
                Err(EngineError::BadTagKey { .. })
            ));
        }
    }

    #[test]
    fn unknown_schema_rejected() {
        let ms = store();
        let mut model = foo("x");

        assert!(matches!(
            ms.put(Schema::Unknown, &mut model),
            Err(EngineError::UnknownSchema)
        ));

        assert!(matches!(
            ms.get_ids_for_type(Schema::Unknown, &BTreeMap::new()),
            Err(EngineError::UnknownSchema)
        ));
    }

    #[test]
    fn wrong_schema_read_is_a_mismatch() {
        let ms = store();
        let mut model = foo("x");
        ms.put(Schema::BackupOp, &mut model).unwrap();

        let stable = model.base.stable_id.clone().unwrap();
        let store_id = model.base.store_id.clone().unwrap();

        assert!(matches!(
            ms.get::<FooModel>(Schema::RestoreOp, &stable),
            Err(EngineError::SchemaMismatch { .. })
        ));

        assert!(matches!(
            ms.get_by_store_id::<FooModel>(Schema::RestoreOp, &store_id),
            Err(EngineError::SchemaMismatch { .. })
        ));

        assert!(matches!(
            ms.delete(Schema::RestoreOp, &stable),
            Err(EngineError::SchemaMismatch { .. })
        ));
    }

    #[test]
    fn version_mismatch_on_read() {
        let manifests: Arc<dyn ManifestStore> = Arc::new(MemoryManifests::new());

        let writer = ModelStore::new(Arc::clone(&manifests), 7);
        let mut model = foo("x");
        writer.put(Schema::BackupOp, &mut model).unwrap();

        let reader = ModelStore::new(manifests, 8);
        let stable = model.base.stable_id.clone().unwrap();

        assert!(matches!(
            reader.get::<FooModel>(Schema::BackupOp, &stable),
            Err(EngineError::VersionMismatch {
                expected: 8,
                actual: 7
            })
        ));
    }

    #[test]
    fn update_reassigns_store_id_and_preserves_stable_id() {
        let ms = store();
        let mut model = foo("v1");
        ms.put(Schema::BackupOp, &mut model).unwrap();

        let stable = model.base.stable_id.clone().unwrap();
        let first_store_id = model.base.store_id.clone().unwrap();

        model.bar = "v2".to_string();
        ms.update(Schema::BackupOp, &mut model).unwrap();

        assert_eq!(model.base.stable_id.as_ref(), Some(&stable));
        assert_ne!(model.base.store_id.as_ref(), Some(&first_store_id));

        let got: FooModel = ms.get(Schema::BackupOp, &stable).unwrap();
        assert_eq!(got.bar, "v2");

        // The old store ID no longer resolves.
        assert!(ms
            .get_by_store_id::<FooModel>(Schema::BackupOp, &first_store_id)
            .is_err());
    }

    #[test]
    fn update_requires_both_ids() {
        let ms = store();

        let mut no_stable = foo("x");
        no_stable.base.store_id = Some(ManifestId::new("m-1"));
        assert!(ms.update(Schema::BackupOp, &mut no_stable).is_err());

        let mut no_store = foo("x");
        no_store.base.stable_id = Some(StableId::generate());
        assert!(ms.update(Schema::BackupOp, &mut no_store).is_err());
    }

    #[test]
    fn empty_ids_rejected() {
        let ms = store();

        assert!(ms.get::<FooModel>(Schema::BackupOp, &StableId::new("")).is_err());
        assert!(ms
            .get_by_store_id::<FooModel>(Schema::BackupOp, &ManifestId::new(""))
            .is_err());
        assert!(ms.delete(Schema::BackupOp, &StableId::new("")).is_err());
        assert!(ms.delete_by_store_id(&ManifestId::new("")).is_err());
    }

    #[test]
    fn get_ids_for_type_filters_by_tags() {
        let ms = store();

        let mut tagged = foo("tagged");
        tagged
            .base
            .tags
            .insert("owner".to_string(), "alice".to_string());
        ms.put(Schema::Backup, &mut tagged).unwrap();

        let mut other = foo("other");
        other
            .base
            .tags
            .insert("owner".to_string(), "bob".to_string());
        ms.put(Schema::Backup, &mut other).unwrap();

        let mut wrong_schema = foo("op");
        ms.put(Schema::BackupOp, &mut wrong_schema).unwrap();

        let mut filter = BTreeMap::new();
        filter.insert("owner".to_string(), "alice".to_string());

        let found = ms.get_ids_for_type(Schema::Backup, &filter).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].stable_id, tagged.base.stable_id);
        assert_eq!(found[0].tags.get("owner"), Some(&"alice".to_string()));
        assert!(!found[0].tags.contains_key(SCHEMA_LABEL));
    }

    #[test]
    fn delete_is_tolerant_of_missing_ids() {
        let ms = store();
        assert!(ms.delete(Schema::Backup, &StableId::generate()).is_ok());
        assert!(ms
            .delete_by_store_id(&ManifestId::new("m-missing"))
            .is_ok());
    }

    #[test]
    fn delete_removes_the_record() {
        let ms = store();
        let mut model = foo("x");
        ms.put(Schema::Backup, &mut model).unwrap();

        let stable = model.base.stable_id.clone().unwrap();
        ms.delete(Schema::Backup, &stable).unwrap();

        assert!(matches!(
            ms.get::<FooModel>(Schema::Backup, &stable),
            Err(EngineError::NotFound { .. })
        ));
    }

    /// A manifest store whose sessions hand out IDs, then fail to commit.
    struct FailingManifests;

    struct FailingWriter {
        ids: Vec<ManifestId>,
    }

    impl ManifestWriter for FailingWriter {
        fn put(
            &mut self,
            _labels: BTreeMap<String, String>,
            _body: Vec<u8>,
        ) -> StoreResult<ManifestId> {
            let id = ManifestId::new(format!("m-{}", Uuid::new_v4()));
            self.ids.push(id.clone());
            Ok(id)
        }

        fn delete(&mut self, _id: &ManifestId) -> StoreResult<()> {
            Ok(())
        }
    }

    impl cairn_store::ManifestStore for FailingManifests {
        fn get(&self, id: &ManifestId) -> StoreResult<(BTreeMap<String, String>, Vec<u8>)> {
            Err(StoreError::not_found("manifest", id.as_str()))
        }

        fn find(&self, _labels: &BTreeMap<String, String>) -> StoreResult<Vec<ManifestMeta>> {
            Ok(Vec::new())
        }

        fn session(
            &self,
            body: &mut dyn FnMut(&mut dyn ManifestWriter) -> StoreResult<()>,
        ) -> StoreResult<()> {
            let mut writer = FailingWriter { ids: Vec::new() };
            body(&mut writer)?;
            Err(StoreError::corrupt("simulated commit failure"))
        }
    }

    #[test]
    fn failed_session_reverts_in_memory_ids() {
        let failing = ModelStore::new(Arc::new(FailingManifests), CURRENT_MODEL_VERSION);

        let mut model = foo("x");
        let err = failing.put(Schema::BackupOp, &mut model);

        assert!(err.is_err());
        assert!(model.base.stable_id.is_none());
        assert!(model.base.store_id.is_none());
    }

    /// Delegates reads to an inner store but fails every session after the
    /// first `allowed` have committed.
    struct FlakyManifests {
        inner: MemoryManifests,
        remaining: std::sync::atomic::AtomicUsize,
    }

    impl cairn_store::ManifestStore for FlakyManifests {
        fn get(&self, id: &ManifestId) -> StoreResult<(BTreeMap<String, String>, Vec<u8>)> {
            self.inner.get(id)
        }

        fn find(&self, labels: &BTreeMap<String, String>) -> StoreResult<Vec<ManifestMeta>> {
            self.inner.find(labels)
        }

        fn session(
            &self,
            body: &mut dyn FnMut(&mut dyn ManifestWriter) -> StoreResult<()>,
        ) -> StoreResult<()> {
            use std::sync::atomic::Ordering;

            if self
                .remaining
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return self.inner.session(body);
            }

            let mut writer = FailingWriter { ids: Vec::new() };
            body(&mut writer)?;
            Err(StoreError::corrupt("simulated commit failure"))
        }
    }

    #[test]
    fn failed_update_leaves_original_record_readable() {
        let flaky = Arc::new(FlakyManifests {
            inner: MemoryManifests::new(),
            remaining: std::sync::atomic::AtomicUsize::new(1),
        });
        let ms = ModelStore::new(flaky, CURRENT_MODEL_VERSION);

        let mut model = foo("original");
        ms.put(Schema::BackupOp, &mut model).unwrap();
        let old_store_id = model.base.store_id.clone().unwrap();

        model.bar = "updated".to_string();
        assert!(ms.update(Schema::BackupOp, &mut model).is_err());

        // The in-memory store ID did not advance and the original record is
        // still retrievable under it.
        assert_eq!(model.base.store_id.as_ref(), Some(&old_store_id));

        let got: FooModel = ms
            .get_by_store_id(Schema::BackupOp, &old_store_id)
            .unwrap();
        assert_eq!(got.bar, "original");
    }
}
