//! A scripted service connector.

use std::io::Read;

use parking_lot::Mutex;

use cairn_core::{ConsumeStatus, EngineResult, RestoredCollection, ServiceConnector};
use cairn_data::Collection;
use cairn_path::ServiceType;
use cairn_select::Selector;
use cairn_store::CancelToken;

/// One item a restore handed to the connector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumedItem {
    /// Directory path of the collection.
    pub dir: String,
    /// Item ID within the directory.
    pub id: String,
    /// The item body, frame already stripped.
    pub body: Vec<u8>,
}

/// A connector producing pre-staged collections and recording everything a
/// restore hands back.
pub struct StubConnector {
    service: ServiceType,
    owners: Vec<String>,
    metadata_names: Vec<&'static str>,
    staged: Mutex<Vec<Box<dyn Collection>>>,

    /// Metadata item IDs observed per base subtree, as `(dir, ids)` pairs.
    pub metadata_seen: Mutex<Vec<(String, Vec<String>)>>,
    /// Everything handed to [`ServiceConnector::consume`].
    pub consumed: Mutex<Vec<ConsumedItem>>,
}

impl StubConnector {
    /// Creates a connector for the given service and owners.
    #[must_use]
    pub fn new(service: ServiceType, owners: &[&str]) -> Self {
        Self {
            service,
            owners: owners.iter().map(|o| o.to_string()).collect(),
            metadata_names: Vec::new(),
            staged: Mutex::new(Vec::new()),
            metadata_seen: Mutex::new(Vec::new()),
            consumed: Mutex::new(Vec::new()),
        }
    }

    /// Declares the metadata sidecar file names this connector writes.
    #[must_use]
    pub fn with_metadata_items(mut self, names: &[&'static str]) -> Self {
        self.metadata_names = names.to_vec();
        self
    }

    /// Stages a collection for the next `produce` call.
    pub fn stage(&self, collection: Box<dyn Collection>) {
        self.staged.lock().push(collection);
    }
}

impl ServiceConnector for StubConnector {
    fn service(&self) -> ServiceType {
        self.service
    }

    fn owners(&self) -> EngineResult<Vec<String>> {
        Ok(self.owners.clone())
    }

    fn metadata_items(&self) -> &[&str] {
        &self.metadata_names
    }

    fn produce(
        &self,
        _ctx: &CancelToken,
        _selector: &Selector,
        metadata: Vec<RestoredCollection>,
    ) -> EngineResult<Vec<Box<dyn Collection>>> {
        for collection in metadata {
            let dir = collection.path().to_string();
            let mut ids = Vec::new();

            for item in collection.items() {
                ids.push(item.id().to_string());

                // Drain the body so frame validation is exercised.
                let mut sink = Vec::new();
                let _ = item.into_reader().read_to_end(&mut sink);
            }

            self.metadata_seen.lock().push((dir, ids));
        }

        Ok(std::mem::take(&mut *self.staged.lock()))
    }

    fn consume(
        &self,
        _ctx: &CancelToken,
        _selector: &Selector,
        collections: Vec<RestoredCollection>,
    ) -> EngineResult<ConsumeStatus> {
        let mut status = ConsumeStatus::default();

        for collection in collections {
            let dir = collection.path().to_string();

            for item in collection.items() {
                let id = item.id().to_string();
                let mut body = Vec::new();

                match item.into_reader().read_to_end(&mut body) {
                    Ok(_) => {
                        status.items_written += 1;
                        self.consumed.lock().push(ConsumedItem {
                            dir: dir.clone(),
                            id,
                            body,
                        });
                    }
                    Err(e) => {
                        status.errors.push((format!("{dir}/{id}"), e.to_string()));
                    }
                }
            }
        }

        Ok(status)
    }
}
