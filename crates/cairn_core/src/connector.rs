//! The seam to the external service collectors.

use cairn_data::Collection;
use cairn_path::ServiceType;
use cairn_select::Selector;
use cairn_store::CancelToken;

use crate::error::EngineResult;
use crate::restored::RestoredCollection;

/// Outcome of handing restored collections to a connector.
#[derive(Debug, Default, Clone)]
pub struct ConsumeStatus {
    /// Items successfully re-materialized at the destination.
    pub items_written: u64,
    /// Per-item failures, as `(path, message)` pairs.
    pub errors: Vec<(String, String)>,
}

/// A service connector: produces collections for backup and re-materializes
/// them on restore.
///
/// Connector failures on individual items or containers are expected to be
/// accumulated into the returned collections/status, never to abort sibling
/// work; only infrastructure-level failures surface as errors.
pub trait ServiceConnector: Send + Sync {
    /// The service this connector speaks to.
    fn service(&self) -> ServiceType;

    /// Discovers the resource owners available to wildcard selectors.
    fn owners(&self) -> EngineResult<Vec<String>>;

    /// Names of the metadata sidecar files this connector writes into each
    /// category root (delta tokens, previous-path maps, ...).
    fn metadata_items(&self) -> &[&str] {
        &[]
    }

    /// Produces the collections for a backup run.
    ///
    /// `metadata` carries the sidecar files recovered from the base
    /// snapshot, empty on a full backup; the connector uses them to decide
    /// what to re-fetch and which collections moved or vanished.
    fn produce(
        &self,
        ctx: &CancelToken,
        selector: &Selector,
        metadata: Vec<RestoredCollection>,
    ) -> EngineResult<Vec<Box<dyn Collection>>>;

    /// Re-materializes restored collections at the destination.
    fn consume(
        &self,
        ctx: &CancelToken,
        selector: &Selector,
        collections: Vec<RestoredCollection>,
    ) -> EngineResult<ConsumeStatus>;
}
