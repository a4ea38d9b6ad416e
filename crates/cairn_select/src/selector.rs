//! The service-agnostic selector carried through operations and models.

use serde::{Deserialize, Serialize};

use cairn_details::Catalog;
use cairn_path::{CategoryType, ServiceType};

use crate::error::{SelectError, SelectResult};
use crate::exchange::{ExchangeCategory, ExchangeSelector};
use crate::onedrive::{OneDriveCategory, OneDriveSelector};
use crate::pattern::Pattern;
use crate::scope::{Categorizer, RawScope, Scope};
use crate::sharepoint::{SharePointCategory, SharePointSelector};

/// A serializable selector: a service tag plus three ordered scope sets.
///
/// The typed, service-specific APIs live on the cast results
/// ([`ExchangeSelector`], [`OneDriveSelector`], [`SharePointSelector`]).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selector {
    /// The service every scope in this selector addresses.
    pub service: ServiceType,
    pub(crate) includes: Vec<RawScope>,
    pub(crate) filters: Vec<RawScope>,
    pub(crate) excludes: Vec<RawScope>,
}

impl Selector {
    /// Creates an empty selector for a service.
    #[must_use]
    pub fn new(service: ServiceType) -> Self {
        Self {
            service,
            includes: Vec::new(),
            filters: Vec::new(),
            excludes: Vec::new(),
        }
    }

    /// Casts into the Exchange-typed selector.
    pub fn to_exchange(self) -> SelectResult<ExchangeSelector> {
        if self.service != ServiceType::Exchange {
            return Err(SelectError::service_mismatch(
                ServiceType::Exchange,
                self.service,
            ));
        }

        Ok(ExchangeSelector::wrap(self))
    }

    /// Casts into the OneDrive-typed selector.
    pub fn to_onedrive(self) -> SelectResult<OneDriveSelector> {
        if self.service != ServiceType::OneDrive {
            return Err(SelectError::service_mismatch(
                ServiceType::OneDrive,
                self.service,
            ));
        }

        Ok(OneDriveSelector::wrap(self))
    }

    /// Casts into the SharePoint-typed selector.
    pub fn to_sharepoint(self) -> SelectResult<SharePointSelector> {
        if self.service != ServiceType::SharePoint {
            return Err(SelectError::service_mismatch(
                ServiceType::SharePoint,
                self.service,
            ));
        }

        Ok(SharePointSelector::wrap(self))
    }

    /// Reduces a details catalog to the entries this selector keeps.
    pub fn reduce(&self, catalog: &Catalog) -> SelectResult<Catalog> {
        match self.service {
            ServiceType::Exchange => self.reduce_as::<ExchangeCategory>(catalog),
            ServiceType::OneDrive => self.reduce_as::<OneDriveCategory>(catalog),
            ServiceType::SharePoint => self.reduce_as::<SharePointCategory>(catalog),
        }
    }

    /// The owners named by include scopes, plus whether any scope wildcards
    /// its owner (and thus needs owner discovery).
    pub fn owners(&self) -> SelectResult<(Vec<String>, bool)> {
        match self.service {
            ServiceType::Exchange => self.owners_as::<ExchangeCategory>(),
            ServiceType::OneDrive => self.owners_as::<OneDriveCategory>(),
            ServiceType::SharePoint => self.owners_as::<SharePointCategory>(),
        }
    }

    /// The `(owner, category)` pairs this selector backs up, with Any-owner
    /// scopes expanded over the discovered owner list.
    pub fn reasons(&self, discovered: &[String]) -> SelectResult<Vec<(String, CategoryType)>> {
        match self.service {
            ServiceType::Exchange => self.reasons_as::<ExchangeCategory>(discovered),
            ServiceType::OneDrive => self.reasons_as::<OneDriveCategory>(discovered),
            ServiceType::SharePoint => self.reasons_as::<SharePointCategory>(discovered),
        }
    }

    pub(crate) fn push_includes<C: Categorizer>(&mut self, scopes: Vec<Scope<C>>) {
        self.includes
            .extend(scopes.iter().map(RawScope::from_scope));
    }

    pub(crate) fn push_filters<C: Categorizer>(&mut self, scopes: Vec<Scope<C>>) {
        self.filters.extend(scopes.iter().map(RawScope::from_scope));
    }

    pub(crate) fn push_excludes<C: Categorizer>(&mut self, scopes: Vec<Scope<C>>) {
        self.excludes
            .extend(scopes.iter().map(RawScope::from_scope));
    }

    pub(crate) fn typed<C: Categorizer>(raw: &[RawScope]) -> SelectResult<Vec<Scope<C>>> {
        raw.iter().map(RawScope::to_scope).collect()
    }

    fn reduce_as<C: Categorizer>(&self, catalog: &Catalog) -> SelectResult<Catalog> {
        let includes = Self::typed::<C>(&self.includes)?;
        let filters = Self::typed::<C>(&self.filters)?;
        let excludes = Self::typed::<C>(&self.excludes)?;

        Ok(crate::scope::reduce(
            catalog, &includes, &filters, &excludes,
        ))
    }

    fn owners_as<C: Categorizer>(&self) -> SelectResult<(Vec<String>, bool)> {
        let includes = Self::typed::<C>(&self.includes)?;
        let root = C::root();

        let mut owners = Vec::new();
        let mut wildcard = false;

        for scope in &includes {
            match scope.get(root) {
                Pattern::Any => wildcard = true,
                pattern => {
                    if let Some(values) = pattern.literal_values() {
                        owners.extend(values.iter().cloned());
                    }
                }
            }
        }

        owners.sort();
        owners.dedup();

        Ok((owners, wildcard))
    }

    fn reasons_as<C: Categorizer>(
        &self,
        discovered: &[String],
    ) -> SelectResult<Vec<(String, CategoryType)>> {
        let includes = Self::typed::<C>(&self.includes)?;
        let scopes = crate::scope::discrete_scopes(includes, discovered);
        let root = C::root();

        let mut reasons = Vec::new();

        for scope in &scopes {
            // A root-level scope covers every category of the service.
            let categories: Vec<CategoryType> = if scope.category() == root {
                CategoryType::all_for(self.service).to_vec()
            } else if let Some(category) = scope.leaf().data_category() {
                vec![category]
            } else {
                continue;
            };

            let Some(owners) = scope.get(root).literal_values() else {
                continue;
            };

            for owner in owners {
                for &cat in &categories {
                    reasons.push((owner.clone(), cat));
                }
            }
        }

        reasons.sort();
        reasons.dedup();

        Ok(reasons)
    }
}
