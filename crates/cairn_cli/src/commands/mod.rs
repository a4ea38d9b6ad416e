//! Command implementations.

pub mod backup;
pub mod repo;
pub mod restore;

use std::error::Error;
use std::sync::Arc;

use cairn_core::{events::Bus, Repository};
use cairn_store::{DirEngine, DirManifests};

use crate::config::CliConfig;

/// Opens the configured repository.
pub fn open_repository(cfg: &CliConfig) -> Result<Repository, Box<dyn Error>> {
    let engine = Arc::new(DirEngine::open(&cfg.repo_path)?);
    let manifests = Arc::new(DirManifests::open(&cfg.repo_path)?);

    Ok(Repository::connect(
        &cfg.tenant,
        engine,
        manifests,
        Bus::new(),
    )?)
}
