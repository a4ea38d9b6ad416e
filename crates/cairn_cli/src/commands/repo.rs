//! `repo init` and `repo connect`.

use std::error::Error;
use std::sync::Arc;

use cairn_core::{events::Bus, Repository};
use cairn_store::{DirEngine, DirManifests};

use crate::config::CliConfig;

/// Initializes a new repository at the configured location.
pub fn init(cfg: &CliConfig) -> Result<(), Box<dyn Error>> {
    let engine = Arc::new(DirEngine::open(&cfg.repo_path)?);
    let manifests = Arc::new(DirManifests::open(&cfg.repo_path)?);

    let repo = Repository::initialize(&cfg.tenant, engine, manifests, Bus::new())?;

    println!("Initialized repository {}", repo.id());
    println!("Provider: {}", cfg.provider_summary());

    Ok(())
}

/// Connects to an existing repository and prints its identity.
pub fn connect(cfg: &CliConfig) -> Result<(), Box<dyn Error>> {
    let repo = super::open_repository(cfg)?;

    println!("Connected to repository {}", repo.id());
    println!("Created: {}", repo.created_at().to_rfc3339());

    Ok(())
}
