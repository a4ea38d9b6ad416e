//! `backup create | list | details | delete`.

use std::error::Error;
use std::path::Path as FsPath;

use cairn_core::model::StableId;
use cairn_core::ops::BackupOptions;
use cairn_path::ServiceType;
use cairn_store::CancelToken;

use crate::config::CliConfig;
use crate::fixture::FixtureConnector;
use crate::selectors::{self, SelectorFlags};

/// Runs one backup against the dataset file.
pub fn create(
    cfg: &CliConfig,
    service: ServiceType,
    owners: &[String],
    disable_incrementals: bool,
    data: &FsPath,
) -> Result<(), Box<dyn Error>> {
    let repo = super::open_repository(cfg)?;
    let connector = FixtureConnector::load(service, &cfg.tenant, data)?;

    let selector = selectors::backup_selector(service, owners);

    let mut op = repo.new_backup(selector, BackupOptions {
        disable_incrementals,
    })?;

    let id = op.run(&CancelToken::new(), &connector)?;

    println!("Backup {id} {}", op.status);
    println!(
        "  items written: {}  hashed: {} B  uploaded: {} B",
        op.results.stats.items_written,
        op.results.stats.hashed_bytes,
        op.results.stats.uploaded_bytes,
    );

    for (path, message) in &op.results.write_errors {
        eprintln!("  error: {path}: {message}");
    }

    Ok(())
}

/// Lists backups, or one backup when an ID is given.
pub fn list(
    cfg: &CliConfig,
    service: ServiceType,
    backup: Option<&str>,
) -> Result<(), Box<dyn Error>> {
    let repo = super::open_repository(cfg)?;

    let backups = match backup {
        Some(id) => vec![repo.backup(&StableId::new(id))?],
        None => repo.backups_by_tag(&Default::default())?,
    };

    for b in backups {
        if b.selector.service != service {
            continue;
        }

        let id = b
            .base
            .stable_id
            .as_ref()
            .map(ToString::to_string)
            .unwrap_or_default();

        println!(
            "{id}  {}  {}  items {}  errors {}",
            b.created_at.to_rfc3339(),
            b.selector.service,
            b.stats.items_written,
            b.stats.error_count,
        );
    }

    Ok(())
}

/// Prints the item paths of a backup, narrowed by the selector flags.
pub fn details(
    cfg: &CliConfig,
    service: ServiceType,
    backup: &str,
    flags: &SelectorFlags,
) -> Result<(), Box<dyn Error>> {
    let repo = super::open_repository(cfg)?;
    let (catalog, _) = repo.backup_details(&StableId::new(backup))?;

    let selector = selectors::scoped_selector(service, flags)?;
    let reduced = selector.reduce(&catalog)?;

    for path in reduced.paths() {
        println!("{path}");
    }

    Ok(())
}

/// Deletes a backup, its details blob, and its snapshot.
pub fn delete(cfg: &CliConfig, backup: &str) -> Result<(), Box<dyn Error>> {
    let repo = super::open_repository(cfg)?;
    repo.delete_backup(&StableId::new(backup))?;

    println!("Deleted backup {backup}");
    Ok(())
}
