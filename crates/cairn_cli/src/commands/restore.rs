//! `restore`.

use std::error::Error;
use std::path::PathBuf;

use cairn_core::model::StableId;
use cairn_path::ServiceType;
use cairn_store::CancelToken;

use crate::config::CliConfig;
use crate::fixture::FixtureConnector;
use crate::selectors::{self, SelectorFlags};

/// Restores a backup's selected items into a local directory.
pub fn run(
    cfg: &CliConfig,
    service: ServiceType,
    backup: &str,
    flags: &SelectorFlags,
    into: PathBuf,
) -> Result<(), Box<dyn Error>> {
    let repo = super::open_repository(cfg)?;
    let connector = FixtureConnector::restoring_into(service, &cfg.tenant, into);

    let selector = selectors::scoped_selector(service, flags)?;

    let mut op = repo.new_restore(StableId::new(backup), selector)?;
    op.run(&CancelToken::new(), &connector)?;

    println!("Restore {}", op.status);
    println!(
        "  items read: {}  items written: {}  bytes read: {}",
        op.results.items_read, op.results.items_written, op.results.bytes_read,
    );

    for (path, message) in &op.results.write_errors {
        eprintln!("  error: {path}: {message}");
    }

    Ok(())
}
