//! Cairn CLI
//!
//! Command-line surface for M365 backup and restore:
//!
//! - `repo init | connect` - repository lifecycle
//! - `backup create | list | details | delete` - backup management
//! - `restore` - restore items out of a backup
//!
//! Exit code is 0 when an operation completes (with or without data) and 1
//! on any user-visible error.

mod commands;
mod config;
mod fixture;
mod selectors;

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use cairn_path::ServiceType;

use crate::config::CliConfig;
use crate::selectors::SelectorFlags;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Service {
    Exchange,
    Onedrive,
    Sharepoint,
}

impl From<Service> for ServiceType {
    fn from(value: Service) -> Self {
        match value {
            Service::Exchange => ServiceType::Exchange,
            Service::Onedrive => ServiceType::OneDrive,
            Service::Sharepoint => ServiceType::SharePoint,
        }
    }
}

/// Selector flags shared by `backup details` and `restore`.
#[derive(Debug, clap::Args)]
struct ScopeArgs {
    /// Folder prefix to select; repeatable
    #[arg(long = "folder")]
    folders: Vec<String>,

    /// Item ID or short ref to select; repeatable
    #[arg(long = "file")]
    files: Vec<String>,

    /// Keep only files created after this RFC 3339 time
    #[arg(long)]
    file_created_after: Option<String>,

    /// Keep only files created before this RFC 3339 time
    #[arg(long)]
    file_created_before: Option<String>,

    /// Keep only files modified after this RFC 3339 time
    #[arg(long)]
    file_modified_after: Option<String>,

    /// Keep only files modified before this RFC 3339 time
    #[arg(long)]
    file_modified_before: Option<String>,
}

impl From<ScopeArgs> for SelectorFlags {
    fn from(args: ScopeArgs) -> Self {
        Self {
            folders: args.folders,
            files: args.files,
            file_created_after: args.file_created_after,
            file_created_before: args.file_created_before,
            file_modified_after: args.file_modified_after,
            file_modified_before: args.file_modified_before,
        }
    }
}

/// Cairn: incremental backup for M365 data.
#[derive(Parser)]
#[command(name = "cairn")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Repository lifecycle
    Repo {
        #[command(subcommand)]
        command: RepoCommands,
    },

    /// Backup management
    Backup {
        #[command(subcommand)]
        command: BackupCommands,
    },

    /// Restore items out of a backup
    Restore {
        /// The service to restore
        service: Service,

        /// The backup to restore from
        #[arg(long)]
        backup: String,

        /// Directory to restore into
        #[arg(long, default_value = "./cairn-restore")]
        into: PathBuf,

        #[command(flatten)]
        scope: ScopeArgs,
    },

    /// Show version information
    Version,
}

#[derive(Subcommand)]
enum RepoCommands {
    /// Initialize a new repository
    Init,
    /// Connect to an existing repository
    Connect,
}

#[derive(Subcommand)]
enum BackupCommands {
    /// Run a backup of the given service
    Create {
        /// The service to back up
        service: Service,

        /// User to back up; repeatable, defaults to all
        #[arg(long = "user")]
        users: Vec<String>,

        /// Site to back up; repeatable (sharepoint)
        #[arg(long = "site")]
        sites: Vec<String>,

        /// Run a full backup, ignoring prior snapshots
        #[arg(long)]
        disable_incrementals: bool,

        /// Dataset file the collectors read from
        #[arg(long)]
        data: PathBuf,
    },

    /// List backups
    List {
        /// The service to list
        service: Service,

        /// A single backup ID to show
        #[arg(long)]
        backup: Option<String>,
    },

    /// List the item paths inside a backup
    Details {
        /// The service the backup covers
        service: Service,

        /// The backup to inspect
        #[arg(long)]
        backup: String,

        #[command(flatten)]
        scope: ScopeArgs,
    },

    /// Delete a backup
    Delete {
        /// The service the backup covers
        service: Service,

        /// The backup to delete
        #[arg(long)]
        backup: String,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cfg = CliConfig::from_env()?;

    match cli.command {
        Commands::Repo { command } => match command {
            RepoCommands::Init => commands::repo::init(&cfg)?,
            RepoCommands::Connect => commands::repo::connect(&cfg)?,
        },

        Commands::Backup { command } => match command {
            BackupCommands::Create {
                service,
                users,
                sites,
                disable_incrementals,
                data,
            } => {
                let owners: Vec<String> = users.into_iter().chain(sites).collect();
                commands::backup::create(
                    &cfg,
                    service.into(),
                    &owners,
                    disable_incrementals,
                    &data,
                )?;
            }
            BackupCommands::List { service, backup } => {
                commands::backup::list(&cfg, service.into(), backup.as_deref())?;
            }
            BackupCommands::Details {
                service,
                backup,
                scope,
            } => {
                commands::backup::details(&cfg, service.into(), &backup, &scope.into())?;
            }
            BackupCommands::Delete { service: _, backup } => {
                commands::backup::delete(&cfg, &backup)?;
            }
        },

        Commands::Restore {
            service,
            backup,
            into,
            scope,
        } => {
            commands::restore::run(&cfg, service.into(), &backup, &scope.into(), into)?;
        }

        Commands::Version => {
            println!("Cairn CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("Cairn Core v{}", cairn_core::VERSION);
        }
    }

    Ok(())
}
