//! A JSON-dataset connector standing in for the live M365 collectors.
//!
//! The real collectors talk to the Graph API and live outside this
//! workspace. For development and end-to-end runs the CLI can back up a
//! dataset file and restore into a local directory through this connector.

use std::fs;
use std::io::{Cursor, Read};
use std::path::{Path as FsPath, PathBuf};

use serde::Deserialize;

use cairn_core::{ConsumeStatus, EngineError, EngineResult, RestoredCollection, ServiceConnector};
use cairn_data::{Collection, CollectionState, ItemStream};
use cairn_details::{ContactInfo, EventInfo, FileInfo, ItemInfo, MailInfo};
use cairn_path::{CategoryType, Path, ServiceType};
use cairn_select::Selector;
use cairn_store::CancelToken;

#[derive(Debug, Deserialize)]
struct FixtureItem {
    id: String,
    #[serde(default)]
    body: String,
    #[serde(default)]
    sender: String,
    #[serde(default)]
    subject: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    organizer: String,
    #[serde(default)]
    recurs: bool,
}

#[derive(Debug, Deserialize)]
struct FixtureFolder {
    category: String,
    path: String,
    #[serde(default)]
    items: Vec<FixtureItem>,
}

#[derive(Debug, Deserialize)]
struct FixtureOwner {
    id: String,
    #[serde(default)]
    folders: Vec<FixtureFolder>,
}

#[derive(Debug, Deserialize)]
struct Fixture {
    #[serde(default)]
    owners: Vec<FixtureOwner>,
}

struct FixtureStream {
    id: String,
    body: Vec<u8>,
    info: ItemInfo,
}

impl ItemStream for FixtureStream {
    fn id(&self) -> &str {
        &self.id
    }

    fn into_reader(self: Box<Self>) -> Box<dyn std::io::Read + Send> {
        Box::new(Cursor::new(self.body))
    }

    fn deleted(&self) -> bool {
        false
    }

    fn info(&self) -> Option<ItemInfo> {
        Some(self.info.clone())
    }

    fn size(&self) -> Option<u64> {
        Some(self.body.len() as u64)
    }
}

struct FixtureCollection {
    path: Path,
    streams: parking_lot::Mutex<Vec<FixtureStream>>,
}

impl Collection for FixtureCollection {
    fn full_path(&self) -> Option<&Path> {
        Some(&self.path)
    }

    fn previous_path(&self) -> Option<&Path> {
        None
    }

    fn state(&self) -> CollectionState {
        CollectionState::NotMoved
    }

    fn items(&self) -> Box<dyn Iterator<Item = Box<dyn ItemStream>> + Send + '_> {
        let drained: Vec<FixtureStream> = std::mem::take(&mut *self.streams.lock());

        Box::new(
            drained
                .into_iter()
                .map(|s| Box::new(s) as Box<dyn ItemStream>),
        )
    }
}

fn item_info(category: CategoryType, item: &FixtureItem) -> ItemInfo {
    match category {
        CategoryType::Mail => ItemInfo::Mail(MailInfo {
            sender: item.sender.clone(),
            subject: item.subject.clone(),
            received: None,
        }),
        CategoryType::Contacts => ItemInfo::Contact(ContactInfo {
            name: item.name.clone(),
        }),
        CategoryType::Events => ItemInfo::Event(EventInfo {
            organizer: item.organizer.clone(),
            subject: item.subject.clone(),
            start: None,
            recurs: item.recurs,
        }),
        CategoryType::Files => ItemInfo::Drive(FileInfo {
            name: item.name.clone(),
            size: item.body.len() as u64,
            created: None,
            modified: None,
        }),
        CategoryType::Libraries => ItemInfo::Library(FileInfo {
            name: item.name.clone(),
            size: item.body.len() as u64,
            created: None,
            modified: None,
        }),
    }
}

/// Connector producing collections from a JSON dataset and restoring into a
/// local directory.
pub struct FixtureConnector {
    service: ServiceType,
    tenant: String,
    fixture: Fixture,
    restore_dir: Option<PathBuf>,
}

impl FixtureConnector {
    /// Loads a dataset for backup runs.
    pub fn load(
        service: ServiceType,
        tenant: impl Into<String>,
        data: &FsPath,
    ) -> Result<Self, String> {
        let raw = fs::read(data).map_err(|e| format!("reading {}: {e}", data.display()))?;

        let fixture: Fixture =
            serde_json::from_slice(&raw).map_err(|e| format!("parsing {}: {e}", data.display()))?;

        Ok(Self {
            service,
            tenant: tenant.into(),
            fixture,
            restore_dir: None,
        })
    }

    /// Creates a connector that only restores, into the given directory.
    #[must_use]
    pub fn restoring_into(
        service: ServiceType,
        tenant: impl Into<String>,
        restore_dir: PathBuf,
    ) -> Self {
        Self {
            service,
            tenant: tenant.into(),
            fixture: Fixture { owners: Vec::new() },
            restore_dir: Some(restore_dir),
        }
    }
}

impl ServiceConnector for FixtureConnector {
    fn service(&self) -> ServiceType {
        self.service
    }

    fn owners(&self) -> EngineResult<Vec<String>> {
        Ok(self.fixture.owners.iter().map(|o| o.id.clone()).collect())
    }

    fn produce(
        &self,
        _ctx: &CancelToken,
        selector: &Selector,
        _metadata: Vec<RestoredCollection>,
    ) -> EngineResult<Vec<Box<dyn Collection>>> {
        let (named, wildcard) = selector.owners()?;

        let mut collections: Vec<Box<dyn Collection>> = Vec::new();

        for owner in &self.fixture.owners {
            if !wildcard && !named.contains(&owner.id) {
                continue;
            }

            for folder in &owner.folders {
                let Ok(category) = CategoryType::parse(&folder.category, self.service) else {
                    tracing::warn!(
                        category = %folder.category,
                        "skipping fixture folder: category not valid for service"
                    );
                    continue;
                };

                let folders: Vec<String> = folder
                    .path
                    .split('/')
                    .filter(|f| !f.is_empty())
                    .map(str::to_string)
                    .collect();

                let path = Path::new(
                    &self.tenant,
                    self.service,
                    owner.id.clone(),
                    category,
                    folders,
                    None,
                )?;

                let streams = folder
                    .items
                    .iter()
                    .map(|item| FixtureStream {
                        id: item.id.clone(),
                        body: item.body.clone().into_bytes(),
                        info: item_info(category, item),
                    })
                    .collect();

                collections.push(Box::new(FixtureCollection {
                    path,
                    streams: parking_lot::Mutex::new(streams),
                }));
            }
        }

        Ok(collections)
    }

    fn consume(
        &self,
        _ctx: &CancelToken,
        _selector: &Selector,
        collections: Vec<RestoredCollection>,
    ) -> EngineResult<ConsumeStatus> {
        let Some(restore_dir) = &self.restore_dir else {
            return Err(EngineError::fatal(
                "fixture connector has no restore directory configured",
            ));
        };

        let mut status = ConsumeStatus::default();

        for collection in collections {
            let path = collection.path();

            let mut dir = restore_dir.join(path.owner()).join(path.category().as_str());
            for folder in path.folders() {
                dir = dir.join(folder);
            }

            if let Err(e) = fs::create_dir_all(&dir) {
                status
                    .errors
                    .push((path.to_string(), format!("creating {}: {e}", dir.display())));
                continue;
            }

            for item in collection.items() {
                let id = item.id().to_string();
                let target = dir.join(&id);

                let mut body = Vec::new();
                let result = item
                    .into_reader()
                    .read_to_end(&mut body)
                    .map_err(|e| e.to_string())
                    .and_then(|_| fs::write(&target, &body).map_err(|e| e.to_string()));

                match result {
                    Ok(()) => status.items_written += 1,
                    Err(message) => {
                        status.errors.push((format!("{path}/{id}"), message));
                    }
                }
            }
        }

        Ok(status)
    }
}
