//! Builds selectors from command-line flags.

use cairn_path::ServiceType;
use cairn_select::{
    ExchangeSelector, OneDriveSelector, Selector, SharePointSelector,
};

/// Selector-shaping flags shared by `backup details` and `restore`.
#[derive(Debug, Clone, Default)]
pub struct SelectorFlags {
    /// Folder prefixes to include.
    pub folders: Vec<String>,
    /// Item IDs or short refs to include.
    pub files: Vec<String>,
    /// Keep only files created after this time.
    pub file_created_after: Option<String>,
    /// Keep only files created before this time.
    pub file_created_before: Option<String>,
    /// Keep only files modified after this time.
    pub file_modified_after: Option<String>,
    /// Keep only files modified before this time.
    pub file_modified_before: Option<String>,
}

impl SelectorFlags {
    fn has_time_filters(&self) -> bool {
        self.file_created_after.is_some()
            || self.file_created_before.is_some()
            || self.file_modified_after.is_some()
            || self.file_modified_before.is_some()
    }
}

fn as_refs(values: &[String]) -> Vec<&str> {
    values.iter().map(String::as_str).collect()
}

/// Builds the selector for `backup create`: everything the named owners
/// have, or everything discoverable when no owner is named.
#[must_use]
pub fn backup_selector(service: ServiceType, owners: &[String]) -> Selector {
    let owners: Vec<&str> = if owners.is_empty() {
        vec!["*"]
    } else {
        as_refs(owners)
    };

    match service {
        ServiceType::Exchange => {
            let mut sel = ExchangeSelector::new();
            sel.include(ExchangeSelector::users(&owners));
            sel.into_selector()
        }
        ServiceType::OneDrive => {
            let mut sel = OneDriveSelector::new();
            sel.include(OneDriveSelector::users(&owners));
            sel.into_selector()
        }
        ServiceType::SharePoint => {
            let mut sel = SharePointSelector::new();
            sel.include(SharePointSelector::sites(&owners));
            sel.into_selector()
        }
    }
}

/// Builds the selector narrowing `backup details` and `restore`.
pub fn scoped_selector(service: ServiceType, flags: &SelectorFlags) -> Result<Selector, String> {
    if service == ServiceType::Exchange && flags.has_time_filters() {
        return Err("file time filters are not supported for exchange".to_string());
    }

    let any = ["*"];
    let folders = if flags.folders.is_empty() {
        any.to_vec()
    } else {
        as_refs(&flags.folders)
    };
    let files = if flags.files.is_empty() {
        any.to_vec()
    } else {
        as_refs(&flags.files)
    };

    let selector = match service {
        ServiceType::Exchange => {
            let mut sel = ExchangeSelector::new();

            if flags.folders.is_empty() && flags.files.is_empty() {
                sel.include(ExchangeSelector::users(&any));
            } else if flags.files.is_empty() {
                sel.include(ExchangeSelector::mail_folders(&any, &folders));
            } else {
                sel.include(ExchangeSelector::mails(&any, &folders, &files));
            }

            sel.into_selector()
        }

        ServiceType::OneDrive => {
            let mut sel = OneDriveSelector::new();

            if flags.folders.is_empty() && flags.files.is_empty() {
                sel.include(OneDriveSelector::users(&any));
            } else if flags.files.is_empty() {
                sel.include(OneDriveSelector::folders(&any, &folders));
            } else {
                sel.include(OneDriveSelector::items(&any, &folders, &files));
            }

            if let Some(t) = &flags.file_created_after {
                sel.filter(OneDriveSelector::file_created_after(t));
            }
            if let Some(t) = &flags.file_created_before {
                sel.filter(OneDriveSelector::file_created_before(t));
            }
            if let Some(t) = &flags.file_modified_after {
                sel.filter(OneDriveSelector::file_modified_after(t));
            }
            if let Some(t) = &flags.file_modified_before {
                sel.filter(OneDriveSelector::file_modified_before(t));
            }

            sel.into_selector()
        }

        ServiceType::SharePoint => {
            let mut sel = SharePointSelector::new();

            if flags.folders.is_empty() && flags.files.is_empty() {
                sel.include(SharePointSelector::sites(&any));
            } else if flags.files.is_empty() {
                sel.include(SharePointSelector::libraries(&any, &folders));
            } else {
                sel.include(SharePointSelector::library_items(&any, &folders, &files));
            }

            if let Some(t) = &flags.file_created_after {
                sel.filter(SharePointSelector::file_created_after(t));
            }
            if let Some(t) = &flags.file_created_before {
                sel.filter(SharePointSelector::file_created_before(t));
            }
            if let Some(t) = &flags.file_modified_after {
                sel.filter(SharePointSelector::file_modified_after(t));
            }
            if let Some(t) = &flags.file_modified_before {
                sel.filter(SharePointSelector::file_modified_before(t));
            }

            sel.into_selector()
        }
    };

    Ok(selector)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backup_selector_defaults_to_wildcard_owner() {
        let sel = backup_selector(ServiceType::Exchange, &[]);
        let (owners, wildcard) = sel.owners().unwrap();
        assert!(owners.is_empty());
        assert!(wildcard);
    }

    #[test]
    fn exchange_rejects_file_time_filters() {
        let flags = SelectorFlags {
            file_created_after: Some("2024-01-01T00:00:00Z".to_string()),
            ..SelectorFlags::default()
        };

        assert!(scoped_selector(ServiceType::Exchange, &flags).is_err());
        assert!(scoped_selector(ServiceType::OneDrive, &flags).is_ok());
    }
}
