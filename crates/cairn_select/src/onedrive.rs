//! OneDrive selector: drive files.

use std::collections::HashMap;

use cairn_details::{Catalog, ItemInfo};
use cairn_path::{CategoryType, Path, ServiceType};

use crate::pattern::{Comparator, Pattern};
use crate::scope::{discrete_scopes, standard_path_values, Categorizer, Scope};
use crate::selector::Selector;

/// Category keys of the OneDrive path and filter shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OneDriveCategory {
    /// The drive owner.
    User,
    /// A drive folder.
    Folder,
    /// A drive file.
    Item,
    /// Filter: file created after.
    CreatedAfter,
    /// Filter: file created before.
    CreatedBefore,
    /// Filter: file modified after.
    ModifiedAfter,
    /// Filter: file modified before.
    ModifiedBefore,
}

impl Categorizer for OneDriveCategory {
    fn root() -> Self {
        Self::User
    }

    fn leaf(self) -> Self {
        match self {
            Self::User => Self::User,
            _ => Self::Item,
        }
    }

    fn path_keys(self) -> &'static [Self] {
        match self.leaf() {
            Self::Item => &[Self::User, Self::Folder, Self::Item],
            _ => &[Self::User],
        }
    }

    fn group_defaults(self) -> &'static [Self] {
        match self {
            Self::Folder => &[Self::Item],
            Self::User => &[Self::Folder, Self::Item],
            _ => &[],
        }
    }

    fn path_values(self, path: &Path) -> HashMap<Self, Vec<String>> {
        standard_path_values(Self::User, Self::Folder, Self::Item, path)
    }

    fn info_target(self, info: &ItemInfo) -> Option<String> {
        let ItemInfo::Drive(file) = info else {
            return None;
        };

        match self {
            Self::CreatedAfter | Self::CreatedBefore => file.created.map(|t| t.to_rfc3339()),
            Self::ModifiedAfter | Self::ModifiedBefore => file.modified.map(|t| t.to_rfc3339()),
            _ => None,
        }
    }

    fn entry_leaf(info: &ItemInfo) -> Option<Self> {
        match info {
            ItemInfo::Drive(_) => Some(Self::Item),
            _ => None,
        }
    }

    fn data_category(self) -> Option<CategoryType> {
        match self {
            Self::Item => Some(CategoryType::Files),
            _ => None,
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Folder => "folder",
            Self::Item => "item",
            Self::CreatedAfter => "file_created_after",
            Self::CreatedBefore => "file_created_before",
            Self::ModifiedAfter => "file_modified_after",
            Self::ModifiedBefore => "file_modified_before",
        }
    }

    fn parse(name: &str) -> Option<Self> {
        let cat = match name {
            "user" => Self::User,
            "folder" => Self::Folder,
            "item" => Self::Item,
            "file_created_after" => Self::CreatedAfter,
            "file_created_before" => Self::CreatedBefore,
            "file_modified_after" => Self::ModifiedAfter,
            "file_modified_before" => Self::ModifiedBefore,
            _ => return None,
        };

        Some(cat)
    }
}

/// Selector over OneDrive data.
#[derive(Debug, Clone)]
pub struct OneDriveSelector {
    sel: Selector,
}

impl Default for OneDriveSelector {
    fn default() -> Self {
        Self::new()
    }
}

impl OneDriveSelector {
    /// Creates an empty OneDrive selector.
    #[must_use]
    pub fn new() -> Self {
        Self {
            sel: Selector::new(ServiceType::OneDrive),
        }
    }

    pub(crate) fn wrap(sel: Selector) -> Self {
        Self { sel }
    }

    /// Borrows the untyped selector.
    #[must_use]
    pub fn as_selector(&self) -> &Selector {
        &self.sel
    }

    /// Unwraps into the untyped selector.
    #[must_use]
    pub fn into_selector(self) -> Selector {
        self.sel
    }

    /// Appends scopes to the inclusion set.
    pub fn include(&mut self, scopes: Vec<Scope<OneDriveCategory>>) {
        self.sel.push_includes(scopes);
    }

    /// Appends scopes to the filter set.
    pub fn filter(&mut self, scopes: Vec<Scope<OneDriveCategory>>) {
        self.sel.push_filters(scopes);
    }

    /// Appends scopes to the exclusion set.
    pub fn exclude(&mut self, scopes: Vec<Scope<OneDriveCategory>>) {
        self.sel.push_excludes(scopes);
    }

    /// The include scopes with Any-owner scopes expanded per owner.
    pub fn discrete_includes(&self, owners: &[String]) -> Vec<Scope<OneDriveCategory>> {
        let includes =
            Selector::typed::<OneDriveCategory>(&self.sel.includes).unwrap_or_default();

        discrete_scopes(includes, owners)
    }

    /// Reduces a details catalog per the selector's scope sets.
    #[must_use]
    pub fn reduce(&self, catalog: &Catalog) -> Catalog {
        let includes = Selector::typed::<OneDriveCategory>(&self.sel.includes).unwrap_or_default();
        let filters = Selector::typed::<OneDriveCategory>(&self.sel.filters).unwrap_or_default();
        let excludes = Selector::typed::<OneDriveCategory>(&self.sel.excludes).unwrap_or_default();

        crate::scope::reduce(catalog, &includes, &filters, &excludes)
    }

    /// All files of the given users.
    #[must_use]
    pub fn users(users: &[&str]) -> Vec<Scope<OneDriveCategory>> {
        vec![Scope::make(
            OneDriveCategory::Folder,
            vec![
                (OneDriveCategory::User, Pattern::literals(users.iter().copied())),
                (OneDriveCategory::Folder, Pattern::Any),
            ],
        )]
    }

    /// Whole folders by user and folder prefix.
    #[must_use]
    pub fn folders(users: &[&str], folders: &[&str]) -> Vec<Scope<OneDriveCategory>> {
        vec![Scope::make(
            OneDriveCategory::Folder,
            vec![
                (OneDriveCategory::User, Pattern::literals(users.iter().copied())),
                (
                    OneDriveCategory::Folder,
                    Pattern::prefixes(folders.iter().copied()),
                ),
            ],
        )]
    }

    /// Files by user, folder, and item ID.
    #[must_use]
    pub fn items(users: &[&str], folders: &[&str], items: &[&str]) -> Vec<Scope<OneDriveCategory>> {
        vec![Scope::make(
            OneDriveCategory::Item,
            vec![
                (OneDriveCategory::User, Pattern::literals(users.iter().copied())),
                (
                    OneDriveCategory::Folder,
                    Pattern::prefixes(folders.iter().copied()),
                ),
                (OneDriveCategory::Item, Pattern::literals(items.iter().copied())),
            ],
        )]
    }

    /// Files created after the given canonical time.
    #[must_use]
    pub fn file_created_after(time: &str) -> Vec<Scope<OneDriveCategory>> {
        vec![Scope::make_filter(
            OneDriveCategory::Item,
            OneDriveCategory::CreatedAfter,
            Pattern::compare(Comparator::After, time),
        )]
    }

    /// Files created before the given canonical time.
    #[must_use]
    pub fn file_created_before(time: &str) -> Vec<Scope<OneDriveCategory>> {
        vec![Scope::make_filter(
            OneDriveCategory::Item,
            OneDriveCategory::CreatedBefore,
            Pattern::compare(Comparator::Before, time),
        )]
    }

    /// Files modified after the given canonical time.
    #[must_use]
    pub fn file_modified_after(time: &str) -> Vec<Scope<OneDriveCategory>> {
        vec![Scope::make_filter(
            OneDriveCategory::Item,
            OneDriveCategory::ModifiedAfter,
            Pattern::compare(Comparator::After, time),
        )]
    }

    /// Files modified before the given canonical time.
    #[must_use]
    pub fn file_modified_before(time: &str) -> Vec<Scope<OneDriveCategory>> {
        vec![Scope::make_filter(
            OneDriveCategory::Item,
            OneDriveCategory::ModifiedBefore,
            Pattern::compare(Comparator::Before, time),
        )]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cairn_details::FileInfo;
    use chrono::{TimeZone, Utc};

    fn drive_entry(catalog: &Catalog, repo_ref: &str, modified_year: i32) {
        let path = Path::from_repo_ref(repo_ref, true).unwrap();
        let info = ItemInfo::Drive(FileInfo {
            name: path.item().unwrap().to_string(),
            size: 10,
            created: Some(Utc.with_ymd_and_hms(modified_year - 1, 1, 1, 0, 0, 0).unwrap()),
            modified: Some(Utc.with_ymd_and_hms(modified_year, 1, 1, 0, 0, 0).unwrap()),
        });

        catalog.add(
            path.to_string(),
            path.short_ref(),
            path.dir().unwrap().short_ref(),
            true,
            info,
        );
    }

    #[test]
    fn modified_before_filter() {
        let catalog = Catalog::new();
        drive_entry(&catalog, "t/onedrive/bob/files/docs/old.txt", 2020);
        drive_entry(&catalog, "t/onedrive/bob/files/docs/new.txt", 2023);

        let mut sel = OneDriveSelector::new();
        sel.include(OneDriveSelector::users(&["bob"]));
        sel.filter(OneDriveSelector::file_modified_before("2021-01-01T00:00:00Z"));

        assert_eq!(
            sel.reduce(&catalog).paths(),
            vec!["t/onedrive/bob/files/docs/old.txt"]
        );
    }

    #[test]
    fn item_include_by_name() {
        let catalog = Catalog::new();
        drive_entry(&catalog, "t/onedrive/bob/files/docs/a.txt", 2022);
        drive_entry(&catalog, "t/onedrive/bob/files/docs/b.txt", 2022);

        let mut sel = OneDriveSelector::new();
        sel.include(OneDriveSelector::items(&["bob"], &["*"], &["a.txt"]));

        assert_eq!(
            sel.reduce(&catalog).paths(),
            vec!["t/onedrive/bob/files/docs/a.txt"]
        );
    }
}
