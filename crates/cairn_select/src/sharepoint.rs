//! SharePoint selector: site library files.

use std::collections::HashMap;

use cairn_details::{Catalog, ItemInfo};
use cairn_path::{CategoryType, Path, ServiceType};

use crate::pattern::{Comparator, Pattern};
use crate::scope::{discrete_scopes, standard_path_values, Categorizer, Scope};
use crate::selector::Selector;

/// Category keys of the SharePoint path and filter shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SharePointCategory {
    /// The site.
    Site,
    /// A document library (folder level).
    Library,
    /// A library file.
    LibraryItem,
    /// Filter: file created after.
    CreatedAfter,
    /// Filter: file created before.
    CreatedBefore,
    /// Filter: file modified after.
    ModifiedAfter,
    /// Filter: file modified before.
    ModifiedBefore,
}

impl Categorizer for SharePointCategory {
    fn root() -> Self {
        Self::Site
    }

    fn leaf(self) -> Self {
        match self {
            Self::Site => Self::Site,
            _ => Self::LibraryItem,
        }
    }

    fn path_keys(self) -> &'static [Self] {
        match self.leaf() {
            Self::LibraryItem => &[Self::Site, Self::Library, Self::LibraryItem],
            _ => &[Self::Site],
        }
    }

    fn group_defaults(self) -> &'static [Self] {
        match self {
            Self::Library => &[Self::LibraryItem],
            Self::Site => &[Self::Library, Self::LibraryItem],
            _ => &[],
        }
    }

    fn path_values(self, path: &Path) -> HashMap<Self, Vec<String>> {
        standard_path_values(Self::Site, Self::Library, Self::LibraryItem, path)
    }

    fn info_target(self, info: &ItemInfo) -> Option<String> {
        let ItemInfo::Library(file) = info else {
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
            ItemInfo::Library(_) => Some(Self::LibraryItem),
            _ => None,
        }
    }

    fn data_category(self) -> Option<CategoryType> {
        match self {
            Self::LibraryItem => Some(CategoryType::Libraries),
            _ => None,
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Self::Site => "site",
            Self::Library => "library",
            Self::LibraryItem => "library_item",
            Self::CreatedAfter => "file_created_after",
            Self::CreatedBefore => "file_created_before",
            Self::ModifiedAfter => "file_modified_after",
            Self::ModifiedBefore => "file_modified_before",
        }
    }

    fn parse(name: &str) -> Option<Self> {
        let cat = match name {
            "site" => Self::Site,
            "library" => Self::Library,
            "library_item" => Self::LibraryItem,
            "file_created_after" => Self::CreatedAfter,
            "file_created_before" => Self::CreatedBefore,
            "file_modified_after" => Self::ModifiedAfter,
            "file_modified_before" => Self::ModifiedBefore,
            _ => return None,
        };

        Some(cat)
    }
}

/// Selector over SharePoint data.
#[derive(Debug, Clone)]
pub struct SharePointSelector {
    sel: Selector,
}

impl Default for SharePointSelector {
    fn default() -> Self {
        Self::new()
    }
}

impl SharePointSelector {
    /// Creates an empty SharePoint selector.
    #[must_use]
    pub fn new() -> Self {
        Self {
            sel: Selector::new(ServiceType::SharePoint),
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
    pub fn include(&mut self, scopes: Vec<Scope<SharePointCategory>>) {
        self.sel.push_includes(scopes);
    }

    /// Appends scopes to the filter set.
    pub fn filter(&mut self, scopes: Vec<Scope<SharePointCategory>>) {
        self.sel.push_filters(scopes);
    }

    /// Appends scopes to the exclusion set.
    pub fn exclude(&mut self, scopes: Vec<Scope<SharePointCategory>>) {
        self.sel.push_excludes(scopes);
    }

    /// The include scopes with Any-site scopes expanded per site.
    pub fn discrete_includes(&self, sites: &[String]) -> Vec<Scope<SharePointCategory>> {
        let includes =
            Selector::typed::<SharePointCategory>(&self.sel.includes).unwrap_or_default();

        discrete_scopes(includes, sites)
    }

    /// Reduces a details catalog per the selector's scope sets.
    #[must_use]
    pub fn reduce(&self, catalog: &Catalog) -> Catalog {
        let includes =
            Selector::typed::<SharePointCategory>(&self.sel.includes).unwrap_or_default();
        let filters = Selector::typed::<SharePointCategory>(&self.sel.filters).unwrap_or_default();
        let excludes =
            Selector::typed::<SharePointCategory>(&self.sel.excludes).unwrap_or_default();

        crate::scope::reduce(catalog, &includes, &filters, &excludes)
    }

    /// All libraries of the given sites.
    #[must_use]
    pub fn sites(sites: &[&str]) -> Vec<Scope<SharePointCategory>> {
        vec![Scope::make(
            SharePointCategory::Library,
            vec![
                (SharePointCategory::Site, Pattern::literals(sites.iter().copied())),
                (SharePointCategory::Library, Pattern::Any),
            ],
        )]
    }

    /// Whole libraries by site and library prefix.
    #[must_use]
    pub fn libraries(sites: &[&str], libraries: &[&str]) -> Vec<Scope<SharePointCategory>> {
        vec![Scope::make(
            SharePointCategory::Library,
            vec![
                (SharePointCategory::Site, Pattern::literals(sites.iter().copied())),
                (
                    SharePointCategory::Library,
                    Pattern::prefixes(libraries.iter().copied()),
                ),
            ],
        )]
    }

    /// Library files by site, library, and item ID.
    #[must_use]
    pub fn library_items(
        sites: &[&str],
        libraries: &[&str],
        items: &[&str],
    ) -> Vec<Scope<SharePointCategory>> {
        vec![Scope::make(
            SharePointCategory::LibraryItem,
            vec![
                (SharePointCategory::Site, Pattern::literals(sites.iter().copied())),
                (
                    SharePointCategory::Library,
                    Pattern::prefixes(libraries.iter().copied()),
                ),
                (
                    SharePointCategory::LibraryItem,
                    Pattern::literals(items.iter().copied()),
                ),
            ],
        )]
    }

    /// Files created after the given canonical time.
    #[must_use]
    pub fn file_created_after(time: &str) -> Vec<Scope<SharePointCategory>> {
        vec![Scope::make_filter(
            SharePointCategory::LibraryItem,
            SharePointCategory::CreatedAfter,
            Pattern::compare(Comparator::After, time),
        )]
    }

    /// Files created before the given canonical time.
    #[must_use]
    pub fn file_created_before(time: &str) -> Vec<Scope<SharePointCategory>> {
        vec![Scope::make_filter(
            SharePointCategory::LibraryItem,
            SharePointCategory::CreatedBefore,
            Pattern::compare(Comparator::Before, time),
        )]
    }

    /// Files modified after the given canonical time.
    #[must_use]
    pub fn file_modified_after(time: &str) -> Vec<Scope<SharePointCategory>> {
        vec![Scope::make_filter(
            SharePointCategory::LibraryItem,
            SharePointCategory::ModifiedAfter,
            Pattern::compare(Comparator::After, time),
        )]
    }

    /// Files modified before the given canonical time.
    #[must_use]
    pub fn file_modified_before(time: &str) -> Vec<Scope<SharePointCategory>> {
        vec![Scope::make_filter(
            SharePointCategory::LibraryItem,
            SharePointCategory::ModifiedBefore,
            Pattern::compare(Comparator::Before, time),
        )]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cairn_details::FileInfo;

    #[test]
    fn library_include() {
        let catalog = Catalog::new();
        for (repo_ref, name) in [
            ("t/sharepoint/hq/libraries/docs/a.docx", "a.docx"),
            ("t/sharepoint/hq/libraries/media/b.png", "b.png"),
        ] {
            let path = Path::from_repo_ref(repo_ref, true).unwrap();
            catalog.add(
                path.to_string(),
                path.short_ref(),
                path.dir().unwrap().short_ref(),
                true,
                ItemInfo::Library(FileInfo {
                    name: name.to_string(),
                    ..FileInfo::default()
                }),
            );
        }

        let mut sel = SharePointSelector::new();
        sel.include(SharePointSelector::libraries(&["hq"], &["docs"]));

        assert_eq!(
            sel.reduce(&catalog).paths(),
            vec!["t/sharepoint/hq/libraries/docs/a.docx"]
        );
    }
}
