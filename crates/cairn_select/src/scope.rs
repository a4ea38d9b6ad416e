//! Generic scope machinery shared by the service selectors.

use std::collections::{BTreeMap, HashMap};
use std::hash::Hash;

use serde::{Deserialize, Serialize};

use cairn_details::{Catalog, Entry, ItemInfo};
use cairn_path::{CategoryType, Path};

use crate::error::{SelectError, SelectResult};
use crate::pattern::Pattern;

/// A category key within one service's path shape.
///
/// Implemented by each service's category enum. Data categories map onto path
/// positions (owner, folder, item); filter categories map onto typed info
/// fields (mail sender, file modified time, ...).
pub trait Categorizer:
    Copy + Eq + Hash + std::fmt::Debug + Send + Sync + 'static
{
    /// The owner-level root category.
    fn root() -> Self;

    /// The leaf data category this category rolls up to.
    ///
    /// Folder and filter categories roll up to their item category; the root
    /// rolls up to itself.
    fn leaf(self) -> Self;

    /// Ordered path keys of a leaf category: root, folder, item.
    fn path_keys(self) -> &'static [Self];

    /// Child categories implicitly wildcarded by a group-level scope.
    fn group_defaults(self) -> &'static [Self];

    /// Candidate match targets per path key, extracted from an item path.
    fn path_values(self, path: &Path) -> HashMap<Self, Vec<String>>;

    /// The comparison target a filter category pulls out of typed info.
    fn info_target(self, info: &ItemInfo) -> Option<String>;

    /// The leaf category of a catalog entry, if this service covers it.
    fn entry_leaf(info: &ItemInfo) -> Option<Self>;

    /// The storage category a leaf data category corresponds to.
    fn data_category(self) -> Option<CategoryType>;

    /// Stable name for serialization.
    fn as_str(self) -> &'static str;

    /// Parses a stable name back into a category.
    fn parse(name: &str) -> Option<Self>;
}

/// One scope: a mapping from category keys to match patterns.
///
/// Data scopes carry patterns for each path key of their category; group
/// scopes wildcard their child categories. Filter scopes carry a single
/// pattern under their filter category and match against typed info instead
/// of path values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scope<C: Categorizer> {
    cat: C,
    filter_cat: Option<C>,
    values: HashMap<C, Pattern>,
}

impl<C: Categorizer> Scope<C> {
    /// Builds a data scope of the given category.
    ///
    /// Group-level child categories not named in `values` default to `Any`.
    #[must_use]
    pub fn make(cat: C, values: Vec<(C, Pattern)>) -> Self {
        let mut map: HashMap<C, Pattern> = values.into_iter().collect();

        for &child in cat.group_defaults() {
            map.entry(child).or_insert(Pattern::Any);
        }

        Self {
            cat,
            filter_cat: None,
            values: map,
        }
    }

    /// Builds a filter scope for the given leaf category.
    #[must_use]
    pub fn make_filter(leaf: C, filter_cat: C, pattern: Pattern) -> Self {
        let mut values = HashMap::new();
        values.insert(filter_cat, pattern);

        Self {
            cat: leaf,
            filter_cat: Some(filter_cat),
            values,
        }
    }

    /// The scope's data category.
    #[must_use]
    pub fn category(&self) -> C {
        self.cat
    }

    /// The filter category, if this is a filter scope.
    #[must_use]
    pub fn filter_category(&self) -> Option<C> {
        self.filter_cat
    }

    /// The leaf data category this scope applies to.
    #[must_use]
    pub fn leaf(&self) -> C {
        self.cat.leaf()
    }

    /// The pattern for a category; absent categories match nothing.
    #[must_use]
    pub fn get(&self, cat: C) -> &Pattern {
        self.values.get(&cat).unwrap_or(&Pattern::None)
    }

    /// Replaces the pattern for a category.
    #[must_use]
    pub fn set(mut self, cat: C, pattern: Pattern) -> Self {
        self.values.insert(cat, pattern);
        self
    }

    /// Whether the pattern for a category is the `Any` wildcard.
    #[must_use]
    pub fn is_any(&self, cat: C) -> bool {
        self.get(cat).is_any()
    }

    /// Whether the entry's path values satisfy every path key of `leaf`.
    #[must_use]
    pub fn matches_path_values(&self, leaf: C, values: &HashMap<C, Vec<String>>) -> bool {
        if self.filter_cat.is_some() || self.leaf() != leaf {
            return false;
        }

        leaf.path_keys().iter().all(|&key| {
            let targets = values
                .get(&key)
                .map(|v| v.iter().map(String::as_str).collect::<Vec<_>>())
                .unwrap_or_default();

            self.get(key).matches_any(targets)
        })
    }

    /// Whether the entry's typed info satisfies this filter scope.
    #[must_use]
    pub fn matches_info(&self, info: &ItemInfo) -> bool {
        let Some(fc) = self.filter_cat else {
            return false;
        };

        let Some(target) = fc.info_target(info) else {
            return false;
        };

        self.get(fc).matches(&target)
    }

    /// Whether the entry matches this scope by path or by info.
    #[must_use]
    pub fn matches_entry(&self, leaf: C, values: &HashMap<C, Vec<String>>, info: &ItemInfo) -> bool {
        self.matches_path_values(leaf, values) || self.matches_info(info)
    }
}

/// Serialized form of a scope, stored inside backup models.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawScope {
    /// Stable name of the data category.
    pub cat: String,
    /// Stable name of the filter category, for filter scopes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter_cat: Option<String>,
    /// Per-category patterns keyed by stable category name.
    pub values: BTreeMap<String, Pattern>,
}

impl RawScope {
    /// Lowers a typed scope into its serialized form.
    #[must_use]
    pub fn from_scope<C: Categorizer>(scope: &Scope<C>) -> Self {
        Self {
            cat: scope.cat.as_str().to_string(),
            filter_cat: scope.filter_cat.map(|c| c.as_str().to_string()),
            values: scope
                .values
                .iter()
                .map(|(c, p)| (c.as_str().to_string(), p.clone()))
                .collect(),
        }
    }

    /// Raises a serialized scope back into a typed scope.
    pub fn to_scope<C: Categorizer>(&self) -> SelectResult<Scope<C>> {
        let cat = C::parse(&self.cat).ok_or_else(|| SelectError::unknown_category(&self.cat))?;

        let filter_cat = self
            .filter_cat
            .as_deref()
            .map(|name| C::parse(name).ok_or_else(|| SelectError::unknown_category(name)))
            .transpose()?;

        let mut values = HashMap::new();
        for (name, pattern) in &self.values {
            let key = C::parse(name).ok_or_else(|| SelectError::unknown_category(name))?;
            values.insert(key, pattern.clone());
        }

        Ok(Scope {
            cat,
            filter_cat,
            values,
        })
    }
}

/// Expands Any-owner scopes into one scope per discovered owner.
#[must_use]
pub fn discrete_scopes<C: Categorizer>(scopes: Vec<Scope<C>>, owners: &[String]) -> Vec<Scope<C>> {
    let root = C::root();
    let mut out = Vec::with_capacity(scopes.len());

    for scope in scopes {
        if scope.is_any(root) && !owners.is_empty() {
            for owner in owners {
                out.push(
                    scope
                        .clone()
                        .set(root, Pattern::literals([owner.as_str()])),
                );
            }
        } else {
            out.push(scope);
        }
    }

    out
}

/// Reduces a details catalog to the entries selected by the scope sets.
///
/// An entry is a candidate when it matches at least one include scope of its
/// leaf category, or when there are no includes for that category but the
/// selector carries filters. Candidates matching any exclude scope are
/// dropped, as are candidates failing any filter scope. A filter scope whose
/// target cannot be extracted from the entry's info fails the entry, so
/// filters narrow the result across categories.
#[must_use]
pub fn reduce<C: Categorizer>(
    catalog: &Catalog,
    includes: &[Scope<C>],
    filters: &[Scope<C>],
    excludes: &[Scope<C>],
) -> Catalog {
    let mut kept: Vec<Entry> = Vec::new();

    for entry in catalog.items() {
        let Some(leaf) = C::entry_leaf(&entry.info) else {
            continue;
        };

        let Ok(path) = Path::from_repo_ref(&entry.repo_ref, true) else {
            continue;
        };

        let values = leaf.path_values(&path);

        let cat_includes: Vec<_> = includes.iter().filter(|s| s.leaf() == leaf).collect();

        let candidate = if cat_includes.is_empty() {
            !filters.is_empty()
        } else {
            cat_includes
                .iter()
                .any(|s| s.matches_entry(leaf, &values, &entry.info))
        };

        if !candidate {
            continue;
        }

        if excludes
            .iter()
            .filter(|s| s.leaf() == leaf)
            .any(|s| s.matches_entry(leaf, &values, &entry.info))
        {
            continue;
        }

        if !filters
            .iter()
            .all(|s| s.matches_entry(leaf, &values, &entry.info))
        {
            continue;
        }

        kept.push(entry);
    }

    Catalog::from_entries(kept)
}

/// Standard path-value extraction for `(owner, folder, item)` shaped paths.
///
/// Folder targets include the joined folder path and the directory short
/// ref; item targets include the raw item ID and the item path short ref.
pub fn standard_path_values<C: Categorizer>(
    root: C,
    folder_cat: C,
    item_cat: C,
    path: &Path,
) -> HashMap<C, Vec<String>> {
    let mut values = HashMap::new();

    values.insert(root, vec![path.owner().to_string()]);

    let mut folder_targets = vec![path.folder_path()];
    if let Ok(dir) = path.dir() {
        folder_targets.push(dir.short_ref());
    }
    values.insert(folder_cat, folder_targets);

    let mut item_targets = Vec::new();
    if let Some(item) = path.item() {
        item_targets.push(item.to_string());
        item_targets.push(path.short_ref());
    }
    values.insert(item_cat, item_targets);

    values
}
