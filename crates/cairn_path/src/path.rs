//! The canonical `Path` type and its service/category qualifiers.

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::builder::PathBuilder;
use crate::error::{PathError, PathResult};

/// Number of hex characters in a short reference.
pub const SHORT_REF_LEN: usize = 12;

/// The M365 service a path belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceType {
    /// Exchange (mail, contacts, events).
    Exchange,
    /// OneDrive (drive files).
    OneDrive,
    /// SharePoint (site libraries).
    SharePoint,
}

impl ServiceType {
    /// The wire name of the service, used as a path element.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Exchange => "exchange",
            Self::OneDrive => "onedrive",
            Self::SharePoint => "sharepoint",
        }
    }

    /// Parses a wire name back into a service.
    pub fn parse(name: &str) -> PathResult<Self> {
        match name {
            "exchange" => Ok(Self::Exchange),
            "onedrive" => Ok(Self::OneDrive),
            "sharepoint" => Ok(Self::SharePoint),
            _ => Err(PathError::unknown_service(name)),
        }
    }
}

impl fmt::Display for ServiceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The category of data under a service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CategoryType {
    /// Exchange mail messages.
    Mail,
    /// Exchange contacts.
    Contacts,
    /// Exchange calendar events.
    Events,
    /// OneDrive files.
    Files,
    /// SharePoint library files.
    Libraries,
}

impl CategoryType {
    /// The wire name of the category, used as a path element.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Mail => "mail",
            Self::Contacts => "contacts",
            Self::Events => "events",
            Self::Files => "files",
            Self::Libraries => "libraries",
        }
    }

    /// Parses a wire name under the given service.
    pub fn parse(name: &str, service: ServiceType) -> PathResult<Self> {
        let cat = match name {
            "mail" => Self::Mail,
            "contacts" => Self::Contacts,
            "events" => Self::Events,
            "files" => Self::Files,
            "libraries" => Self::Libraries,
            _ => return Err(PathError::unknown_category(name, service.as_str())),
        };

        if !cat.valid_for(service) {
            return Err(PathError::unknown_category(name, service.as_str()));
        }

        Ok(cat)
    }

    /// Whether this category belongs to the given service.
    #[must_use]
    pub const fn valid_for(self, service: ServiceType) -> bool {
        matches!(
            (service, self),
            (ServiceType::Exchange, Self::Mail)
                | (ServiceType::Exchange, Self::Contacts)
                | (ServiceType::Exchange, Self::Events)
                | (ServiceType::OneDrive, Self::Files)
                | (ServiceType::SharePoint, Self::Libraries)
        )
    }

    /// Every category valid for a service, in canonical order.
    #[must_use]
    pub const fn all_for(service: ServiceType) -> &'static [CategoryType] {
        match service {
            ServiceType::Exchange => &[Self::Mail, Self::Contacts, Self::Events],
            ServiceType::OneDrive => &[Self::Files],
            ServiceType::SharePoint => &[Self::Libraries],
        }
    }
}

impl fmt::Display for CategoryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Escapes a raw element for inclusion in a canonical path string.
pub(crate) fn escape_element(elem: &str) -> String {
    let mut out = String::with_capacity(elem.len());

    for c in elem.chars() {
        if c == '\\' || c == '/' {
            out.push('\\');
        }
        out.push(c);
    }

    out
}

/// Splits a canonical path string into raw elements, honoring escapes.
pub(crate) fn split_escaped(raw: &str) -> Vec<String> {
    let mut elements = Vec::new();
    let mut current = String::new();
    let mut escaped = false;

    for c in raw.chars() {
        if escaped {
            current.push(c);
            escaped = false;
        } else if c == '\\' {
            escaped = true;
        } else if c == '/' {
            elements.push(std::mem::take(&mut current));
        } else {
            current.push(c);
        }
    }

    elements.push(current);
    elements
}

/// Computes the short reference of a sequence of raw elements.
pub(crate) fn short_ref_of<'a, I>(elements: I) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    let canonical = elements
        .into_iter()
        .map(escape_element)
        .collect::<Vec<_>>()
        .join("/");

    let digest = Sha256::digest(canonical.as_bytes());
    let mut out = String::with_capacity(SHORT_REF_LEN);

    for byte in digest.iter() {
        if out.len() >= SHORT_REF_LEN {
            break;
        }
        out.push_str(&format!("{byte:02x}"));
    }

    out.truncate(SHORT_REF_LEN);
    out
}

/// A canonical, service-qualified resource path.
///
/// Shaped as `tenant / service / owner / category / folders... / item`.
/// The item element is present only for item paths; folder paths end at a
/// folder element (or at the category root).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Path {
    tenant: String,
    service: ServiceType,
    owner: String,
    category: CategoryType,
    folders: Vec<String>,
    item: Option<String>,
}

impl Path {
    /// Builds a path from its typed parts.
    ///
    /// # Errors
    ///
    /// Returns an error if any element is empty or the category does not
    /// belong to the service.
    pub fn new(
        tenant: impl Into<String>,
        service: ServiceType,
        owner: impl Into<String>,
        category: CategoryType,
        folders: Vec<String>,
        item: Option<String>,
    ) -> PathResult<Self> {
        let tenant = tenant.into();
        let owner = owner.into();

        if tenant.is_empty() || owner.is_empty() {
            return Err(PathError::EmptyElement);
        }

        if folders.iter().any(String::is_empty) || item.as_deref() == Some("") {
            return Err(PathError::EmptyElement);
        }

        if !category.valid_for(service) {
            return Err(PathError::unknown_category(
                category.as_str(),
                service.as_str(),
            ));
        }

        Ok(Self {
            tenant,
            service,
            owner,
            category,
            folders,
            item: item.map(Into::into),
        })
    }

    /// Parses a canonical path string produced by [`Path::to_string`].
    ///
    /// `is_item` declares whether the final element is an item ID.
    pub fn from_repo_ref(raw: &str, is_item: bool) -> PathResult<Self> {
        let mut elements = split_escaped(raw);

        let min = if is_item { 5 } else { 4 };
        if elements.len() < min {
            return Err(PathError::too_short(raw));
        }

        let item = if is_item { elements.pop() } else { None };
        let service = ServiceType::parse(&elements[1])?;
        let category = CategoryType::parse(&elements[3], service)?;
        let folders = elements.split_off(4);

        Self::new(
            elements[0].clone(),
            service,
            elements[2].clone(),
            category,
            folders,
            item,
        )
    }

    /// The tenant element.
    #[must_use]
    pub fn tenant(&self) -> &str {
        &self.tenant
    }

    /// The service qualifier.
    #[must_use]
    pub fn service(&self) -> ServiceType {
        self.service
    }

    /// The resource owner (user principal name or site ID).
    #[must_use]
    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// The category qualifier.
    #[must_use]
    pub fn category(&self) -> CategoryType {
        self.category
    }

    /// The folder elements below the category root.
    #[must_use]
    pub fn folders(&self) -> &[String] {
        &self.folders
    }

    /// The folder elements joined into a single display path.
    #[must_use]
    pub fn folder_path(&self) -> String {
        self.folders.join("/")
    }

    /// The item element, if this is an item path.
    #[must_use]
    pub fn item(&self) -> Option<&str> {
        self.item.as_deref()
    }

    /// Whether this path addresses an item rather than a folder.
    #[must_use]
    pub fn is_item(&self) -> bool {
        self.item.is_some()
    }

    /// Every raw element in order, prefix included.
    #[must_use]
    pub fn elements(&self) -> Vec<&str> {
        let mut out = vec![
            self.tenant.as_str(),
            self.service.as_str(),
            self.owner.as_str(),
            self.category.as_str(),
        ];

        out.extend(self.folders.iter().map(String::as_str));

        if let Some(item) = &self.item {
            out.push(item);
        }

        out
    }

    /// Returns a new path with `elem` appended.
    ///
    /// Appending an item to an item path is rejected.
    pub fn append(&self, elem: &str, is_item: bool) -> PathResult<Self> {
        if elem.is_empty() {
            return Err(PathError::EmptyElement);
        }

        if self.item.is_some() {
            return Err(PathError::NoParent {
                path: self.to_string(),
            });
        }

        let mut next = self.clone();

        if is_item {
            next.item = Some(elem.to_string());
        } else {
            next.folders.push(elem.to_string());
        }

        Ok(next)
    }

    /// Returns the directory containing this path.
    ///
    /// # Errors
    ///
    /// Returns an error when called on a category root, which has no parent
    /// within the typed path shape.
    pub fn dir(&self) -> PathResult<Self> {
        let mut parent = self.clone();

        if parent.item.take().is_none() && parent.folders.pop().is_none() {
            return Err(PathError::NoParent {
                path: self.to_string(),
            });
        }

        Ok(parent)
    }

    /// The path of the category root: same prefix, no folders or item.
    #[must_use]
    pub fn category_root(&self) -> Self {
        Self {
            tenant: self.tenant.clone(),
            service: self.service,
            owner: self.owner.clone(),
            category: self.category,
            folders: Vec::new(),
            item: None,
        }
    }

    /// An untyped builder over the same elements.
    #[must_use]
    pub fn to_builder(&self) -> PathBuilder {
        PathBuilder::from_elements(self.elements())
    }

    /// Stable short hash of the canonical path string.
    #[must_use]
    pub fn short_ref(&self) -> String {
        short_ref_of(self.elements())
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let joined = self
            .elements()
            .iter()
            .map(|e| escape_element(e))
            .collect::<Vec<_>>()
            .join("/");

        f.write_str(&joined)
    }
}
