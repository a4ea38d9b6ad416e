//! Typed per-service item metadata.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Metadata attached to a details entry.
///
/// The variant encodes which service produced the item. Metadata sidecar
/// files carry no info at all and never reach the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ItemInfo {
    /// An Exchange mail message.
    Mail(MailInfo),
    /// An Exchange contact.
    Contact(ContactInfo),
    /// An Exchange calendar event.
    Event(EventInfo),
    /// A OneDrive file.
    Drive(FileInfo),
    /// A SharePoint library file.
    Library(FileInfo),
    /// A directory registered by the progress sidecar.
    Folder(FolderInfo),
}

impl ItemInfo {
    /// Whether this info describes a folder rather than an item.
    #[must_use]
    pub fn is_folder(&self) -> bool {
        matches!(self, Self::Folder(_))
    }
}

/// Mail message metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MailInfo {
    /// Sender address.
    pub sender: String,
    /// Subject line.
    pub subject: String,
    /// When the message was received.
    pub received: Option<DateTime<Utc>>,
}

/// Contact metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactInfo {
    /// Display name of the contact.
    pub name: String,
}

/// Calendar event metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventInfo {
    /// Organizer address.
    pub organizer: String,
    /// Event subject.
    pub subject: String,
    /// Scheduled start time.
    pub start: Option<DateTime<Utc>>,
    /// Whether the event recurs.
    pub recurs: bool,
}

/// Drive or library file metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileInfo {
    /// File display name.
    pub name: String,
    /// Size in bytes.
    pub size: u64,
    /// Creation time.
    pub created: Option<DateTime<Utc>>,
    /// Last modification time.
    pub modified: Option<DateTime<Utc>>,
}

/// Folder metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FolderInfo {
    /// The folder's display element.
    pub display_name: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn info_serde_roundtrip() {
        let infos = vec![
            ItemInfo::Mail(MailInfo {
                sender: "a@b".into(),
                subject: "hi".into(),
                received: None,
            }),
            ItemInfo::Contact(ContactInfo { name: "Ann".into() }),
            ItemInfo::Folder(FolderInfo {
                display_name: "Inbox".into(),
            }),
        ];

        for info in infos {
            let json = serde_json::to_string(&info).unwrap();
            let back: ItemInfo = serde_json::from_str(&json).unwrap();
            assert_eq!(back, info);
        }
    }

    #[test]
    fn folder_detection() {
        assert!(ItemInfo::Folder(FolderInfo::default()).is_folder());
        assert!(!ItemInfo::Contact(ContactInfo::default()).is_folder());
    }
}
