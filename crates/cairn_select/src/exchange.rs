//! Exchange selector: mail, contacts, and events.

use std::collections::HashMap;

use cairn_details::{Catalog, ItemInfo};
use cairn_path::{CategoryType, Path, ServiceType};

use crate::pattern::{Comparator, Pattern};
use crate::scope::{discrete_scopes, standard_path_values, Categorizer, Scope};
use crate::selector::Selector;

/// Category keys of the Exchange path and filter shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExchangeCategory {
    /// The mailbox owner.
    User,
    /// A mail folder.
    MailFolder,
    /// A mail message.
    Mail,
    /// A contact folder.
    ContactFolder,
    /// A contact.
    Contact,
    /// An event calendar.
    EventCalendar,
    /// A calendar event.
    Event,
    /// Filter: mail sender contains.
    MailSender,
    /// Filter: mail subject contains.
    MailSubject,
    /// Filter: mail received after.
    MailReceivedAfter,
    /// Filter: mail received before.
    MailReceivedBefore,
    /// Filter: contact name contains.
    ContactName,
    /// Filter: event organizer contains.
    EventOrganizer,
    /// Filter: event recurrence equals.
    EventRecurs,
    /// Filter: event starts after.
    EventStartsAfter,
    /// Filter: event starts before.
    EventStartsBefore,
    /// Filter: event subject contains.
    EventSubject,
}

impl Categorizer for ExchangeCategory {
    fn root() -> Self {
        Self::User
    }

    fn leaf(self) -> Self {
        match self {
            Self::MailFolder | Self::Mail | Self::MailSender | Self::MailSubject
            | Self::MailReceivedAfter | Self::MailReceivedBefore => Self::Mail,

            Self::ContactFolder | Self::Contact | Self::ContactName => Self::Contact,

            Self::EventCalendar | Self::Event | Self::EventOrganizer | Self::EventRecurs
            | Self::EventStartsAfter | Self::EventStartsBefore | Self::EventSubject => Self::Event,

            Self::User => Self::User,
        }
    }

    fn path_keys(self) -> &'static [Self] {
        match self.leaf() {
            Self::Mail => &[Self::User, Self::MailFolder, Self::Mail],
            Self::Contact => &[Self::User, Self::ContactFolder, Self::Contact],
            Self::Event => &[Self::User, Self::EventCalendar, Self::Event],
            _ => &[Self::User],
        }
    }

    fn group_defaults(self) -> &'static [Self] {
        match self {
            Self::MailFolder => &[Self::Mail],
            Self::ContactFolder => &[Self::Contact],
            Self::EventCalendar => &[Self::Event],
            Self::User => &[
                Self::MailFolder,
                Self::Mail,
                Self::ContactFolder,
                Self::Contact,
                Self::EventCalendar,
                Self::Event,
            ],
            _ => &[],
        }
    }

    fn path_values(self, path: &Path) -> HashMap<Self, Vec<String>> {
        match self.leaf() {
            Self::Mail => standard_path_values(Self::User, Self::MailFolder, Self::Mail, path),
            Self::Contact => {
                standard_path_values(Self::User, Self::ContactFolder, Self::Contact, path)
            }
            Self::Event => {
                standard_path_values(Self::User, Self::EventCalendar, Self::Event, path)
            }
            _ => HashMap::from([(Self::User, vec![path.owner().to_string()])]),
        }
    }

    fn info_target(self, info: &ItemInfo) -> Option<String> {
        match (self, info) {
            (Self::MailSender, ItemInfo::Mail(m)) => Some(m.sender.clone()),
            (Self::MailSubject, ItemInfo::Mail(m)) => Some(m.subject.clone()),
            (Self::MailReceivedAfter | Self::MailReceivedBefore, ItemInfo::Mail(m)) => {
                m.received.map(|t| t.to_rfc3339())
            }
            (Self::ContactName, ItemInfo::Contact(c)) => Some(c.name.clone()),
            (Self::EventOrganizer, ItemInfo::Event(e)) => Some(e.organizer.clone()),
            (Self::EventSubject, ItemInfo::Event(e)) => Some(e.subject.clone()),
            (Self::EventRecurs, ItemInfo::Event(e)) => Some(e.recurs.to_string()),
            (Self::EventStartsAfter | Self::EventStartsBefore, ItemInfo::Event(e)) => {
                e.start.map(|t| t.to_rfc3339())
            }
            _ => None,
        }
    }

    fn entry_leaf(info: &ItemInfo) -> Option<Self> {
        match info {
            ItemInfo::Mail(_) => Some(Self::Mail),
            ItemInfo::Contact(_) => Some(Self::Contact),
            ItemInfo::Event(_) => Some(Self::Event),
            _ => None,
        }
    }

    fn data_category(self) -> Option<CategoryType> {
        match self {
            Self::Mail => Some(CategoryType::Mail),
            Self::Contact => Some(CategoryType::Contacts),
            Self::Event => Some(CategoryType::Events),
            _ => None,
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::MailFolder => "mail_folder",
            Self::Mail => "mail",
            Self::ContactFolder => "contact_folder",
            Self::Contact => "contact",
            Self::EventCalendar => "event_calendar",
            Self::Event => "event",
            Self::MailSender => "mail_sender",
            Self::MailSubject => "mail_subject",
            Self::MailReceivedAfter => "mail_received_after",
            Self::MailReceivedBefore => "mail_received_before",
            Self::ContactName => "contact_name",
            Self::EventOrganizer => "event_organizer",
            Self::EventRecurs => "event_recurs",
            Self::EventStartsAfter => "event_starts_after",
            Self::EventStartsBefore => "event_starts_before",
            Self::EventSubject => "event_subject",
        }
    }

    fn parse(name: &str) -> Option<Self> {
        let cat = match name {
            "user" => Self::User,
            "mail_folder" => Self::MailFolder,
            "mail" => Self::Mail,
            "contact_folder" => Self::ContactFolder,
            "contact" => Self::Contact,
            "event_calendar" => Self::EventCalendar,
            "event" => Self::Event,
            "mail_sender" => Self::MailSender,
            "mail_subject" => Self::MailSubject,
            "mail_received_after" => Self::MailReceivedAfter,
            "mail_received_before" => Self::MailReceivedBefore,
            "contact_name" => Self::ContactName,
            "event_organizer" => Self::EventOrganizer,
            "event_recurs" => Self::EventRecurs,
            "event_starts_after" => Self::EventStartsAfter,
            "event_starts_before" => Self::EventStartsBefore,
            "event_subject" => Self::EventSubject,
            _ => return None,
        };

        Some(cat)
    }
}

/// Selector over Exchange data.
#[derive(Debug, Clone)]
pub struct ExchangeSelector {
    sel: Selector,
}

impl Default for ExchangeSelector {
    fn default() -> Self {
        Self::new()
    }
}

impl ExchangeSelector {
    /// Creates an empty Exchange selector.
    #[must_use]
    pub fn new() -> Self {
        Self {
            sel: Selector::new(ServiceType::Exchange),
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
    pub fn include(&mut self, scopes: Vec<Scope<ExchangeCategory>>) {
        self.sel.push_includes(scopes);
    }

    /// Appends scopes to the filter set.
    pub fn filter(&mut self, scopes: Vec<Scope<ExchangeCategory>>) {
        self.sel.push_filters(scopes);
    }

    /// Appends scopes to the exclusion set.
    pub fn exclude(&mut self, scopes: Vec<Scope<ExchangeCategory>>) {
        self.sel.push_excludes(scopes);
    }

    /// The include scopes with Any-owner scopes expanded per owner.
    pub fn discrete_includes(&self, owners: &[String]) -> Vec<Scope<ExchangeCategory>> {
        let includes = Selector::typed::<ExchangeCategory>(&self.sel.includes)
            .unwrap_or_default();

        discrete_scopes(includes, owners)
    }

    /// Reduces a details catalog per the selector's scope sets.
    #[must_use]
    pub fn reduce(&self, catalog: &Catalog) -> Catalog {
        let includes = Selector::typed::<ExchangeCategory>(&self.sel.includes).unwrap_or_default();
        let filters = Selector::typed::<ExchangeCategory>(&self.sel.filters).unwrap_or_default();
        let excludes = Selector::typed::<ExchangeCategory>(&self.sel.excludes).unwrap_or_default();

        crate::scope::reduce(catalog, &includes, &filters, &excludes)
    }

    // Scope factories. Slices accept `*` for Any; empty slices select nothing.

    /// All data of the given users: one group scope per data category.
    #[must_use]
    pub fn users(users: &[&str]) -> Vec<Scope<ExchangeCategory>> {
        vec![
            Scope::make(
                ExchangeCategory::MailFolder,
                vec![
                    (ExchangeCategory::User, Pattern::literals(users.iter().copied())),
                    (ExchangeCategory::MailFolder, Pattern::Any),
                ],
            ),
            Scope::make(
                ExchangeCategory::ContactFolder,
                vec![
                    (ExchangeCategory::User, Pattern::literals(users.iter().copied())),
                    (ExchangeCategory::ContactFolder, Pattern::Any),
                ],
            ),
            Scope::make(
                ExchangeCategory::EventCalendar,
                vec![
                    (ExchangeCategory::User, Pattern::literals(users.iter().copied())),
                    (ExchangeCategory::EventCalendar, Pattern::Any),
                ],
            ),
        ]
    }

    /// Mail messages by user, folder, and message ID.
    #[must_use]
    pub fn mails(users: &[&str], folders: &[&str], mails: &[&str]) -> Vec<Scope<ExchangeCategory>> {
        vec![Scope::make(
            ExchangeCategory::Mail,
            vec![
                (ExchangeCategory::User, Pattern::literals(users.iter().copied())),
                (
                    ExchangeCategory::MailFolder,
                    Pattern::prefixes(folders.iter().copied()),
                ),
                (ExchangeCategory::Mail, Pattern::literals(mails.iter().copied())),
            ],
        )]
    }

    /// Whole mail folders by user and folder prefix.
    #[must_use]
    pub fn mail_folders(users: &[&str], folders: &[&str]) -> Vec<Scope<ExchangeCategory>> {
        vec![Scope::make(
            ExchangeCategory::MailFolder,
            vec![
                (ExchangeCategory::User, Pattern::literals(users.iter().copied())),
                (
                    ExchangeCategory::MailFolder,
                    Pattern::prefixes(folders.iter().copied()),
                ),
            ],
        )]
    }

    /// Contacts by user, folder, and contact ID.
    #[must_use]
    pub fn contacts(
        users: &[&str],
        folders: &[&str],
        contacts: &[&str],
    ) -> Vec<Scope<ExchangeCategory>> {
        vec![Scope::make(
            ExchangeCategory::Contact,
            vec![
                (ExchangeCategory::User, Pattern::literals(users.iter().copied())),
                (
                    ExchangeCategory::ContactFolder,
                    Pattern::prefixes(folders.iter().copied()),
                ),
                (
                    ExchangeCategory::Contact,
                    Pattern::literals(contacts.iter().copied()),
                ),
            ],
        )]
    }

    /// Whole contact folders by user and folder prefix.
    #[must_use]
    pub fn contact_folders(users: &[&str], folders: &[&str]) -> Vec<Scope<ExchangeCategory>> {
        vec![Scope::make(
            ExchangeCategory::ContactFolder,
            vec![
                (ExchangeCategory::User, Pattern::literals(users.iter().copied())),
                (
                    ExchangeCategory::ContactFolder,
                    Pattern::prefixes(folders.iter().copied()),
                ),
            ],
        )]
    }

    /// Events by user, calendar, and event ID.
    #[must_use]
    pub fn events(
        users: &[&str],
        calendars: &[&str],
        events: &[&str],
    ) -> Vec<Scope<ExchangeCategory>> {
        vec![Scope::make(
            ExchangeCategory::Event,
            vec![
                (ExchangeCategory::User, Pattern::literals(users.iter().copied())),
                (
                    ExchangeCategory::EventCalendar,
                    Pattern::prefixes(calendars.iter().copied()),
                ),
                (ExchangeCategory::Event, Pattern::literals(events.iter().copied())),
            ],
        )]
    }

    /// Whole calendars by user and calendar prefix.
    #[must_use]
    pub fn event_calendars(users: &[&str], calendars: &[&str]) -> Vec<Scope<ExchangeCategory>> {
        vec![Scope::make(
            ExchangeCategory::EventCalendar,
            vec![
                (ExchangeCategory::User, Pattern::literals(users.iter().copied())),
                (
                    ExchangeCategory::EventCalendar,
                    Pattern::prefixes(calendars.iter().copied()),
                ),
            ],
        )]
    }

    // Filter factories.

    /// Mail whose sender contains the given string.
    #[must_use]
    pub fn mail_sender(sender: &str) -> Vec<Scope<ExchangeCategory>> {
        vec![Scope::make_filter(
            ExchangeCategory::Mail,
            ExchangeCategory::MailSender,
            Pattern::compare(Comparator::Contains, sender),
        )]
    }

    /// Mail whose subject contains the given string.
    #[must_use]
    pub fn mail_subject(subject: &str) -> Vec<Scope<ExchangeCategory>> {
        vec![Scope::make_filter(
            ExchangeCategory::Mail,
            ExchangeCategory::MailSubject,
            Pattern::compare(Comparator::Contains, subject),
        )]
    }

    /// Mail received after the given canonical time.
    #[must_use]
    pub fn mail_received_after(time: &str) -> Vec<Scope<ExchangeCategory>> {
        vec![Scope::make_filter(
            ExchangeCategory::Mail,
            ExchangeCategory::MailReceivedAfter,
            Pattern::compare(Comparator::After, time),
        )]
    }

    /// Mail received before the given canonical time.
    #[must_use]
    pub fn mail_received_before(time: &str) -> Vec<Scope<ExchangeCategory>> {
        vec![Scope::make_filter(
            ExchangeCategory::Mail,
            ExchangeCategory::MailReceivedBefore,
            Pattern::compare(Comparator::Before, time),
        )]
    }

    /// Contacts whose name contains the given string.
    #[must_use]
    pub fn contact_name(name: &str) -> Vec<Scope<ExchangeCategory>> {
        vec![Scope::make_filter(
            ExchangeCategory::Contact,
            ExchangeCategory::ContactName,
            Pattern::compare(Comparator::Contains, name),
        )]
    }

    /// Events whose organizer contains the given string.
    #[must_use]
    pub fn event_organizer(organizer: &str) -> Vec<Scope<ExchangeCategory>> {
        vec![Scope::make_filter(
            ExchangeCategory::Event,
            ExchangeCategory::EventOrganizer,
            Pattern::compare(Comparator::Contains, organizer),
        )]
    }

    /// Events whose recurrence flag equals the given value.
    #[must_use]
    pub fn event_recurs(recurs: &str) -> Vec<Scope<ExchangeCategory>> {
        vec![Scope::make_filter(
            ExchangeCategory::Event,
            ExchangeCategory::EventRecurs,
            Pattern::compare(Comparator::Equals, recurs),
        )]
    }

    /// Events starting after the given canonical time.
    #[must_use]
    pub fn event_starts_after(time: &str) -> Vec<Scope<ExchangeCategory>> {
        vec![Scope::make_filter(
            ExchangeCategory::Event,
            ExchangeCategory::EventStartsAfter,
            Pattern::compare(Comparator::After, time),
        )]
    }

    /// Events starting before the given canonical time.
    #[must_use]
    pub fn event_starts_before(time: &str) -> Vec<Scope<ExchangeCategory>> {
        vec![Scope::make_filter(
            ExchangeCategory::Event,
            ExchangeCategory::EventStartsBefore,
            Pattern::compare(Comparator::Before, time),
        )]
    }

    /// Events whose subject contains the given string.
    #[must_use]
    pub fn event_subject(subject: &str) -> Vec<Scope<ExchangeCategory>> {
        vec![Scope::make_filter(
            ExchangeCategory::Event,
            ExchangeCategory::EventSubject,
            Pattern::compare(Comparator::Contains, subject),
        )]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cairn_details::{ContactInfo, EventInfo, MailInfo};

    fn catalog_with(entries: Vec<(&str, ItemInfo)>) -> Catalog {
        let catalog = Catalog::new();

        for (repo_ref, info) in entries {
            let path = Path::from_repo_ref(repo_ref, true).unwrap();
            catalog.add(
                path.to_string(),
                path.short_ref(),
                path.dir().unwrap().short_ref(),
                true,
                info,
            );
        }

        catalog
    }

    fn mail_info(subject: &str) -> ItemInfo {
        ItemInfo::Mail(MailInfo {
            sender: "sender@example.com".into(),
            subject: subject.into(),
            received: None,
        })
    }

    #[test]
    fn include_by_folder_keeps_only_that_folder() {
        let catalog = catalog_with(vec![
            ("t/exchange/alice/mail/Inbox/m1", mail_info("a")),
            ("t/exchange/alice/mail/Drafts/m2", mail_info("b")),
        ]);

        let mut sel = ExchangeSelector::new();
        sel.include(ExchangeSelector::mail_folders(&["alice"], &["Inbox"]));

        let reduced = sel.reduce(&catalog);
        assert_eq!(reduced.paths(), vec!["t/exchange/alice/mail/Inbox/m1"]);
    }

    #[test]
    fn folder_prefix_covers_subfolders() {
        let catalog = catalog_with(vec![
            ("t/exchange/alice/mail/Inbox/sub/m1", mail_info("a")),
            ("t/exchange/alice/mail/Inbox2/m2", mail_info("b")),
        ]);

        let mut sel = ExchangeSelector::new();
        sel.include(ExchangeSelector::mail_folders(&["alice"], &["Inbox"]));

        assert_eq!(
            sel.reduce(&catalog).paths(),
            vec!["t/exchange/alice/mail/Inbox/sub/m1"]
        );
    }

    #[test]
    fn excludes_override_includes() {
        let catalog = catalog_with(vec![
            ("t/exchange/alice/mail/Inbox/m1", mail_info("a")),
            ("t/exchange/alice/mail/Inbox/m2", mail_info("b")),
        ]);

        let mut sel = ExchangeSelector::new();
        sel.include(ExchangeSelector::users(&["alice"]));
        sel.exclude(ExchangeSelector::mails(&["alice"], &["*"], &["m2"]));

        assert_eq!(
            sel.reduce(&catalog).paths(),
            vec!["t/exchange/alice/mail/Inbox/m1"]
        );
    }

    #[test]
    fn subject_filter_narrows_across_categories() {
        let catalog = catalog_with(vec![
            ("t/exchange/alice/mail/Inbox/m1", mail_info("about fnord")),
            ("t/exchange/alice/mail/Inbox/m2", mail_info("unrelated")),
            (
                "t/exchange/alice/contacts/default/c1",
                ItemInfo::Contact(ContactInfo { name: "Ann".into() }),
            ),
            (
                "t/exchange/alice/events/cal/e1",
                ItemInfo::Event(EventInfo::default()),
            ),
        ]);

        let mut sel = ExchangeSelector::new();
        sel.include(ExchangeSelector::users(&["*"]));
        sel.filter(ExchangeSelector::mail_subject("fnord"));

        assert_eq!(
            sel.reduce(&catalog).paths(),
            vec!["t/exchange/alice/mail/Inbox/m1"]
        );
    }

    #[test]
    fn item_matches_by_short_ref() {
        let path = Path::from_repo_ref("t/exchange/alice/mail/Inbox/m1", true).unwrap();
        let catalog = catalog_with(vec![("t/exchange/alice/mail/Inbox/m1", mail_info("a"))]);

        let short = path.short_ref();
        let mut sel = ExchangeSelector::new();
        sel.include(ExchangeSelector::mails(&["alice"], &["*"], &[&short]));

        assert_eq!(sel.reduce(&catalog).paths().len(), 1);
    }

    #[test]
    fn discrete_includes_expand_wildcard_owner() {
        let mut sel = ExchangeSelector::new();
        sel.include(ExchangeSelector::mail_folders(&["*"], &["Inbox"]));

        let owners = vec!["alice".to_string(), "bob".to_string()];
        let scopes = sel.discrete_includes(&owners);

        assert_eq!(scopes.len(), 2);
        assert!(scopes
            .iter()
            .all(|s| !s.is_any(ExchangeCategory::User)));
    }

    #[test]
    fn none_scope_selects_nothing() {
        let catalog = catalog_with(vec![("t/exchange/alice/mail/Inbox/m1", mail_info("a"))]);

        let mut sel = ExchangeSelector::new();
        sel.include(ExchangeSelector::mails(&["alice"], &["Inbox"], &[]));

        assert!(sel.reduce(&catalog).paths().is_empty());
    }
}
