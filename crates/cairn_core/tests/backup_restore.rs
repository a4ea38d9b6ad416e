//! End-to-end backup and restore scenarios against the in-memory backends.

use std::collections::BTreeMap;
use std::sync::Arc;

use cairn_core::events::{
    Bus, EventSink, BACKUP_END, BACKUP_START, REPO_INIT, RESTORE_END, RESTORE_START,
};
use cairn_core::model::StableId;
use cairn_core::ops::{BackupOperation, BackupOptions, OpStatus};
use cairn_core::{EngineError, Repository};
use cairn_details::{ContactInfo, EventInfo, ItemInfo, MailInfo};
use cairn_path::{CategoryType, Path, ServiceType};
use cairn_select::{ExchangeSelector, Selector};
use cairn_store::{CancelToken, ManifestStore, MemoryEngine, MemoryManifests, SnapshotEngine};
use cairn_testkit::{CollectingSink, StubConnector, TestCollection, TestStream};

struct Harness {
    engine: Arc<MemoryEngine>,
    repo: Repository,
    sink: Arc<CollectingSink>,
}

fn harness() -> Harness {
    let engine = Arc::new(MemoryEngine::new());
    let manifests = Arc::new(MemoryManifests::new());
    let sink = Arc::new(CollectingSink::new());

    let bus = Bus::silent();
    bus.subscribe(Arc::clone(&sink) as Arc<dyn EventSink>);

    let repo = Repository::initialize(
        "t",
        Arc::clone(&engine) as Arc<dyn SnapshotEngine>,
        manifests,
        bus,
    )
    .unwrap();

    Harness { engine, repo, sink }
}

fn mail_dir(folders: &[&str]) -> Path {
    Path::new(
        "t",
        ServiceType::Exchange,
        "alice",
        CategoryType::Mail,
        folders.iter().map(|f| f.to_string()).collect(),
        None,
    )
    .unwrap()
}

fn mail_info(subject: &str) -> ItemInfo {
    ItemInfo::Mail(MailInfo {
        sender: "sender@example.com".to_string(),
        subject: subject.to_string(),
        received: None,
    })
}

fn alice_selector() -> Selector {
    let mut sel = ExchangeSelector::new();
    sel.include(ExchangeSelector::users(&["alice"]));
    sel.into_selector()
}

fn run_backup(h: &Harness, connector: &StubConnector) -> (StableId, BackupOperation) {
    let mut op = h
        .repo
        .new_backup(alice_selector(), BackupOptions::default())
        .unwrap();

    let id = op.run(&CancelToken::new(), connector).unwrap();
    (id, op)
}

#[test]
fn first_backup_of_a_single_mail_folder() {
    let h = harness();

    let connector = StubConnector::new(ServiceType::Exchange, &["alice"]);
    connector.stage(Box::new(
        TestCollection::new(mail_dir(&["Inbox"]))
            .with_stream(TestStream::new("a", *b"mail a").with_info(mail_info("first")))
            .with_stream(TestStream::new("b", *b"mail b").with_info(mail_info("second"))),
    ));

    let (id, op) = run_backup(&h, &connector);

    assert_eq!(op.status, OpStatus::Completed);
    assert_eq!(op.results.stats.items_written, 2);
    assert_eq!(op.results.stats.items_read, 2);
    assert!(op.results.write_errors.is_empty());

    // Two item entries plus one folder entry per ancestor, Inbox included.
    let (catalog, backup) = h.repo.backup_details(&id).unwrap();

    let mut item_paths = catalog.paths();
    item_paths.sort();
    assert_eq!(
        item_paths,
        vec![
            "t/exchange/alice/mail/Inbox/a".to_string(),
            "t/exchange/alice/mail/Inbox/b".to_string(),
        ]
    );

    let inbox_folders: Vec<_> = catalog
        .entries()
        .into_iter()
        .filter(|e| !e.is_item)
        .filter(|e| matches!(&e.info, ItemInfo::Folder(f) if f.display_name == "Inbox"))
        .collect();
    assert_eq!(inbox_folders.len(), 1);

    assert_eq!(backup.stats.items_written, 2);

    // The new backup is listed.
    let listed = h.repo.backups_by_tag(&BTreeMap::new()).unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].base.stable_id, Some(id));

    let keys = h.sink.keys();
    assert_eq!(keys, vec![REPO_INIT, BACKUP_START, BACKUP_END]);
}

#[test]
fn incremental_reuses_unchanged_items() {
    let h = harness();

    let connector = StubConnector::new(ServiceType::Exchange, &["alice"]);
    connector.stage(Box::new(
        TestCollection::new(mail_dir(&["Inbox"]))
            .with_stream(TestStream::new("a", *b"mail a").with_info(mail_info("a")))
            .with_stream(TestStream::new("b", *b"mail b").with_info(mail_info("b"))),
    ));
    run_backup(&h, &connector);

    // Second run: only the new item is produced.
    connector.stage(Box::new(
        TestCollection::not_moved(mail_dir(&["Inbox"]))
            .with_stream(TestStream::new("c", *b"mail c!").with_info(mail_info("c"))),
    ));

    let (id2, op2) = run_backup(&h, &connector);

    assert_eq!(op2.status, OpStatus::Completed);
    assert_eq!(op2.results.stats.items_written, 3);
    assert_eq!(op2.results.stats.items_read, 1);

    // Only c was hashed; a and b were reused from the base snapshot. The
    // frame codec adds a four-byte version word to every streamed body.
    assert_eq!(op2.results.stats.hashed_bytes, (b"mail c!".len() + 4) as u64);

    let (catalog, _) = h.repo.backup_details(&id2).unwrap();
    let mut item_paths = catalog.paths();
    item_paths.sort();
    assert_eq!(
        item_paths,
        vec![
            "t/exchange/alice/mail/Inbox/a".to_string(),
            "t/exchange/alice/mail/Inbox/b".to_string(),
            "t/exchange/alice/mail/Inbox/c".to_string(),
        ]
    );

    // All three items restore with their original bodies.
    let restorer = StubConnector::new(ServiceType::Exchange, &["alice"]);
    let mut restore = h.repo.new_restore(id2, alice_selector()).unwrap();
    restore.run(&CancelToken::new(), &restorer).unwrap();

    assert_eq!(restore.status, OpStatus::Completed);
    assert_eq!(restore.results.items_written, 3);

    let mut consumed = restorer.consumed.lock().clone();
    consumed.sort_by(|x, y| x.id.cmp(&y.id));
    assert_eq!(consumed[0].body, b"mail a");
    assert_eq!(consumed[1].body, b"mail b");
    assert_eq!(consumed[2].body, b"mail c!");
}

#[test]
fn moved_folder_carries_its_items() {
    let h = harness();

    let connector = StubConnector::new(ServiceType::Exchange, &["alice"]);
    connector.stage(Box::new(
        TestCollection::new(mail_dir(&["Inbox"]))
            .with_stream(TestStream::new("x", *b"message x").with_info(mail_info("x"))),
    ));
    run_backup(&h, &connector);

    // The folder moved to Archive/Inbox; no items changed.
    connector.stage(Box::new(TestCollection::moved(
        mail_dir(&["Inbox"]),
        mail_dir(&["Archive", "Inbox"]),
    )));

    let (id2, op2) = run_backup(&h, &connector);
    assert_eq!(op2.status, OpStatus::Completed);

    let (catalog, _) = h.repo.backup_details(&id2).unwrap();
    assert_eq!(
        catalog.paths(),
        vec!["t/exchange/alice/mail/Archive/Inbox/x".to_string()]
    );

    // The item restores from its new location only.
    let restorer = StubConnector::new(ServiceType::Exchange, &["alice"]);
    let mut restore = h.repo.new_restore(id2, alice_selector()).unwrap();
    restore.run(&CancelToken::new(), &restorer).unwrap();

    let consumed = restorer.consumed.lock().clone();
    assert_eq!(consumed.len(), 1);
    assert_eq!(consumed[0].dir, "t/exchange/alice/mail/Archive/Inbox");
    assert_eq!(consumed[0].body, b"message x");
}

#[test]
fn deleted_folder_is_dropped_from_the_snapshot() {
    let h = harness();

    let connector = StubConnector::new(ServiceType::Exchange, &["alice"]);
    connector.stage(Box::new(
        TestCollection::new(mail_dir(&["Drafts"]))
            .with_stream(TestStream::new("d1", *b"draft 1").with_info(mail_info("d1")))
            .with_stream(TestStream::new("d2", *b"draft 2").with_info(mail_info("d2"))),
    ));
    connector.stage(Box::new(
        TestCollection::new(mail_dir(&["Inbox"]))
            .with_stream(TestStream::new("i1", *b"inbox 1").with_info(mail_info("i1"))),
    ));
    run_backup(&h, &connector);

    connector.stage(Box::new(TestCollection::tombstone(mail_dir(&["Drafts"]))));
    connector.stage(Box::new(TestCollection::not_moved(mail_dir(&["Inbox"]))));

    let (id2, op2) = run_backup(&h, &connector);
    assert_eq!(op2.status, OpStatus::Completed);

    let (catalog, _) = h.repo.backup_details(&id2).unwrap();
    assert_eq!(
        catalog.paths(),
        vec!["t/exchange/alice/mail/Inbox/i1".to_string()]
    );

    // No Drafts folder entry survives.
    assert!(!catalog
        .entries()
        .iter()
        .any(|e| e.repo_ref.contains("Drafts")));
}

#[test]
fn deleted_item_does_not_leak_back_from_the_base() {
    let h = harness();

    let connector = StubConnector::new(ServiceType::Exchange, &["alice"]);
    connector.stage(Box::new(
        TestCollection::new(mail_dir(&["Inbox"]))
            .with_stream(TestStream::new("keep", *b"kept").with_info(mail_info("keep")))
            .with_stream(TestStream::new("gone", *b"gone").with_info(mail_info("gone"))),
    ));
    run_backup(&h, &connector);

    // The item is reported deleted; its base copy must not resurface.
    connector.stage(Box::new(
        TestCollection::not_moved(mail_dir(&["Inbox"]))
            .with_stream(TestStream::new("gone", *b"").deleted()),
    ));

    let (id2, _) = run_backup(&h, &connector);

    let (catalog, _) = h.repo.backup_details(&id2).unwrap();
    assert_eq!(
        catalog.paths(),
        vec!["t/exchange/alice/mail/Inbox/keep".to_string()]
    );
}

#[test]
fn selector_reduce_narrows_a_mixed_backup() {
    let h = harness();

    let contacts_dir = Path::new(
        "t",
        ServiceType::Exchange,
        "alice",
        CategoryType::Contacts,
        vec!["default".to_string()],
        None,
    )
    .unwrap();

    let events_dir = Path::new(
        "t",
        ServiceType::Exchange,
        "alice",
        CategoryType::Events,
        vec!["calendar".to_string()],
        None,
    )
    .unwrap();

    let connector = StubConnector::new(ServiceType::Exchange, &["alice"]);
    connector.stage(Box::new(
        TestCollection::new(mail_dir(&["Inbox"]))
            .with_stream(TestStream::new("m1", *b"x").with_info(mail_info("about fnord")))
            .with_stream(TestStream::new("m2", *b"y").with_info(mail_info("unrelated"))),
    ));
    connector.stage(Box::new(TestCollection::new(contacts_dir).with_stream(
        TestStream::new("c1", *b"z").with_info(ItemInfo::Contact(ContactInfo {
            name: "Ann".to_string(),
        })),
    )));
    connector.stage(Box::new(TestCollection::new(events_dir).with_stream(
        TestStream::new("e1", *b"w").with_info(ItemInfo::Event(EventInfo::default())),
    )));

    let (id, _) = run_backup(&h, &connector);
    let (catalog, _) = h.repo.backup_details(&id).unwrap();
    assert_eq!(catalog.paths().len(), 4);

    let mut sel = ExchangeSelector::new();
    sel.include(ExchangeSelector::users(&["*"]));
    sel.filter(ExchangeSelector::mail_subject("fnord"));

    let reduced = sel.into_selector().reduce(&catalog).unwrap();
    assert_eq!(
        reduced.paths(),
        vec!["t/exchange/alice/mail/Inbox/m1".to_string()]
    );
}

#[test]
fn empty_run_ends_in_no_data() {
    let h = harness();
    let connector = StubConnector::new(ServiceType::Exchange, &["alice"]);

    let mut op = h
        .repo
        .new_backup(alice_selector(), BackupOptions::default())
        .unwrap();

    op.run(&CancelToken::new(), &connector).unwrap();

    assert_eq!(op.status, OpStatus::NoData);
    assert!(h.repo.backups_by_tag(&BTreeMap::new()).unwrap().is_empty());
}

#[test]
fn incomplete_base_is_skipped() {
    let h = harness();

    let connector = StubConnector::new(ServiceType::Exchange, &["alice"]);
    connector.stage(Box::new(
        TestCollection::new(mail_dir(&["Inbox"]))
            .with_stream(TestStream::new("a", *b"mail a").with_info(mail_info("a"))),
    ));
    let (id1, _) = run_backup(&h, &connector);

    let snap1 = h.repo.backup(&id1).unwrap().snapshot_id;
    h.engine.mark_incomplete(&snap1, "checkpoint").unwrap();

    // Same item again; with the base unusable this is a full re-upload, but
    // content dedup keeps new bytes at zero.
    connector.stage(Box::new(
        TestCollection::new(mail_dir(&["Inbox"]))
            .with_stream(TestStream::new("a", *b"mail a").with_info(mail_info("a"))),
    ));

    let (_, op2) = run_backup(&h, &connector);

    // All items were streamed again, none reused from a base.
    assert_eq!(op2.results.stats.items_read, op2.results.stats.items_written);
    assert!(op2.results.stats.hashed_bytes > 0);
    assert_eq!(op2.results.stats.uploaded_bytes, 0);
}

#[test]
fn disabled_incrementals_ignore_bases() {
    let h = harness();

    let connector = StubConnector::new(ServiceType::Exchange, &["alice"]);
    connector.stage(Box::new(
        TestCollection::new(mail_dir(&["Inbox"]))
            .with_stream(TestStream::new("a", *b"mail a").with_info(mail_info("a"))),
    ));
    run_backup(&h, &connector);

    connector.stage(Box::new(
        TestCollection::not_moved(mail_dir(&["Inbox"]))
            .with_stream(TestStream::new("b", *b"mail b").with_info(mail_info("b"))),
    ));

    let mut op = h
        .repo
        .new_backup(
            alice_selector(),
            BackupOptions {
                disable_incrementals: true,
            },
        )
        .unwrap();

    let id = op.run(&CancelToken::new(), &connector).unwrap();

    // Without the base, only the newly produced item lands in the snapshot.
    let (catalog, _) = h.repo.backup_details(&id).unwrap();
    assert_eq!(
        catalog.paths(),
        vec!["t/exchange/alice/mail/Inbox/b".to_string()]
    );
}

#[test]
fn metadata_round_trips_between_runs() {
    let h = harness();

    let connector =
        StubConnector::new(ServiceType::Exchange, &["alice"]).with_metadata_items(&["delta_tokens"]);

    connector.stage(Box::new(
        TestCollection::new(mail_dir(&["Inbox"]))
            .with_stream(TestStream::new("a", *b"mail a").with_info(mail_info("a"))),
    ));
    // The connector writes its sidecar at the category root, without info.
    connector.stage(Box::new(
        TestCollection::new(mail_dir(&[]))
            .with_stream(TestStream::new("delta_tokens", *br#"{"cursor":1}"#)),
    ));

    let (id1, _) = run_backup(&h, &connector);

    // Sidecar files are uploaded but never cataloged.
    let (catalog1, _) = h.repo.backup_details(&id1).unwrap();
    assert_eq!(
        catalog1.paths(),
        vec!["t/exchange/alice/mail/Inbox/a".to_string()]
    );

    connector.stage(Box::new(TestCollection::not_moved(mail_dir(&["Inbox"]))));
    connector.stage(Box::new(
        TestCollection::not_moved(mail_dir(&[]))
            .with_stream(TestStream::new("delta_tokens", *br#"{"cursor":2}"#)),
    ));

    run_backup(&h, &connector);

    let seen = connector.metadata_seen.lock().clone();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].0, "t/exchange/alice/mail");
    assert_eq!(seen[0].1, vec!["delta_tokens".to_string()]);
}

#[test]
fn unreadable_metadata_degrades_to_full_backup() {
    let h = harness();

    // First run writes no sidecar files at all.
    let plain = StubConnector::new(ServiceType::Exchange, &["alice"]);
    plain.stage(Box::new(
        TestCollection::new(mail_dir(&["Inbox"]))
            .with_stream(TestStream::new("a", *b"mail a").with_info(mail_info("a"))),
    ));

    let mut op1 = h
        .repo
        .new_backup(alice_selector(), BackupOptions::default())
        .unwrap();
    op1.run(&CancelToken::new(), &plain).unwrap();

    // Second run expects sidecars the base does not have; the base is
    // dropped and the run proceeds as a full backup.
    let with_meta =
        StubConnector::new(ServiceType::Exchange, &["alice"]).with_metadata_items(&["delta_tokens"]);
    with_meta.stage(Box::new(
        TestCollection::not_moved(mail_dir(&["Inbox"]))
            .with_stream(TestStream::new("b", *b"mail b").with_info(mail_info("b"))),
    ));

    let mut op2 = h
        .repo
        .new_backup(alice_selector(), BackupOptions::default())
        .unwrap();
    let id2 = op2.run(&CancelToken::new(), &with_meta).unwrap();

    assert_eq!(op2.status, OpStatus::Completed);
    assert!(with_meta.metadata_seen.lock().is_empty());

    // Nothing was carried over from the dropped base.
    let (catalog, _) = h.repo.backup_details(&id2).unwrap();
    assert_eq!(
        catalog.paths(),
        vec!["t/exchange/alice/mail/Inbox/b".to_string()]
    );
}

#[test]
fn cancelled_backup_fails_with_cancellation() {
    let h = harness();

    let connector = StubConnector::new(ServiceType::Exchange, &["alice"]);
    connector.stage(Box::new(
        TestCollection::new(mail_dir(&["Inbox"]))
            .with_stream(TestStream::new("a", *b"mail a").with_info(mail_info("a"))),
    ));

    let ctx = CancelToken::new();
    ctx.cancel();

    let mut op = h
        .repo
        .new_backup(alice_selector(), BackupOptions::default())
        .unwrap();

    let err = op.run(&ctx, &connector).unwrap_err();
    assert!(err.is_cancelled());
    assert_eq!(op.status, OpStatus::Failed);
}

#[test]
fn multiple_roots_fail_the_merge() {
    let h = harness();

    let other_tenant = Path::new(
        "t2",
        ServiceType::Exchange,
        "alice",
        CategoryType::Mail,
        vec!["Inbox".to_string()],
        None,
    )
    .unwrap();

    let connector = StubConnector::new(ServiceType::Exchange, &["alice"]);
    connector.stage(Box::new(
        TestCollection::new(mail_dir(&["Inbox"]))
            .with_stream(TestStream::new("a", *b"mail a").with_info(mail_info("a"))),
    ));
    connector.stage(Box::new(
        TestCollection::new(other_tenant)
            .with_stream(TestStream::new("z", *b"mail z").with_info(mail_info("z"))),
    ));

    let mut op = h
        .repo
        .new_backup(alice_selector(), BackupOptions::default())
        .unwrap();

    let err = op.run(&CancelToken::new(), &connector).unwrap_err();
    assert!(matches!(err, EngineError::InvalidCollection { .. }));
    assert_eq!(op.status, OpStatus::Failed);
}

#[test]
fn restore_of_empty_selection_is_no_data() {
    let h = harness();

    let connector = StubConnector::new(ServiceType::Exchange, &["alice"]);
    connector.stage(Box::new(
        TestCollection::new(mail_dir(&["Inbox"]))
            .with_stream(TestStream::new("a", *b"mail a").with_info(mail_info("a"))),
    ));
    let (id, _) = run_backup(&h, &connector);

    // A selector matching nothing.
    let mut sel = ExchangeSelector::new();
    sel.include(ExchangeSelector::mails(&["nobody"], &["*"], &["*"]));

    let restorer = StubConnector::new(ServiceType::Exchange, &["alice"]);
    let mut restore = h.repo.new_restore(id, sel.into_selector()).unwrap();
    restore.run(&CancelToken::new(), &restorer).unwrap();

    assert_eq!(restore.status, OpStatus::NoData);
    assert!(restorer.consumed.lock().is_empty());

    let keys = h.sink.keys();
    assert!(keys.contains(&RESTORE_START));
    assert!(keys.contains(&RESTORE_END));
}

#[test]
fn repository_refuses_double_initialize_and_reconnects() {
    let engine = Arc::new(MemoryEngine::new());
    let manifests: Arc<dyn ManifestStore> = Arc::new(MemoryManifests::new());

    let repo = Repository::initialize(
        "t",
        Arc::clone(&engine) as Arc<dyn SnapshotEngine>,
        Arc::clone(&manifests),
        Bus::silent(),
    )
    .unwrap();

    let id = repo.id().to_string();
    drop(repo);

    let again = Repository::initialize(
        "t",
        Arc::clone(&engine) as Arc<dyn SnapshotEngine>,
        Arc::clone(&manifests),
        Bus::silent(),
    );
    assert!(matches!(again, Err(EngineError::AlreadyExists)));

    let connected = Repository::connect(
        "t",
        engine as Arc<dyn SnapshotEngine>,
        manifests,
        Bus::silent(),
    )
    .unwrap();
    assert_eq!(connected.id(), id);
}

#[test]
fn closed_repository_rejects_operations() {
    let mut h = harness();

    h.repo.close();
    h.repo.close(); // double close is a no-op

    assert!(matches!(
        h.repo.new_backup(alice_selector(), BackupOptions::default()),
        Err(EngineError::Closed)
    ));
}

#[test]
fn delete_backup_removes_record_details_and_snapshot() {
    let h = harness();

    let connector = StubConnector::new(ServiceType::Exchange, &["alice"]);
    connector.stage(Box::new(
        TestCollection::new(mail_dir(&["Inbox"]))
            .with_stream(TestStream::new("a", *b"mail a").with_info(mail_info("a"))),
    ));
    let (id, _) = run_backup(&h, &connector);

    let snapshot_id = h.repo.backup(&id).unwrap().snapshot_id;

    h.repo.delete_backup(&id).unwrap();

    assert!(h.repo.backup(&id).is_err());
    assert!(h.engine.open_root(&snapshot_id).is_err());
    assert!(h.repo.backups_by_tag(&BTreeMap::new()).unwrap().is_empty());
}
