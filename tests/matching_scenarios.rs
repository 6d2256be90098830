use std::cell::Cell;

use rosterlink_rs::error::{RecordIssue, StoreError, UpdateStage};
use rosterlink_rs::export::{read_export_file, write_export_file};
use rosterlink_rs::index::{HandleEntry, HandleIndex, HandleLookup};
use rosterlink_rs::matcher::{match_by_identifier, match_by_name, MatchLabel, MatchResult};
use rosterlink_rs::model::{Identity, IdentityId, RecordId, RosterRecord};
use rosterlink_rs::reconcile::{ReconcileOptions, Reconciler};
use rosterlink_rs::store::{CredentialStore, MemoryCredentialStore, MemoryDocumentStore};

/// Index wrapper that counts how often the matchers start a scan.
struct CountingLookup {
    inner: HandleIndex,
    scans: Cell<usize>,
}

impl CountingLookup {
    fn new(identities: Vec<Identity>) -> Self {
        Self {
            inner: HandleIndex::from_identities(identities),
            scans: Cell::new(0),
        }
    }
}

impl HandleLookup for CountingLookup {
    fn entries(&self) -> Box<dyn Iterator<Item = &HandleEntry> + '_> {
        self.scans.set(self.scans.get() + 1);
        self.inner.entries()
    }

    fn len(&self) -> usize {
        self.inner.len()
    }
}

#[test]
fn fallback_guard_never_scans_the_index() {
    let lookup = CountingLookup::new(vec![
        Identity::new("u1", "doc12345@test.com"),
        Identity::new("u2", "ann@test.com"),
    ]);
    let result = match_by_identifier("Ann", "Lee", "doc12345", &lookup);
    assert_eq!(result, MatchResult::NoMatch);
    assert_eq!(lookup.scans.get(), 0);

    let result = match_by_identifier("Ann", "Lee", "ann.lee@test.com", &lookup);
    assert!(result.is_match());
    assert_eq!(lookup.scans.get(), 1);
}

#[test]
fn name_examples_pick_expected_shapes() {
    let index = HandleIndex::from_identities(vec![
        Identity::new("u1", "jsmith@test.com"),
        Identity::new("u2", "3mary.obrien@test.com"),
        Identity::new("u3", "zz@test.com"),
    ]);

    let john = match_by_name("John", "Smith", &index);
    let found = john.as_match().expect("john matches");
    assert_eq!(found.identity, IdentityId::new("u1"));
    assert_eq!(found.label, MatchLabel::Name("F+Last"));

    let mary = match_by_name("Mary", "O'Brien", &index);
    let found = mary.as_match().expect("mary matches");
    assert_eq!(found.identity, IdentityId::new("u2"));
    assert_eq!(found.label.to_string(), "Number+First.Last");

    assert_eq!(match_by_name("Ann", "Lee", &index), MatchResult::NoMatch);
    assert_eq!(match_by_name("", "Lee", &index), MatchResult::NoMatch);
}

#[tokio::test]
async fn failed_update_does_not_stop_later_records() -> anyhow::Result<()> {
    let credentials = MemoryCredentialStore::with_identities(vec![
        Identity::new("u1", "john.smith@test.com"),
        Identity::new("u2", "josmith@test.com"),
        Identity::new("u3", "ann.lee@test.com"),
    ]);
    let documents = MemoryDocumentStore::with_records(
        "officials",
        vec![
            RosterRecord::new("a1", "John", "Smith"),
            RosterRecord::new("b2", "Ann", "Lee"),
        ],
    );

    let summary = Reconciler::new(&credentials, &documents, ReconcileOptions::default())
        .run()
        .await?;

    assert_eq!(summary.update_failures, 1);
    assert_eq!(summary.linked, 1);
    assert!(matches!(
        &summary.issues[..],
        [RecordIssue::UpdateFailed {
            stage: UpdateStage::Handle,
            source: StoreError::HandleConflict { .. },
            ..
        }]
    ));
    assert!(summary.render().contains("Update failed:        1"));

    let ann = documents
        .get("officials", &RecordId::new("b2"))
        .and_then(|record| record.linked_identity);
    assert_eq!(ann, Some(IdentityId::new("u3")));
    let u3 = credentials.get_identity(&IdentityId::new("u3")).await?;
    assert_eq!(u3.handle(), Some("anlee@test.com"));
    Ok(())
}

#[tokio::test]
async fn fallback_links_record_keyed_by_handle() -> anyhow::Result<()> {
    let credentials = MemoryCredentialStore::with_identities(vec![
        Identity::new("u1", "jsmith2024@test.com"),
        Identity::new("u2", "smith@legacy.org"),
    ]);
    let documents = MemoryDocumentStore::with_records(
        "officials",
        vec![RosterRecord::new("john.smith@test.com", "John", "Smith")],
    );

    let summary = Reconciler::new(&credentials, &documents, ReconcileOptions::default())
        .run()
        .await?;
    assert_eq!(summary.matched_by_fallback, 1);
    assert_eq!(
        summary.label_counts.get("Doc ID Fallback - DocID Contains Email"),
        Some(&1)
    );
    let linked = documents
        .get("officials", &RecordId::new("john.smith@test.com"))
        .and_then(|record| record.linked_identity);
    assert_eq!(linked, Some(IdentityId::new("u2")));
    Ok(())
}

#[tokio::test]
async fn export_seeded_run_matches_live_snapshot() -> anyhow::Result<()> {
    let identities = vec![
        Identity::new("u1", "jsmith@test.com"),
        Identity::new("u2", "3mary.obrien@test.com"),
    ];
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("auth_users_export.csv");
    write_export_file(&identities, &path)?;
    let export = read_export_file(&path)?;
    assert_eq!(export.valid_rows, 2);

    let records = vec![
        RosterRecord::new("d1", "John", "Smith"),
        RosterRecord::new("d2", "Mary", "O'Brien"),
    ];
    let options = ReconcileOptions {
        dry_run: true,
        ..ReconcileOptions::default()
    };

    let credentials = MemoryCredentialStore::with_identities(identities);
    let documents = MemoryDocumentStore::with_records("officials", records);
    let reconciler = Reconciler::new(&credentials, &documents, options);
    let seeded = reconciler.run_with_index(&export.index).await?;
    let live = reconciler.run().await?;

    assert_eq!(seeded.label_counts, live.label_counts);
    assert_eq!(seeded.matched_by_name, 2);
    assert_eq!(credentials.writes().updates, 0);
    Ok(())
}
