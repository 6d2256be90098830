#[path = "../src/test_support.rs"]
mod test_support;

use std::collections::HashMap;

use rosterlink_rs::model::IdentityId;
use rosterlink_rs::normalize::canonical_handle;
use rosterlink_rs::reconcile::{ReconcileOptions, Reconciler};
use rosterlink_rs::store::{MemoryCredentialStore, MemoryDocumentStore};
use test_support::generate_roster;

#[tokio::test]
async fn second_run_requests_no_writes() -> anyhow::Result<()> {
    let roster = generate_roster(300, 0.8, 7);
    let credentials = MemoryCredentialStore::with_identities(roster.identities);
    let documents = MemoryDocumentStore::with_records("officials", roster.records);
    let reconciler = Reconciler::new(&credentials, &documents, ReconcileOptions::default());

    let first = reconciler.run().await?;
    assert!(first.linked > 0);
    assert!(first.linked + first.unmatched + first.update_failures <= first.records_total);
    let credential_writes = credentials.writes();
    let document_writes = documents.writes();
    assert_eq!(document_writes.updates, first.linked);

    let second = reconciler.run().await?;
    assert_eq!(second.linked, 0);
    assert_eq!(second.handles_updated, 0);
    assert_eq!(second.already_linked, first.already_linked + first.linked);
    assert_eq!(credentials.writes(), credential_writes);
    assert_eq!(documents.writes(), document_writes);

    Ok(())
}

#[tokio::test]
async fn linked_identities_carry_a_canonical_handle() -> anyhow::Result<()> {
    let roster = generate_roster(120, 1.0, 11);
    let credentials = MemoryCredentialStore::with_identities(roster.identities);
    let documents = MemoryDocumentStore::with_records("officials", roster.records.clone());
    let summary = Reconciler::new(&credentials, &documents, ReconcileOptions::default())
        .run()
        .await?;
    assert_eq!(summary.unmatched, 0);

    // Namesakes all claim the first matching identity.
    let mut expected: HashMap<IdentityId, Vec<String>> = HashMap::new();
    for record in &roster.records {
        let Some(stored) = documents.get("officials", &record.id) else {
            continue;
        };
        if let Some(identity) = stored.linked_identity {
            expected.entry(identity).or_default().push(canonical_handle(
                &record.first_name,
                &record.last_name,
                "test.com",
            ));
        }
    }
    assert!(!expected.is_empty());

    for identity in credentials.identities()? {
        if let Some(candidates) = expected.get(&identity.id) {
            let handle = identity.handle().unwrap_or_default().to_string();
            assert!(candidates.contains(&handle), "{} has {}", identity.id, handle);
        }
    }

    Ok(())
}
