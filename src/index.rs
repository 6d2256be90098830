//! # Handle Index
//!
//! Read-only mapping from login handle to identity, built once per run from a
//! full credential-store snapshot. Keys are the handles exactly as stored;
//! matchers normalize at lookup time so several normalized views resolve
//! against the same entries.

use crate::model::{Identity, IdentityId};
use crate::normalize::DOMAIN_SEPARATOR;
use hashbrown::HashMap;
use tracing::warn;

/// One indexed handle and the identity it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandleEntry {
    pub handle: String,
    pub identity: IdentityId,
}

/// Scan access the matchers need.
pub trait HandleLookup {
    /// Entries in stable snapshot order.
    fn entries(&self) -> Box<dyn Iterator<Item = &HandleEntry> + '_>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Counts produced while building an index.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexStats {
    pub indexed: usize,
    pub missing_handle: usize,
    pub duplicate_handle: usize,
}

/// Snapshot-ordered handle index.
#[derive(Debug, Clone, Default)]
pub struct HandleIndex {
    entries: Vec<HandleEntry>,
    by_handle: HashMap<String, usize>,
    stats: IndexStats,
}

impl HandleIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from a credential-store snapshot. The snapshot is sorted by
    /// identity id first so iteration order does not depend on the order the
    /// store happened to list identities in.
    pub fn from_identities(mut identities: Vec<Identity>) -> Self {
        identities.sort_by(|a, b| a.id.cmp(&b.id));
        let mut index = Self::new();
        for identity in identities {
            match identity.handle {
                Some(handle) if !handle.trim().is_empty() => {
                    index.insert(handle, identity.id);
                }
                _ => index.stats.missing_handle += 1,
            }
        }
        index
    }

    /// Build from `(identity, handle)` pairs, keeping the given order.
    pub fn from_pairs<I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (IdentityId, String)>,
    {
        let mut index = Self::new();
        for (identity, handle) in pairs {
            index.insert(handle, identity);
        }
        index
    }

    /// Insert a handle. Returns `false` and keeps the existing entry when the
    /// exact handle is already indexed.
    pub fn insert(&mut self, handle: String, identity: IdentityId) -> bool {
        if let Some(&existing) = self.by_handle.get(&handle) {
            warn!(
                handle = %handle,
                kept = %self.entries[existing].identity,
                dropped = %identity,
                "Duplicate handle in snapshot"
            );
            self.stats.duplicate_handle += 1;
            return false;
        }
        self.by_handle.insert(handle.clone(), self.entries.len());
        self.entries.push(HandleEntry { handle, identity });
        self.stats.indexed += 1;
        true
    }

    pub fn get(&self, handle: &str) -> Option<&IdentityId> {
        self.by_handle
            .get(handle)
            .map(|&position| &self.entries[position].identity)
    }

    pub fn stats(&self) -> &IndexStats {
        &self.stats
    }

    /// Handle domains by frequency, most common first, ties by name.
    pub fn top_domains(&self, limit: usize) -> Vec<(String, usize)> {
        let mut counts: HashMap<&str, usize> = HashMap::new();
        for entry in &self.entries {
            if let Some(at) = entry.handle.find(DOMAIN_SEPARATOR) {
                *counts.entry(&entry.handle[at + 1..]).or_default() += 1;
            }
        }
        let mut domains: Vec<(String, usize)> = counts
            .into_iter()
            .map(|(domain, count)| (domain.to_string(), count))
            .collect();
        domains.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        domains.truncate(limit);
        domains
    }
}

impl HandleLookup for HandleIndex {
    fn entries(&self) -> Box<dyn Iterator<Item = &HandleEntry> + '_> {
        Box::new(self.entries.iter())
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_is_sorted_by_identity_id() {
        let index = HandleIndex::from_identities(vec![
            Identity::new("u3", "c@test.com"),
            Identity::new("u1", "a@test.com"),
            Identity::new("u2", "b@test.com"),
        ]);
        let order: Vec<&str> = index.entries().map(|e| e.identity.as_str()).collect();
        assert_eq!(order, vec!["u1", "u2", "u3"]);
    }

    #[test]
    fn keys_are_exact_handles() {
        let index = HandleIndex::from_identities(vec![Identity::new("u1", "John.Smith@Test.com")]);
        assert_eq!(index.get("John.Smith@Test.com"), Some(&IdentityId::new("u1")));
        assert_eq!(index.get("johnsmith@testcom"), None);
    }

    #[test]
    fn duplicates_and_missing_handles_are_counted() {
        let mut no_handle = Identity::new("u0", "");
        no_handle.handle = None;
        let index = HandleIndex::from_identities(vec![
            no_handle,
            Identity::new("u1", "a@test.com"),
            Identity::new("u2", "a@test.com"),
            Identity::new("u3", "  "),
        ]);
        assert_eq!(index.len(), 1);
        assert_eq!(index.get("a@test.com"), Some(&IdentityId::new("u1")));
        assert_eq!(
            index.stats(),
            &IndexStats {
                indexed: 1,
                missing_handle: 2,
                duplicate_handle: 1,
            }
        );
    }

    #[test]
    fn top_domains_orders_by_count() {
        let index = HandleIndex::from_pairs(vec![
            (IdentityId::new("1"), "a@test.com".to_string()),
            (IdentityId::new("2"), "b@corp.org".to_string()),
            (IdentityId::new("3"), "c@test.com".to_string()),
            (IdentityId::new("4"), "nodomain".to_string()),
        ]);
        assert_eq!(
            index.top_domains(5),
            vec![("test.com".to_string(), 2), ("corp.org".to_string(), 1)]
        );
    }
}
