//! # Matchers
//!
//! Name-based matching against the pattern catalog, and the weaker
//! identifier fallback keyed on a roster record's own storage id.
//!
//! Both matchers return the first hit in index order. Snapshot order is made
//! stable by [`HandleIndex::from_identities`](crate::index::HandleIndex), but
//! two runs against a mutated store can still pick different entries when
//! several handles satisfy the same earliest rule. With ambiguity detection
//! on, those other identities are reported as rivals instead of being
//! silently ignored, as are later handles that fire a more specific name
//! rule than the winner.

use crate::index::{HandleEntry, HandleLookup};
use crate::model::IdentityId;
use crate::normalize::{local_part, normalize_handle, DOMAIN_SEPARATOR};
use crate::patterns::{HandleForms, NameTokens, CATALOG};
use std::fmt;
use tracing::debug;

/// Sub-rules of the identifier fallback, in evaluation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FallbackRule {
    ExactDocId,
    NormalizedDocId,
    EmailContainsDocId,
    NormalizedEmailContainsDocId,
    DocIdContainsEmail,
    DocIdContainsNormalizedEmail,
    BothContainNames,
}

impl FallbackRule {
    pub const ALL: [FallbackRule; 7] = [
        FallbackRule::ExactDocId,
        FallbackRule::NormalizedDocId,
        FallbackRule::EmailContainsDocId,
        FallbackRule::NormalizedEmailContainsDocId,
        FallbackRule::DocIdContainsEmail,
        FallbackRule::DocIdContainsNormalizedEmail,
        FallbackRule::BothContainNames,
    ];

    pub fn name(self) -> &'static str {
        match self {
            FallbackRule::ExactDocId => "Exact DocID",
            FallbackRule::NormalizedDocId => "Normalized DocID",
            FallbackRule::EmailContainsDocId => "Email Contains DocID",
            FallbackRule::NormalizedEmailContainsDocId => "Normalized Email Contains DocID",
            FallbackRule::DocIdContainsEmail => "DocID Contains Email",
            FallbackRule::DocIdContainsNormalizedEmail => "DocID Contains Normalized Email",
            FallbackRule::BothContainNames => "Both Contain Names",
        }
    }

    fn applies(self, doc_user: &str, user: &UsernameForms, names: &NameTokens) -> bool {
        match self {
            FallbackRule::ExactDocId => user.raw == doc_user,
            FallbackRule::NormalizedDocId => user.normalized == doc_user,
            FallbackRule::EmailContainsDocId => user.raw.contains(doc_user),
            FallbackRule::NormalizedEmailContainsDocId => user.normalized.contains(doc_user),
            FallbackRule::DocIdContainsEmail => doc_user.contains(user.raw.as_str()),
            FallbackRule::DocIdContainsNormalizedEmail => {
                !user.normalized.is_empty() && doc_user.contains(user.normalized.as_str())
            }
            FallbackRule::BothContainNames => names.both_in(&user.raw) && names.both_in(doc_user),
        }
    }
}

impl fmt::Display for FallbackRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Which strategy produced a match. Used for statistics and audit output only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MatchLabel {
    Name(&'static str),
    Fallback(FallbackRule),
}

impl MatchLabel {
    pub fn is_fallback(&self) -> bool {
        matches!(self, MatchLabel::Fallback(_))
    }
}

impl fmt::Display for MatchLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchLabel::Name(label) => f.write_str(label),
            MatchLabel::Fallback(rule) => write!(f, "Doc ID Fallback - {}", rule),
        }
    }
}

/// A confirmed match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Match {
    pub identity: IdentityId,
    /// The handle that matched, exactly as indexed.
    pub handle: String,
    pub label: MatchLabel,
    /// Later identities satisfying the winning rule, or for name matches a
    /// more specific one. Only populated when ambiguity detection is enabled.
    pub rivals: Vec<IdentityId>,
}

impl Match {
    pub fn is_ambiguous(&self) -> bool {
        !self.rivals.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchResult {
    NoMatch,
    Matched(Match),
}

impl MatchResult {
    pub fn is_match(&self) -> bool {
        matches!(self, MatchResult::Matched(_))
    }

    pub fn as_match(&self) -> Option<&Match> {
        match self {
            MatchResult::Matched(found) => Some(found),
            MatchResult::NoMatch => None,
        }
    }
}

/// Matcher options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Matcher {
    detect_ambiguity: bool,
}

impl Matcher {
    pub fn new(detect_ambiguity: bool) -> Self {
        Self { detect_ambiguity }
    }

    /// Name-based matching against the pattern catalog.
    pub fn by_name(&self, first_name: &str, last_name: &str, index: &dyn HandleLookup) -> MatchResult {
        let Some(names) = NameTokens::new(first_name, last_name) else {
            debug!(first_name, last_name, "Name normalizes to an empty token");
            return MatchResult::NoMatch;
        };
        debug!(first = names.first(), last = names.last(), "Searching by name");

        let mut entries = index.entries();
        let mut checked = 0usize;
        while let Some(entry) = entries.next() {
            checked += 1;
            let forms = HandleForms::new(&entry.handle);
            if let Some(rank) = catalog_rank(&names, &forms) {
                let pattern = &CATALOG[rank];
                debug!(handle = %entry.handle, identity = %entry.identity, label = pattern.label, "Name match");
                let rivals = if self.detect_ambiguity {
                    name_rivals(entries, entry, rank, &names)
                } else {
                    Vec::new()
                };
                return matched(entry, MatchLabel::Name(pattern.label), rivals);
            }
        }
        debug!(checked, "No name-based match");
        MatchResult::NoMatch
    }

    /// Identifier fallback. The record id must contain both name tokens
    /// before the index is scanned at all.
    pub fn by_identifier(
        &self,
        first_name: &str,
        last_name: &str,
        record_id: &str,
        index: &dyn HandleLookup,
    ) -> MatchResult {
        let Some(names) = NameTokens::new(first_name, last_name) else {
            return MatchResult::NoMatch;
        };
        let doc_user = record_username(record_id);
        if !names.both_in(&doc_user) {
            debug!(record_id, doc_user = %doc_user, "Record id lacks name tokens, skipping fallback");
            return MatchResult::NoMatch;
        }
        debug!(record_id, doc_user = %doc_user, "Trying identifier fallback");

        let mut entries = index.entries();
        while let Some(entry) = entries.next() {
            let user = UsernameForms::new(&entry.handle);
            if user.raw.is_empty() {
                continue;
            }
            if let Some(rule) = FallbackRule::ALL
                .into_iter()
                .find(|rule| rule.applies(&doc_user, &user, &names))
            {
                debug!(handle = %entry.handle, identity = %entry.identity, rule = %rule, "Fallback match");
                let rivals = if self.detect_ambiguity {
                    fallback_rivals(entries, entry, rule, &doc_user, &names)
                } else {
                    Vec::new()
                };
                return matched(entry, MatchLabel::Fallback(rule), rivals);
            }
        }
        debug!(record_id, "No fallback match");
        MatchResult::NoMatch
    }

    /// Name matching, then the identifier fallback when a record id is given.
    pub fn resolve(
        &self,
        first_name: &str,
        last_name: &str,
        record_id: Option<&str>,
        index: &dyn HandleLookup,
    ) -> MatchResult {
        match self.by_name(first_name, last_name, index) {
            MatchResult::NoMatch => match record_id {
                Some(record_id) => self.by_identifier(first_name, last_name, record_id, index),
                None => MatchResult::NoMatch,
            },
            found => found,
        }
    }
}

/// Name-based matching with default options.
pub fn match_by_name(first_name: &str, last_name: &str, index: &dyn HandleLookup) -> MatchResult {
    Matcher::default().by_name(first_name, last_name, index)
}

/// Identifier fallback with default options.
pub fn match_by_identifier(
    first_name: &str,
    last_name: &str,
    record_id: &str,
    index: &dyn HandleLookup,
) -> MatchResult {
    Matcher::default().by_identifier(first_name, last_name, record_id, index)
}

/// Username portion of a record id. Handle-shaped ids keep their local part
/// as-is (lower-cased); anything else is normalized like a handle.
pub fn record_username(record_id: &str) -> String {
    if record_id.contains(DOMAIN_SEPARATOR) {
        local_part(record_id).to_lowercase()
    } else {
        normalize_handle(record_id)
    }
}

struct UsernameForms {
    raw: String,
    normalized: String,
}

impl UsernameForms {
    fn new(handle: &str) -> Self {
        Self {
            raw: local_part(handle).to_lowercase(),
            normalized: local_part(&normalize_handle(handle)).to_string(),
        }
    }
}

fn matched(entry: &HandleEntry, label: MatchLabel, rivals: Vec<IdentityId>) -> MatchResult {
    MatchResult::Matched(Match {
        identity: entry.identity.clone(),
        handle: entry.handle.clone(),
        label,
        rivals,
    })
}

// Entries before the winner fired no pattern at all, so only the remainder
// can hold rivals: later handles firing the winning rule or a stronger one.
fn name_rivals<'a>(
    rest: impl Iterator<Item = &'a HandleEntry>,
    winner: &HandleEntry,
    rank: usize,
    names: &NameTokens,
) -> Vec<IdentityId> {
    let mut rivals: Vec<IdentityId> = Vec::new();
    for entry in rest {
        if entry.identity == winner.identity || rivals.contains(&entry.identity) {
            continue;
        }
        if catalog_rank(names, &HandleForms::new(&entry.handle)).is_some_and(|r| r <= rank) {
            rivals.push(entry.identity.clone());
        }
    }
    rivals
}

/// Position of the first catalog entry that fires; lower is more specific.
fn catalog_rank(names: &NameTokens, forms: &HandleForms) -> Option<usize> {
    CATALOG.iter().position(|pattern| pattern.matches(names, forms))
}

fn fallback_rivals<'a>(
    rest: impl Iterator<Item = &'a HandleEntry>,
    winner: &HandleEntry,
    rule: FallbackRule,
    doc_user: &str,
    names: &NameTokens,
) -> Vec<IdentityId> {
    let mut rivals: Vec<IdentityId> = Vec::new();
    for entry in rest {
        if entry.identity == winner.identity || rivals.contains(&entry.identity) {
            continue;
        }
        let user = UsernameForms::new(&entry.handle);
        if !user.raw.is_empty() && rule.applies(doc_user, &user, names) {
            rivals.push(entry.identity.clone());
        }
    }
    rivals
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::HandleIndex;
    use crate::model::Identity;

    fn index(handles: &[(&str, &str)]) -> HandleIndex {
        HandleIndex::from_identities(
            handles
                .iter()
                .map(|(id, handle)| Identity::new(*id, *handle))
                .collect(),
        )
    }

    fn label_of(result: &MatchResult) -> Option<String> {
        result.as_match().map(|found| found.label.to_string())
    }

    #[test]
    fn earliest_entry_in_index_order_wins() {
        // u1 only satisfies the fuzzy rule but comes first in snapshot order.
        let idx = index(&[("u1", "xjohnysmith@test.com"), ("u2", "john.smith@test.com")]);
        let result = match_by_name("John", "Smith", &idx);
        assert_eq!(label_of(&result).as_deref(), Some("Contains First+Last"));
        assert_eq!(result.as_match().unwrap().identity, IdentityId::new("u1"));

        let idx = index(&[("u1", "john.smith@test.com"), ("u2", "xjohnysmith@test.com")]);
        let result = match_by_name("John", "Smith", &idx);
        assert_eq!(label_of(&result).as_deref(), Some("First.Last"));
        assert_eq!(result.as_match().unwrap().identity, IdentityId::new("u1"));
    }

    #[test]
    fn stronger_later_handle_is_flagged_as_rival() {
        let idx = index(&[("u1", "xjohnysmith@test.com"), ("u2", "jsmith@test.com")]);
        let found = Matcher::new(true)
            .by_name("John", "Smith", &idx)
            .as_match()
            .cloned()
            .unwrap();
        assert_eq!(found.identity, IdentityId::new("u1"));
        assert_eq!(found.label, MatchLabel::Name("Contains First+Last"));
        assert_eq!(found.rivals, vec![IdentityId::new("u2")]);

        // A weaker later handle is not a rival of a precise winner.
        let idx = index(&[("u1", "jsmith@test.com"), ("u2", "xjohnysmith@test.com")]);
        let found = Matcher::new(true)
            .by_name("John", "Smith", &idx)
            .as_match()
            .cloned()
            .unwrap();
        assert!(found.rivals.is_empty());
    }

    #[test]
    fn initial_form_matches_jsmith() {
        let idx = index(&[("u9", "jsmith@test.com")]);
        let result = match_by_name("John", "Smith", &idx);
        let found = result.as_match().expect("match");
        assert_eq!(found.label, MatchLabel::Name("F+Last"));
        assert_eq!(found.handle, "jsmith@test.com");
    }

    #[test]
    fn numbered_dotted_form_matches_obrien() {
        let idx = index(&[("u1", "someone@test.com"), ("u2", "3mary.obrien@test.com")]);
        let result = match_by_name("Mary", "O'Brien", &idx);
        assert_eq!(label_of(&result).as_deref(), Some("Number+First.Last"));
    }

    #[test]
    fn repeated_calls_are_deterministic() {
        let idx = index(&[("a", "jsmith@test.com"), ("b", "john.smith@corp.org")]);
        let first = match_by_name("John", "Smith", &idx);
        let second = match_by_name("John", "Smith", &idx);
        assert_eq!(first, second);
    }

    #[test]
    fn fallback_matches_username_inside_record_id() {
        let idx = index(&[("u1", "jsmith2024@test.com"), ("u2", "smith@legacy.org")]);
        assert_eq!(match_by_name("John", "Smith", &idx), MatchResult::NoMatch);

        let result = match_by_identifier("John", "Smith", "john.smith@test.com", &idx);
        let found = result.as_match().expect("fallback match");
        assert_eq!(found.identity, IdentityId::new("u2"));
        assert_eq!(found.label, MatchLabel::Fallback(FallbackRule::DocIdContainsEmail));
        assert_eq!(found.label.to_string(), "Doc ID Fallback - DocID Contains Email");
    }

    #[test]
    fn fallback_handles_plain_record_ids() {
        let idx = index(&[("u1", "ann.lee.x@test.com")]);
        assert_eq!(record_username("Ann.Lee"), "annlee");
        let result = match_by_identifier("Ann", "Lee", "Ann.Lee", &idx);
        assert_eq!(
            result.as_match().map(|m| m.label),
            Some(MatchLabel::Fallback(FallbackRule::NormalizedEmailContainsDocId))
        );
    }

    #[test]
    fn fallback_guard_rejects_unrelated_ids() {
        let idx = index(&[("u1", "doc@test.com")]);
        assert_eq!(match_by_identifier("Ann", "Lee", "doc12345", &idx), MatchResult::NoMatch);
    }

    #[test]
    fn resolve_skips_fallback_when_name_matches() {
        // The record id would hit the fallback on u1; the name rule must win on u2.
        let idx = index(&[("u1", "smith@legacy.org"), ("u2", "jsmith@test.com")]);
        let result = Matcher::default().resolve("John", "Smith", Some("john.smith@test.com"), &idx);
        let found = result.as_match().unwrap();
        assert_eq!(found.identity, IdentityId::new("u2"));
        assert!(!found.label.is_fallback());
    }

    #[test]
    fn ambiguity_lists_rivals_for_same_rule() {
        let idx = index(&[
            ("u1", "jsmith@test.com"),
            ("u2", "jsmith@corp.org"),
            ("u3", "john.smith.sr@test.com"),
        ]);
        let found = Matcher::new(true)
            .by_name("John", "Smith", &idx)
            .as_match()
            .cloned()
            .unwrap();
        assert_eq!(found.identity, IdentityId::new("u1"));
        assert_eq!(found.rivals, vec![IdentityId::new("u2")]);
        assert!(found.is_ambiguous());

        let plain = match_by_name("John", "Smith", &idx);
        assert!(!plain.as_match().unwrap().is_ambiguous());
    }

    #[test]
    fn empty_names_never_match() {
        let idx = index(&[("u1", "anything@test.com")]);
        assert_eq!(match_by_name("", "", &idx), MatchResult::NoMatch);
        assert_eq!(match_by_identifier("", "Lee", "lee", &idx), MatchResult::NoMatch);
    }
}
