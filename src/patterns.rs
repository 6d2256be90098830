//! # Pattern Catalog
//!
//! Ordered handle shapes used by the name-based matcher. The first entry that
//! fires wins, so entries run from most to least specific: a loose substring
//! rule must never shadow a precise structural match on the same handle.

use crate::normalize::{fold_handle, normalize_handle, normalize_name, DOMAIN_SEPARATOR};
use std::fmt;

/// Normalized given/family name tokens. Both are guaranteed non-empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameTokens {
    first: String,
    last: String,
}

impl NameTokens {
    /// Returns `None` when either name normalizes to an empty token, since an
    /// empty token would make every shape trivially match.
    pub fn new(first_name: &str, last_name: &str) -> Option<Self> {
        let first = normalize_name(first_name);
        let last = normalize_name(last_name);
        if first.is_empty() || last.is_empty() {
            return None;
        }
        Some(Self { first, last })
    }

    pub fn first(&self) -> &str {
        &self.first
    }

    pub fn last(&self) -> &str {
        &self.last
    }

    fn first_initial(&self) -> &str {
        &self.first[..1]
    }

    fn last_initial(&self) -> &str {
        &self.last[..1]
    }

    /// Both tokens occur somewhere in `text`.
    pub fn both_in(&self, text: &str) -> bool {
        text.contains(&self.first) && text.contains(&self.last)
    }
}

/// The two views of a handle the shapes test against.
#[derive(Debug, Clone)]
pub struct HandleForms {
    /// Lower-cased with the alias collapsed; separators retained.
    pub folded: String,
    /// Fully normalized; dots removed.
    pub normalized: String,
}

impl HandleForms {
    pub fn new(handle: &str) -> Self {
        Self {
            folded: fold_handle(handle),
            normalized: normalize_handle(handle),
        }
    }

    /// Local part of the folded handle. `None` when there is no domain
    /// separator, which structural shapes require.
    fn local(&self) -> Option<&str> {
        self.folded
            .find(DOMAIN_SEPARATOR)
            .map(|at| &self.folded[..at])
    }
}

type Shape = fn(&NameTokens, &HandleForms) -> bool;

/// A labeled handle shape.
#[derive(Clone, Copy)]
pub struct Pattern {
    pub label: &'static str,
    shape: Shape,
}

impl Pattern {
    pub fn matches(&self, names: &NameTokens, handle: &HandleForms) -> bool {
        (self.shape)(names, handle)
    }
}

impl fmt::Debug for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pattern").field("label", &self.label).finish()
    }
}

fn joined(local: &str, head: &str, sep: &str, tail: &str) -> bool {
    local
        .strip_prefix(head)
        .and_then(|rest| rest.strip_prefix(sep))
        .is_some_and(|rest| rest == tail)
}

fn local_is(handle: &HandleForms, head: &str, sep: &str, tail: &str) -> bool {
    handle
        .local()
        .is_some_and(|local| joined(local, head, sep, tail))
}

/// At least one leading digit, then `head sep tail`, then the separator.
fn numbered(handle: &HandleForms, head: &str, sep: &str, tail: &str) -> bool {
    let Some(local) = handle.local() else {
        return false;
    };
    let rest = local.trim_start_matches(|c: char| c.is_ascii_digit());
    rest.len() < local.len() && joined(rest, head, sep, tail)
}

/// `head` occurs, and `tail` occurs somewhere after it.
fn ordered_within(text: &str, head: &str, tail: &str) -> bool {
    text.find(head)
        .is_some_and(|at| text[at + head.len()..].contains(tail))
}

/// Catalog entries, most specific first.
pub static CATALOG: &[Pattern] = &[
    Pattern {
        label: "Number+FirstLast",
        shape: |n, h| numbered(h, n.first(), "", n.last()),
    },
    Pattern {
        label: "Number+First.Last",
        shape: |n, h| numbered(h, n.first(), ".", n.last()),
    },
    Pattern {
        label: "Number+First_Last",
        shape: |n, h| numbered(h, n.first(), "_", n.last()),
    },
    Pattern {
        label: "First.Last",
        shape: |n, h| local_is(h, n.first(), ".", n.last()),
    },
    Pattern {
        label: "First_Last",
        shape: |n, h| local_is(h, n.first(), "_", n.last()),
    },
    Pattern {
        label: "FirstLast",
        shape: |n, h| local_is(h, n.first(), "", n.last()),
    },
    Pattern {
        label: "F+Last",
        shape: |n, h| local_is(h, n.first_initial(), "", n.last()),
    },
    Pattern {
        label: "F.Last",
        shape: |n, h| local_is(h, n.first_initial(), ".", n.last()),
    },
    Pattern {
        label: "F_Last",
        shape: |n, h| local_is(h, n.first_initial(), "_", n.last()),
    },
    Pattern {
        label: "First+L",
        shape: |n, h| local_is(h, n.first(), "", n.last_initial()),
    },
    Pattern {
        label: "First.L",
        shape: |n, h| local_is(h, n.first(), ".", n.last_initial()),
    },
    Pattern {
        label: "LastFirst",
        shape: |n, h| local_is(h, n.last(), "", n.first()),
    },
    Pattern {
        label: "Last.First",
        shape: |n, h| local_is(h, n.last(), ".", n.first()),
    },
    Pattern {
        label: "Contains First+Last",
        shape: |n, h| ordered_within(&h.normalized, n.first(), n.last()),
    },
    Pattern {
        label: "Contains Last+First",
        shape: |n, h| ordered_within(&h.normalized, n.last(), n.first()),
    },
];

/// First catalog entry that fires for this handle.
pub fn first_match(names: &NameTokens, handle: &HandleForms) -> Option<&'static Pattern> {
    CATALOG.iter().find(|pattern| pattern.matches(names, handle))
}
