//! # Rosterlink
//!
//! Reconciles a credential store of login identities with a roster of
//! officials held in a document store.
//!
//! Each unlinked roster record is matched to an identity through a ranked
//! catalog of handle shapes built from the person's given and family names,
//! with a guarded fallback keyed on the record's own storage id. Matched
//! identities get a canonical handle and the record gets a linkage field, so
//! a second run over the same data requests no further writes.

pub mod config;
pub mod error;
pub mod export;
pub mod index;
pub mod matcher;
pub mod model;
pub mod normalize;
pub mod patterns;
pub mod reconcile;
pub mod store;

// Re-export main types for convenience
pub use config::{ConfigError, ConfigOverrides, RosterConfig};
pub use error::{RecordIssue, ReconcileError, StoreError, UpdateStage};
pub use index::{HandleEntry, HandleIndex, HandleLookup};
pub use matcher::{match_by_identifier, match_by_name, FallbackRule, Match, MatchLabel, MatchResult, Matcher};
pub use model::{Identity, IdentityId, RecordId, RosterRecord};
pub use reconcile::{ReconcileOptions, ReconcileSummary, Reconciler, StopSignal};
pub use store::{CredentialStore, DocumentStore, MemoryCredentialStore, MemoryDocumentStore};
