//! Error types for store calls, run-level failures, and per-record issues.

use crate::model::{IdentityId, RecordId};
use std::fmt;
use thiserror::Error;

/// Failure reported by a credential or document store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("identity not found: {0}")]
    IdentityNotFound(IdentityId),
    #[error("record not found: {collection}/{id}")]
    RecordNotFound { collection: String, id: RecordId },
    #[error("handle {handle} already belongs to identity {owner}")]
    HandleConflict { handle: String, owner: IdentityId },
    #[error("invalid page token: {0}")]
    InvalidPageToken(String),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Run-level failure. Anything here aborts the run before or instead of
/// per-record processing.
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("credential snapshot unavailable: {0}")]
    SnapshotUnavailable(#[source] StoreError),
    #[error("roster records unavailable for collection {collection}: {source}")]
    RecordsUnavailable {
        collection: String,
        #[source]
        source: StoreError,
    },
}

/// Which boundary update failed for a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UpdateStage {
    /// Reading or rewriting the identity's handle.
    Handle,
    /// Setting the record's linkage field.
    Link,
}

impl fmt::Display for UpdateStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UpdateStage::Handle => f.write_str("handle update"),
            UpdateStage::Link => f.write_str("link update"),
        }
    }
}

/// A per-record problem. Recorded in the run summary; never aborts the run.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecordIssue {
    #[error("{record}: skipped, missing given or family name")]
    RecordSkipped { record: RecordId },
    #[error("{record} ({name}): no matching identity found")]
    NoMatchFound { record: RecordId, name: String },
    #[error("{record} ({name}): {stage} failed for {identity}: {source}")]
    UpdateFailed {
        record: RecordId,
        name: String,
        identity: IdentityId,
        stage: UpdateStage,
        #[source]
        source: StoreError,
    },
}

impl RecordIssue {
    pub fn record(&self) -> &RecordId {
        match self {
            RecordIssue::RecordSkipped { record }
            | RecordIssue::NoMatchFound { record, .. }
            | RecordIssue::UpdateFailed { record, .. } => record,
        }
    }
}
