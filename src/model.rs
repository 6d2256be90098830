//! # Data Model
//!
//! Identities from the credential store, roster records from the document
//! store, and the update requests the engine sends back to each of them.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique identifier of an identity in the credential store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdentityId(pub String);

impl IdentityId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IdentityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Storage identifier assigned by the document store when a record is created.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(pub String);

impl RecordId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A credential-store entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub id: IdentityId,
    /// Login handle, usually an email address. Unique within the store.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handle: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default)]
    pub verified: bool,
    #[serde(default)]
    pub disabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

impl Identity {
    pub fn new(id: impl Into<String>, handle: impl Into<String>) -> Self {
        Self {
            id: IdentityId::new(id),
            handle: Some(handle.into()),
            display_name: None,
            verified: false,
            disabled: false,
            created_at: None,
        }
    }

    pub fn handle(&self) -> Option<&str> {
        self.handle.as_deref()
    }
}

/// A document-store entry describing a person on the roster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RosterRecord {
    pub id: RecordId,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub middle_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suffix: Option<String>,
    /// Handle stored on the document itself. Informational only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Linkage field: the matched identity's id once reconciliation succeeds.
    #[serde(default, rename = "uid", skip_serializing_if = "Option::is_none")]
    pub linked_identity: Option<IdentityId>,
}

impl RosterRecord {
    pub fn new(
        id: impl Into<String>,
        first_name: impl Into<String>,
        last_name: impl Into<String>,
    ) -> Self {
        Self {
            id: RecordId::new(id),
            first_name: first_name.into(),
            last_name: last_name.into(),
            middle_name: None,
            suffix: None,
            email: None,
            linked_identity: None,
        }
    }

    pub fn with_link(mut self, identity: IdentityId) -> Self {
        self.linked_identity = Some(identity);
        self
    }

    pub fn is_linked(&self) -> bool {
        self.linked_identity.is_some()
    }

    /// Both given and family name are present and non-blank.
    pub fn has_names(&self) -> bool {
        !self.first_name.trim().is_empty() && !self.last_name.trim().is_empty()
    }

    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

impl fmt::Display for RosterRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} ({})", self.first_name, self.last_name, self.id)
    }
}

/// One page of a paginated identity listing.
#[derive(Debug, Clone, Default)]
pub struct IdentityPage {
    pub identities: Vec<Identity>,
    pub next_page_token: Option<String>,
}

/// Requested change to an identity. `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdentityUpdate {
    pub handle: Option<String>,
}

impl IdentityUpdate {
    pub fn handle(handle: impl Into<String>) -> Self {
        Self {
            handle: Some(handle.into()),
        }
    }
}

/// Requested change to a roster record. `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordUpdate {
    pub linked_identity: Option<IdentityId>,
}

impl RecordUpdate {
    pub fn link(identity: IdentityId) -> Self {
        Self {
            linked_identity: Some(identity),
        }
    }
}
