//! # Store Module
//!
//! Contracts for the credential store and the roster document store, plus
//! in-memory implementations that can be loaded from and saved to JSON files.

use crate::error::StoreError;
use crate::model::{
    Identity, IdentityId, IdentityPage, IdentityUpdate, RecordId, RecordUpdate, RosterRecord,
};
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

/// Credential-store operations the engine relies on.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// One page of identities. `page_token` is the token returned with the
    /// previous page, or `None` for the first page.
    async fn list_identities(
        &self,
        page_size: usize,
        page_token: Option<&str>,
    ) -> Result<IdentityPage, StoreError>;

    async fn get_identity(&self, id: &IdentityId) -> Result<Identity, StoreError>;

    async fn update_identity(
        &self,
        id: &IdentityId,
        update: IdentityUpdate,
    ) -> Result<Identity, StoreError>;

    /// Bulk delete. Returns how many identities were removed; unknown ids are
    /// ignored.
    async fn delete_identities(&self, ids: &[IdentityId]) -> Result<usize, StoreError>;
}

/// Document-store operations the engine relies on.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn list_records(&self, collection: &str) -> Result<Vec<RosterRecord>, StoreError>;

    async fn update_record(
        &self,
        collection: &str,
        id: &RecordId,
        update: RecordUpdate,
    ) -> Result<(), StoreError>;
}

/// Drain every page of a credential store listing.
pub async fn list_all_identities(
    store: &dyn CredentialStore,
    page_size: usize,
) -> Result<Vec<Identity>, StoreError> {
    let mut identities = Vec::new();
    let mut token: Option<String> = None;
    loop {
        let page = store
            .list_identities(page_size.max(1), token.as_deref())
            .await?;
        identities.extend(page.identities);
        match page.next_page_token {
            Some(next) => token = Some(next),
            None => break,
        }
    }
    Ok(identities)
}

/// Counters for successful writes, used to verify idempotent re-runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteCounts {
    pub updates: usize,
    pub deletes: usize,
}

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>, StoreError> {
    mutex
        .lock()
        .map_err(|_| StoreError::Unavailable("store lock poisoned".to_string()))
}

#[derive(Debug, Default)]
struct CredentialState {
    identities: BTreeMap<IdentityId, Identity>,
    writes: WriteCounts,
}

/// In-memory credential store. Listing order is by identity id.
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    state: Mutex<CredentialState>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_identities(identities: Vec<Identity>) -> Self {
        let identities = identities
            .into_iter()
            .map(|identity| (identity.id.clone(), identity))
            .collect();
        Self {
            state: Mutex::new(CredentialState {
                identities,
                writes: WriteCounts::default(),
            }),
        }
    }

    /// Load identities from a JSON array.
    pub fn load_json(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading identities from {}", path.display()))?;
        let identities: Vec<Identity> = serde_json::from_str(&raw)
            .with_context(|| format!("parsing identities in {}", path.display()))?;
        Ok(Self::with_identities(identities))
    }

    pub fn save_json(&self, path: &Path) -> Result<()> {
        let identities = self.identities()?;
        let raw = serde_json::to_string_pretty(&identities)?;
        std::fs::write(path, raw).with_context(|| format!("writing {}", path.display()))?;
        Ok(())
    }

    pub fn identities(&self) -> Result<Vec<Identity>, StoreError> {
        Ok(lock(&self.state)?.identities.values().cloned().collect())
    }

    pub fn len(&self) -> usize {
        lock(&self.state).map(|state| state.identities.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn writes(&self) -> WriteCounts {
        lock(&self.state).map(|state| state.writes).unwrap_or_default()
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn list_identities(
        &self,
        page_size: usize,
        page_token: Option<&str>,
    ) -> Result<IdentityPage, StoreError> {
        let state = lock(&self.state)?;
        let remaining: Vec<&Identity> = match page_token {
            Some(token) => {
                let after = IdentityId::new(token);
                if !state.identities.contains_key(&after) {
                    return Err(StoreError::InvalidPageToken(token.to_string()));
                }
                state
                    .identities
                    .range(after..)
                    .skip(1)
                    .map(|(_, identity)| identity)
                    .collect()
            }
            None => state.identities.values().collect(),
        };
        let identities: Vec<Identity> = remaining.iter().take(page_size).map(|i| (*i).clone()).collect();
        let next_page_token = if remaining.len() > page_size {
            identities.last().map(|identity| identity.id.to_string())
        } else {
            None
        };
        Ok(IdentityPage {
            identities,
            next_page_token,
        })
    }

    async fn get_identity(&self, id: &IdentityId) -> Result<Identity, StoreError> {
        lock(&self.state)?
            .identities
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::IdentityNotFound(id.clone()))
    }

    async fn update_identity(
        &self,
        id: &IdentityId,
        update: IdentityUpdate,
    ) -> Result<Identity, StoreError> {
        let mut state = lock(&self.state)?;
        if !state.identities.contains_key(id) {
            return Err(StoreError::IdentityNotFound(id.clone()));
        }
        if let Some(handle) = &update.handle {
            let owner = state
                .identities
                .values()
                .find(|other| &other.id != id && other.handle.as_deref() == Some(handle.as_str()));
            if let Some(owner) = owner {
                return Err(StoreError::HandleConflict {
                    handle: handle.clone(),
                    owner: owner.id.clone(),
                });
            }
        }
        state.writes.updates += 1;
        let identity = state
            .identities
            .get_mut(id)
            .ok_or_else(|| StoreError::IdentityNotFound(id.clone()))?;
        if let Some(handle) = update.handle {
            identity.handle = Some(handle);
        }
        Ok(identity.clone())
    }

    async fn delete_identities(&self, ids: &[IdentityId]) -> Result<usize, StoreError> {
        let mut state = lock(&self.state)?;
        let removed = ids
            .iter()
            .filter(|id| state.identities.remove(*id).is_some())
            .count();
        state.writes.deletes += removed;
        Ok(removed)
    }
}

#[derive(Debug, Default)]
struct DocumentState {
    collections: HashMap<String, BTreeMap<RecordId, RosterRecord>>,
    writes: WriteCounts,
}

/// In-memory document store. Records list in storage-id order.
#[derive(Debug, Default)]
pub struct MemoryDocumentStore {
    state: Mutex<DocumentState>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(collection: &str, records: Vec<RosterRecord>) -> Self {
        let store = Self::new();
        store.insert_collection(collection, records);
        store
    }

    fn insert_collection(&self, collection: &str, records: Vec<RosterRecord>) {
        if let Ok(mut state) = lock(&self.state) {
            let entries = state.collections.entry(collection.to_string()).or_default();
            for record in records {
                entries.insert(record.id.clone(), record);
            }
        }
    }

    /// Load collections from a JSON object mapping collection name to an
    /// array of records.
    pub fn load_json(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading roster from {}", path.display()))?;
        let collections: BTreeMap<String, Vec<RosterRecord>> = serde_json::from_str(&raw)
            .with_context(|| format!("parsing roster in {}", path.display()))?;
        let store = Self::new();
        for (collection, records) in collections {
            store.insert_collection(&collection, records);
        }
        Ok(store)
    }

    pub fn save_json(&self, path: &Path) -> Result<()> {
        let state = lock(&self.state)?;
        let collections: BTreeMap<&str, Vec<&RosterRecord>> = state
            .collections
            .iter()
            .map(|(name, records)| (name.as_str(), records.values().collect()))
            .collect();
        let raw = serde_json::to_string_pretty(&collections)?;
        std::fs::write(path, raw).with_context(|| format!("writing {}", path.display()))?;
        Ok(())
    }

    pub fn get(&self, collection: &str, id: &RecordId) -> Option<RosterRecord> {
        lock(&self.state)
            .ok()?
            .collections
            .get(collection)?
            .get(id)
            .cloned()
    }

    pub fn writes(&self) -> WriteCounts {
        lock(&self.state).map(|state| state.writes).unwrap_or_default()
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn list_records(&self, collection: &str) -> Result<Vec<RosterRecord>, StoreError> {
        Ok(lock(&self.state)?
            .collections
            .get(collection)
            .map(|records| records.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn update_record(
        &self,
        collection: &str,
        id: &RecordId,
        update: RecordUpdate,
    ) -> Result<(), StoreError> {
        let mut state = lock(&self.state)?;
        let record = state
            .collections
            .get_mut(collection)
            .and_then(|records| records.get_mut(id))
            .ok_or_else(|| StoreError::RecordNotFound {
                collection: collection.to_string(),
                id: id.clone(),
            })?;
        if let Some(identity) = update.linked_identity {
            record.linked_identity = Some(identity);
        }
        state.writes.updates += 1;
        Ok(())
    }
}
