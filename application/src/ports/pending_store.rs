//! Persistence gateway port
//!
//! While a cycle is collecting, each adapter keeps per-person records of the
//! channel handles it needs to finish gathering (message ids, poll ids, the
//! batch's dates). Those records are the only state that must survive a
//! process restart: without them a person's in-flight prompts cannot be
//! re-read and they degrade to "unknown" for the cycle.
//!
//! Records are scoped by the owner name (stable across restarts) so that
//! concurrent managers, or a restarted process, never observe another
//! owner's records.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;
use thiserror::Error;

/// Errors from the pending-request store.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Store I/O failed: {0}")]
    Io(String),

    #[error("Record (de)serialization failed: {0}")]
    Serde(String),
}

/// One in-flight prompt batch for one person.
///
/// `payload` carries the channel-specific handles; its shape is private to
/// the adapter that wrote the record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingRequest {
    /// Stable manager name scoping this record
    pub owner: String,
    /// Sequence number of the owning cycle (informational after a restart)
    pub cycle: u64,
    /// Person the batch was sent to
    pub person: String,
    /// Position of this batch within the person's prompt sequence
    pub batch_index: u32,
    /// Channel that wrote the record
    pub channel: String,
    /// Channel-specific handles needed to finish gathering
    pub payload: serde_json::Value,
}

impl PendingRequest {
    /// Identity for deletion: everything except the payload.
    pub fn same_identity(&self, other: &Self) -> bool {
        self.owner == other.owner
            && self.cycle == other.cycle
            && self.person == other.person
            && self.batch_index == other.batch_index
            && self.channel == other.channel
    }
}

/// Keyed durable record store consumed by channel adapters.
#[async_trait]
pub trait PendingStore: Send + Sync {
    /// Persist one record.
    async fn save(&self, record: PendingRequest) -> Result<(), StoreError>;

    /// All records for one person under an owner, sorted by batch index.
    async fn find(&self, owner: &str, person: &str) -> Result<Vec<PendingRequest>, StoreError>;

    /// All records under an owner, sorted by (person, batch index).
    async fn find_all(&self, owner: &str) -> Result<Vec<PendingRequest>, StoreError>;

    /// Delete one record by identity. Deleting an absent record is not an
    /// error (gather must stay idempotent).
    async fn delete(&self, record: &PendingRequest) -> Result<(), StoreError>;
}

/// In-process store with no durability.
///
/// Used by tests and by deployments that opt out of persistence, the
/// trade-off being that a restart mid-cycle loses the channel handles and
/// everyone still pending becomes "unknown".
#[derive(Debug, Default)]
pub struct MemoryPendingStore {
    records: Mutex<HashMap<String, Vec<PendingRequest>>>,
}

impl MemoryPendingStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PendingStore for MemoryPendingStore {
    async fn save(&self, record: PendingRequest) -> Result<(), StoreError> {
        let mut records = self.records.lock().expect("pending store lock");
        records.entry(record.owner.clone()).or_default().push(record);
        Ok(())
    }

    async fn find(&self, owner: &str, person: &str) -> Result<Vec<PendingRequest>, StoreError> {
        let records = self.records.lock().expect("pending store lock");
        let mut found: Vec<PendingRequest> = records
            .get(owner)
            .map(|rs| rs.iter().filter(|r| r.person == person).cloned().collect())
            .unwrap_or_default();
        found.sort_by_key(|r| r.batch_index);
        Ok(found)
    }

    async fn find_all(&self, owner: &str) -> Result<Vec<PendingRequest>, StoreError> {
        let records = self.records.lock().expect("pending store lock");
        let mut found: Vec<PendingRequest> = records.get(owner).cloned().unwrap_or_default();
        found.sort_by(|a, b| (&a.person, a.batch_index).cmp(&(&b.person, b.batch_index)));
        Ok(found)
    }

    async fn delete(&self, record: &PendingRequest) -> Result<(), StoreError> {
        let mut records = self.records.lock().expect("pending store lock");
        if let Some(rs) = records.get_mut(&record.owner) {
            rs.retain(|r| !r.same_identity(record));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(person: &str, batch: u32) -> PendingRequest {
        PendingRequest {
            owner: "group".to_string(),
            cycle: 1,
            person: person.to_string(),
            batch_index: batch,
            channel: "discord".to_string(),
            payload: serde_json::json!({"message_id": batch}),
        }
    }

    #[tokio::test]
    async fn test_find_returns_batches_in_order() {
        let store = MemoryPendingStore::new();
        store.save(record("alice", 1)).await.unwrap();
        store.save(record("alice", 0)).await.unwrap();
        store.save(record("bob", 0)).await.unwrap();

        let found = store.find("group", "alice").await.unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].batch_index, 0);
        assert_eq!(found[1].batch_index, 1);
    }

    #[tokio::test]
    async fn test_owner_scoping() {
        let store = MemoryPendingStore::new();
        store.save(record("alice", 0)).await.unwrap();

        let mut other = record("alice", 0);
        other.owner = "other-group".to_string();
        store.save(other).await.unwrap();

        assert_eq!(store.find_all("group").await.unwrap().len(), 1);
        assert_eq!(store.find_all("other-group").await.unwrap().len(), 1);
        assert!(store.find_all("third").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let store = MemoryPendingStore::new();
        let r = record("alice", 0);
        store.save(r.clone()).await.unwrap();

        store.delete(&r).await.unwrap();
        store.delete(&r).await.unwrap();
        assert!(store.find("group", "alice").await.unwrap().is_empty());
    }
}
