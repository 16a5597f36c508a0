//! In-memory message store

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{retention_cutoff, MessageStore};
use crate::error::StorageError;
use crate::message::{MessageDraft, MessageRecord};

/// Process-local store with the same semantics as [`super::SqliteStore`]
///
/// Contents are lost on restart.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: RwLock<HashMap<Uuid, MessageRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    /// Look up a record by id
    pub async fn get(&self, id: Uuid) -> Option<MessageRecord> {
        self.records.read().await.get(&id).cloned()
    }
}

impl MessageStore for MemoryStore {
    async fn persist(&self, draft: MessageDraft) -> Result<MessageRecord, StorageError> {
        let record = draft.into_record(Utc::now());
        match self.records.write().await.entry(record.id) {
            Entry::Occupied(_) => Err(StorageError::Duplicate(record.id)),
            Entry::Vacant(slot) => {
                slot.insert(record.clone());
                Ok(record)
            }
        }
    }

    async fn delete_expired_unsaved(&self, max_age: Duration) -> Result<u64, StorageError> {
        let cutoff = retention_cutoff(Utc::now(), max_age);

        // Single write lock: inserts cannot interleave with the scan
        let mut records = self.records.write().await;
        let before = records.len();
        records.retain(|_, record| !record.is_expired(cutoff));

        Ok((before - records.len()) as u64)
    }

    async fn mark_saved(&self, id: Uuid) -> Result<bool, StorageError> {
        let mut records = self.records.write().await;
        match records.get_mut(&id) {
            Some(record) => {
                if !record.is_saved {
                    record.is_saved = true;
                    record.updated_at = Utc::now();
                }
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn conversation_messages(
        &self,
        conversation_id: &str,
        limit: usize,
    ) -> Result<Vec<MessageRecord>, StorageError> {
        let records = self.records.read().await;
        let mut messages: Vec<MessageRecord> = records
            .values()
            .filter(|r| r.conversation_id == conversation_id)
            .cloned()
            .collect();

        messages.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        let skip = messages.len().saturating_sub(limit);
        Ok(messages.split_off(skip))
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeDelta;

    use super::*;

    const DAY: Duration = Duration::from_secs(24 * 3600);

    #[tokio::test]
    async fn test_persist_assigns_identity() {
        let store = MemoryStore::new();

        let a = store.persist(MessageDraft::new("c1", "alice", "one")).await.unwrap();
        let b = store.persist(MessageDraft::new("c1", "alice", "two")).await.unwrap();

        assert_ne!(a.id, b.id);
        assert!(!a.is_saved);
        assert_eq!(store.get(a.id).await, Some(a));
        assert_eq!(store.len().await, 2);
    }

    #[tokio::test]
    async fn test_persist_existing_id_rejected() {
        let store = MemoryStore::new();
        let original = store
            .persist(MessageDraft::new("c1", "alice", "original"))
            .await
            .unwrap();
        assert!(store.mark_saved(original.id).await.unwrap());

        let mut replacement = MessageDraft::new("c1", "mallory", "replaced");
        replacement.id = Some(original.id);
        let err = store.persist(replacement).await.unwrap_err();

        assert!(matches!(err, StorageError::Duplicate(id) if id == original.id));
        let stored = store.get(original.id).await.unwrap();
        assert_eq!(stored.content, "original");
        assert_eq!(stored.sender_id, "alice");
        assert!(stored.is_saved);
    }

    #[tokio::test]
    async fn test_sweep_deletes_only_expired_unsaved() {
        let store = MemoryStore::new();
        let now = Utc::now();

        let old = store
            .persist(MessageDraft::new("c1", "a", "old").created_at(now - TimeDelta::hours(25)))
            .await
            .unwrap();
        let recent = store
            .persist(MessageDraft::new("c1", "a", "recent").created_at(now - TimeDelta::hours(1)))
            .await
            .unwrap();
        let kept = store
            .persist(
                MessageDraft::new("c1", "a", "kept")
                    .saved()
                    .created_at(now - TimeDelta::hours(72)),
            )
            .await
            .unwrap();

        assert_eq!(store.delete_expired_unsaved(DAY).await.unwrap(), 1);
        assert!(store.get(old.id).await.is_none());
        assert!(store.get(recent.id).await.is_some());
        assert!(store.get(kept.id).await.is_some());

        // Nothing new to delete on a second pass
        assert_eq!(store.delete_expired_unsaved(DAY).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_mark_saved_is_monotonic() {
        let store = MemoryStore::new();
        let record = store
            .persist(MessageDraft::new("c1", "a", "keep me").created_at(Utc::now() - TimeDelta::hours(30)))
            .await
            .unwrap();

        assert!(store.mark_saved(record.id).await.unwrap());
        assert!(store.mark_saved(record.id).await.unwrap());
        assert!(store.get(record.id).await.unwrap().is_saved);

        assert_eq!(store.delete_expired_unsaved(DAY).await.unwrap(), 0);
        assert!(!store.mark_saved(Uuid::new_v4()).await.unwrap());
    }

    #[tokio::test]
    async fn test_conversation_messages_ordered_and_limited() {
        let store = MemoryStore::new();
        let now = Utc::now();

        for i in 0..5 {
            store
                .persist(
                    MessageDraft::new("c1", "a", format!("m{i}"))
                        .created_at(now - TimeDelta::minutes(10 - i)),
                )
                .await
                .unwrap();
        }
        store.persist(MessageDraft::new("c2", "a", "other")).await.unwrap();

        let all = store.conversation_messages("c1", 50).await.unwrap();
        let contents: Vec<&str> = all.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, ["m0", "m1", "m2", "m3", "m4"]);

        let last_two = store.conversation_messages("c1", 2).await.unwrap();
        let contents: Vec<&str> = last_two.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, ["m3", "m4"]);
    }
}
