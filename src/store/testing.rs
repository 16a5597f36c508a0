//! Store doubles for unit tests

use std::time::Duration;

use uuid::Uuid;

use super::MessageStore;
use crate::error::StorageError;
use crate::message::{MessageDraft, MessageRecord};

/// Every write and delete fails
pub(crate) struct FailingStore;

impl MessageStore for FailingStore {
    async fn persist(&self, _draft: MessageDraft) -> Result<MessageRecord, StorageError> {
        Err(StorageError::Corrupt("disk unavailable".into()))
    }

    async fn delete_expired_unsaved(&self, _max_age: Duration) -> Result<u64, StorageError> {
        Err(StorageError::Corrupt("disk unavailable".into()))
    }

    async fn mark_saved(&self, _id: Uuid) -> Result<bool, StorageError> {
        Err(StorageError::Corrupt("disk unavailable".into()))
    }

    async fn conversation_messages(
        &self,
        _conversation_id: &str,
        _limit: usize,
    ) -> Result<Vec<MessageRecord>, StorageError> {
        Err(StorageError::Corrupt("disk unavailable".into()))
    }
}
