//! Message persistence
//!
//! The fan-out core only needs a handful of operations from storage, so they
//! are expressed as the [`MessageStore`] trait. Two backends ship with the
//! crate:
//!
//! - [`SqliteStore`]: durable, single-file (or in-memory) SQLite database
//! - [`MemoryStore`]: process-local map, for ephemeral deployments and tests
//!
//! # Contract
//!
//! `persist` must return only after the record is durably written; the
//! ingestion pipeline broadcasts the returned record and nothing else.
//!
//! `delete_expired_unsaved` must be one atomic conditional delete, never a
//! read-then-delete loop, because it runs concurrently with inserts of new
//! unsaved messages.

pub mod memory;
pub mod sqlite;

#[cfg(test)]
pub(crate) mod testing;

use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use uuid::Uuid;

use crate::error::StorageError;
use crate::message::{MessageDraft, MessageRecord};

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// Storage operations the fan-out core depends on
pub trait MessageStore: Send + Sync + 'static {
    /// Write a draft, assigning id and timestamps if absent, and return the
    /// canonical stored record
    fn persist(
        &self,
        draft: MessageDraft,
    ) -> impl Future<Output = Result<MessageRecord, StorageError>> + Send;

    /// Delete every unsaved record created more than `max_age` ago
    ///
    /// Returns the number of deleted records.
    fn delete_expired_unsaved(
        &self,
        max_age: Duration,
    ) -> impl Future<Output = Result<u64, StorageError>> + Send;

    /// Flag a record as saved, exempting it from retention
    ///
    /// Returns `false` if no record has this id. Saving an already saved
    /// record succeeds without change.
    fn mark_saved(&self, id: Uuid) -> impl Future<Output = Result<bool, StorageError>> + Send;

    /// Most recent `limit` records of a conversation, oldest first
    fn conversation_messages(
        &self,
        conversation_id: &str,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<MessageRecord>, StorageError>> + Send;
}

/// Oldest creation time that survives a sweep with `max_age` at `now`
pub(crate) fn retention_cutoff(now: DateTime<Utc>, max_age: Duration) -> DateTime<Utc> {
    let age = TimeDelta::from_std(max_age).unwrap_or(TimeDelta::MAX);
    now.checked_sub_signed(age)
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}
