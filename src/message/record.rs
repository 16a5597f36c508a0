//! Persisted message record

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Message type tag used when the sender does not supply one
pub const DEFAULT_KIND: &str = "text";

/// A chat message as stored and as broadcast to conversation members
///
/// Immutable once persisted except for `is_saved`, which only ever goes
/// from `false` to `true`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRecord {
    pub id: Uuid,
    pub conversation_id: String,
    pub sender_id: String,
    pub content: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub is_saved: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MessageRecord {
    /// Serialize into the outbound wire payload
    ///
    /// The returned buffer is reference counted, so one serialization is
    /// shared by every recipient of a broadcast.
    pub fn to_payload(&self) -> Result<Bytes, serde_json::Error> {
        serde_json::to_vec(self).map(Bytes::from)
    }

    /// Whether the retention sweep may delete this record at `cutoff`
    pub fn is_expired(&self, cutoff: DateTime<Utc>) -> bool {
        !self.is_saved && self.created_at < cutoff
    }
}

/// A message that has not been persisted yet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageDraft {
    pub id: Option<Uuid>,
    pub conversation_id: String,
    pub sender_id: String,
    pub content: String,
    pub kind: String,
    pub is_saved: bool,
    pub created_at: Option<DateTime<Utc>>,
}

impl MessageDraft {
    /// Create an unsaved text message draft
    pub fn new(
        conversation_id: impl Into<String>,
        sender_id: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id: None,
            conversation_id: conversation_id.into(),
            sender_id: sender_id.into(),
            content: content.into(),
            kind: DEFAULT_KIND.to_string(),
            is_saved: false,
            created_at: None,
        }
    }

    /// Set the message type tag
    pub fn kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = kind.into();
        self
    }

    /// Mark the draft as saved (exempt from retention)
    pub fn saved(mut self) -> Self {
        self.is_saved = true;
        self
    }

    /// Use an explicit creation time instead of the persistence time
    pub fn created_at(mut self, at: DateTime<Utc>) -> Self {
        self.created_at = Some(at);
        self
    }

    /// Fill in the store-assigned fields
    pub(crate) fn into_record(self, now: DateTime<Utc>) -> MessageRecord {
        let created_at = self.created_at.unwrap_or(now);
        MessageRecord {
            id: self.id.unwrap_or_else(Uuid::new_v4),
            conversation_id: self.conversation_id,
            sender_id: self.sender_id,
            content: self.content,
            kind: self.kind,
            is_saved: self.is_saved,
            created_at,
            updated_at: created_at,
        }
    }
}
