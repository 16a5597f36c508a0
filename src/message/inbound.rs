//! Inbound client payload decoding and validation

use serde::Deserialize;

use crate::error::{DecodeError, ValidationError};

use super::record::{MessageDraft, DEFAULT_KIND};

/// A chat message as sent by a client
///
/// `conversation_id` is informational only. The authoritative conversation
/// is the one the connection was opened for.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct InboundMessage {
    #[serde(default)]
    pub conversation_id: Option<String>,
    pub content: String,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
}

impl InboundMessage {
    /// Decode a text frame
    pub fn from_text(text: &str) -> Result<Self, DecodeError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Decode a binary frame carrying UTF-8 JSON
    pub fn from_binary(data: &[u8]) -> Result<Self, DecodeError> {
        let text = std::str::from_utf8(data).map_err(|_| DecodeError::InvalidUtf8)?;
        Self::from_text(text)
    }

    /// Check the content against the configured limit
    pub fn validate(&self, max_content_len: usize) -> Result<(), ValidationError> {
        if self.content.trim().is_empty() {
            return Err(ValidationError::EmptyContent);
        }

        let len = self.content.chars().count();
        if max_content_len > 0 && len > max_content_len {
            return Err(ValidationError::ContentTooLong {
                len,
                max: max_content_len,
            });
        }

        Ok(())
    }

    /// Build a draft bound to the connection's conversation and identity
    pub fn into_draft(self, conversation_id: &str, sender_id: &str) -> MessageDraft {
        let kind = self
            .kind
            .filter(|k| !k.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_KIND.to_string());

        MessageDraft::new(conversation_id, sender_id, self.content).kind(kind)
    }
}
