//! SQLite message store
//!
//! One `messages` table keyed by id, with an index on `conversation_id` for
//! history reads and one on `(is_saved, created_at)` for the retention
//! predicate. Timestamps are stored as Unix milliseconds, so records are
//! normalised to millisecond precision before they are returned.

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension};
use uuid::Uuid;

use super::{retention_cutoff, MessageStore};
use crate::error::StorageError;
use crate::message::{MessageDraft, MessageRecord};

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS messages (
        id              TEXT PRIMARY KEY,
        conversation_id TEXT NOT NULL,
        sender_id       TEXT NOT NULL,
        content         TEXT NOT NULL,
        kind            TEXT NOT NULL DEFAULT 'text',
        is_saved        INTEGER NOT NULL DEFAULT 0,
        created_at      INTEGER NOT NULL,
        updated_at      INTEGER NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_messages_conversation
        ON messages(conversation_id, created_at);

    CREATE INDEX IF NOT EXISTS idx_messages_retention
        ON messages(is_saved, created_at);
";

/// Durable store backed by SQLite
///
/// The connection is shared behind a mutex and every call runs on tokio's
/// blocking pool, so async callers are never stalled by disk I/O.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open or create the database at `path`
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        Self::init(conn)
    }

    /// Open a private in-memory database
    pub fn open_in_memory() -> Result<Self, StorageError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StorageError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Total number of stored records
    pub async fn count(&self) -> Result<u64, StorageError> {
        self.blocking(|conn| {
            let n: i64 = conn.query_row("SELECT COUNT(*) FROM messages", [], |row| row.get(0))?;
            Ok(n as u64)
        })
        .await
    }

    /// Look up a record by id
    pub async fn get(&self, id: Uuid) -> Result<Option<MessageRecord>, StorageError> {
        self.blocking(move |conn| {
            let row = conn
                .query_row(
                    "SELECT id, conversation_id, sender_id, content, kind, is_saved,
                            created_at, updated_at
                     FROM messages WHERE id = ?1",
                    params![id.to_string()],
                    MessageRow::from_row,
                )
                .optional()?;
            row.map(MessageRecord::try_from).transpose()
        })
        .await
    }

    async fn blocking<T, F>(&self, f: F) -> Result<T, StorageError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, StorageError> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().map_err(|_| StorageError::Poisoned)?;
            f(&conn)
        })
        .await?
    }
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore").finish_non_exhaustive()
    }
}

impl MessageStore for SqliteStore {
    async fn persist(&self, draft: MessageDraft) -> Result<MessageRecord, StorageError> {
        let record = normalise(draft.into_record(Utc::now()));
        let stored = record.clone();

        self.blocking(move |conn| {
            conn.execute(
                "INSERT INTO messages
                    (id, conversation_id, sender_id, content, kind, is_saved, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    stored.id.to_string(),
                    stored.conversation_id,
                    stored.sender_id,
                    stored.content,
                    stored.kind,
                    stored.is_saved,
                    stored.created_at.timestamp_millis(),
                    stored.updated_at.timestamp_millis(),
                ],
            )
            .map_err(|e| match e.sqlite_error_code() {
                Some(ErrorCode::ConstraintViolation) => StorageError::Duplicate(stored.id),
                _ => StorageError::from(e),
            })?;
            Ok(())
        })
        .await?;

        Ok(record)
    }

    async fn delete_expired_unsaved(&self, max_age: Duration) -> Result<u64, StorageError> {
        let cutoff = retention_cutoff(Utc::now(), max_age).timestamp_millis();

        self.blocking(move |conn| {
            let deleted = conn.execute(
                "DELETE FROM messages WHERE is_saved = 0 AND created_at < ?1",
                params![cutoff],
            )?;
            Ok(deleted as u64)
        })
        .await
    }

    async fn mark_saved(&self, id: Uuid) -> Result<bool, StorageError> {
        let now = Utc::now().timestamp_millis();

        self.blocking(move |conn| {
            let id = id.to_string();
            let updated = conn.execute(
                "UPDATE messages SET is_saved = 1, updated_at = ?2
                 WHERE id = ?1 AND is_saved = 0",
                params![id, now],
            )?;
            if updated > 0 {
                return Ok(true);
            }

            // Either unknown or already saved
            let exists = conn
                .query_row("SELECT 1 FROM messages WHERE id = ?1", params![id], |_| Ok(()))
                .optional()?;
            Ok(exists.is_some())
        })
        .await
    }

    async fn conversation_messages(
        &self,
        conversation_id: &str,
        limit: usize,
    ) -> Result<Vec<MessageRecord>, StorageError> {
        let conversation_id = conversation_id.to_string();
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);

        self.blocking(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, conversation_id, sender_id, content, kind, is_saved,
                        created_at, updated_at
                 FROM messages
                 WHERE conversation_id = ?1
                 ORDER BY created_at DESC, id DESC
                 LIMIT ?2",
            )?;
            let rows = stmt
                .query_map(params![conversation_id, limit], MessageRow::from_row)?
                .collect::<Result<Vec<_>, _>>()?;

            let mut messages = rows
                .into_iter()
                .map(MessageRecord::try_from)
                .collect::<Result<Vec<_>, _>>()?;
            messages.reverse();
            Ok(messages)
        })
        .await
    }
}

/// Truncate timestamps to what the table can represent
fn normalise(mut record: MessageRecord) -> MessageRecord {
    record.created_at = truncate_millis(record.created_at);
    record.updated_at = truncate_millis(record.updated_at);
    record
}

fn truncate_millis(at: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(at.timestamp_millis()).unwrap_or(at)
}

/// Raw column values of one `messages` row
struct MessageRow {
    id: String,
    conversation_id: String,
    sender_id: String,
    content: String,
    kind: String,
    is_saved: bool,
    created_at: i64,
    updated_at: i64,
}

impl MessageRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            conversation_id: row.get(1)?,
            sender_id: row.get(2)?,
            content: row.get(3)?,
            kind: row.get(4)?,
            is_saved: row.get(5)?,
            created_at: row.get(6)?,
            updated_at: row.get(7)?,
        })
    }
}

impl TryFrom<MessageRow> for MessageRecord {
    type Error = StorageError;

    fn try_from(row: MessageRow) -> Result<Self, Self::Error> {
        let id = Uuid::parse_str(&row.id)
            .map_err(|e| StorageError::Corrupt(format!("id {:?}: {}", row.id, e)))?;
        let created_at = DateTime::from_timestamp_millis(row.created_at)
            .ok_or_else(|| StorageError::Corrupt(format!("created_at {}", row.created_at)))?;
        let updated_at = DateTime::from_timestamp_millis(row.updated_at)
            .ok_or_else(|| StorageError::Corrupt(format!("updated_at {}", row.updated_at)))?;

        Ok(MessageRecord {
            id,
            conversation_id: row.conversation_id,
            sender_id: row.sender_id,
            content: row.content,
            kind: row.kind,
            is_saved: row.is_saved,
            created_at,
            updated_at,
        })
    }
}
