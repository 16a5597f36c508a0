//! Error types
//!
//! Each failure class has its own enum so callers can match on the class
//! (skip the frame, skip the broadcast, wait for the next sweep) without
//! inspecting messages.

use thiserror::Error;

/// Crate-wide result alias
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type
#[derive(Debug, Error)]
pub enum Error {
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid configuration: {0}")]
    Config(String),
}

/// Malformed inbound frame
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("invalid JSON payload: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("binary frame is not valid UTF-8")]
    InvalidUtf8,
}

/// Inbound message decoded but unacceptable
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("message content is empty")]
    EmptyContent,

    #[error("message content is {len} chars, limit is {max}")]
    ContentTooLong { len: usize, max: usize },
}

/// Persistence collaborator failure
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("storage task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("corrupt row: {0}")]
    Corrupt(String),

    /// A record with this id is already stored
    #[error("message {0} already exists")]
    Duplicate(uuid::Uuid),

    #[error("storage lock poisoned")]
    Poisoned,
}

/// Failure delivering to, or reading from, one connection
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The connection's writer has gone away
    #[error("connection closed")]
    Closed,

    /// The connection's outbound buffer is full (slow reader)
    #[error("outbound buffer full")]
    Full,

    #[error("receive failed: {0}")]
    Receive(String),
}
