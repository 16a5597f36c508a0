//! Connection handles
//!
//! A handle binds one live transport to the caller identity and the
//! conversation it was opened for. Outbound frames go through a bounded
//! queue drained by the single writer task that owns the transport's write
//! half, so sending never blocks the registry and never races the reader.

use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use tokio::sync::mpsc;

use crate::error::TransportError;

static NEXT_HANDLE_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of a connection handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandleId(u64);

impl HandleId {
    fn next() -> Self {
        Self(NEXT_HANDLE_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for HandleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One accepted connection, as seen by the registry
///
/// Clones share the same id and outbound queue. Equality is by id only: the
/// same user may hold several connections to one conversation.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    id: HandleId,
    user_id: String,
    conversation_id: String,
    outbound: mpsc::Sender<Bytes>,
}

impl ConnectionHandle {
    /// Create a handle and the receiving end of its outbound queue
    ///
    /// The receiver belongs to whatever writes to the transport. Once every
    /// clone of the handle is dropped the receiver yields `None`, which is the
    /// writer's signal to close the transport.
    pub fn new(
        user_id: impl Into<String>,
        conversation_id: impl Into<String>,
        outbound_capacity: usize,
    ) -> (Self, mpsc::Receiver<Bytes>) {
        let (tx, rx) = mpsc::channel(outbound_capacity.max(1));

        let handle = Self {
            id: HandleId::next(),
            user_id: user_id.into(),
            conversation_id: conversation_id.into(),
            outbound: tx,
        };

        (handle, rx)
    }

    pub fn id(&self) -> HandleId {
        self.id
    }

    /// Authenticated identity of the caller
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn conversation_id(&self) -> &str {
        &self.conversation_id
    }

    /// Queue a payload for the transport without waiting
    pub fn send(&self, payload: Bytes) -> Result<(), TransportError> {
        self.outbound.try_send(payload).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => TransportError::Full,
            mpsc::error::TrySendError::Closed(_) => TransportError::Closed,
        })
    }

    /// Whether the writer side has gone away
    pub fn is_closed(&self) -> bool {
        self.outbound.is_closed()
    }
}

impl PartialEq for ConnectionHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ConnectionHandle {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_unique() {
        let (a, _rx_a) = ConnectionHandle::new("alice", "c1", 4);
        let (b, _rx_b) = ConnectionHandle::new("alice", "c1", 4);

        assert_ne!(a.id(), b.id());
        assert_ne!(a, b);
        assert_eq!(a, a.clone());
    }

    #[tokio::test]
    async fn test_send_reaches_receiver() {
        let (handle, mut rx) = ConnectionHandle::new("alice", "c1", 4);

        handle.send(Bytes::from_static(b"hello")).unwrap();
        assert_eq!(rx.recv().await.unwrap(), Bytes::from_static(b"hello"));
    }

    #[test]
    fn test_send_full() {
        let (handle, _rx) = ConnectionHandle::new("alice", "c1", 1);

        handle.send(Bytes::from_static(b"1")).unwrap();
        assert_eq!(handle.send(Bytes::from_static(b"2")), Err(TransportError::Full));
    }

    #[test]
    fn test_send_closed() {
        let (handle, rx) = ConnectionHandle::new("alice", "c1", 4);
        drop(rx);

        assert!(handle.is_closed());
        assert_eq!(handle.send(Bytes::from_static(b"x")), Err(TransportError::Closed));
    }

    #[test]
    fn test_zero_capacity_is_clamped() {
        let (handle, _rx) = ConnectionHandle::new("alice", "c1", 0);
        assert!(handle.send(Bytes::from_static(b"x")).is_ok());
    }
}
