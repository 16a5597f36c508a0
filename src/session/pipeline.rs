//! Ingestion pipeline
//!
//! Per frame: decode, validate, persist, then broadcast the persisted record.
//! Decode and validation failures skip the frame. A persistence failure skips
//! the broadcast for that frame. Neither ends the connection.

use std::sync::Arc;

use futures::{Stream, StreamExt};
use tokio::sync::watch;

use super::frame::InboundFrame;
use super::state::{CloseReason, SessionSummary};
use crate::error::{Error, TransportError};
use crate::message::InboundMessage;
use crate::registry::{ConnectionHandle, FanoutRegistry, HandleId};
use crate::stats::FanoutStats;
use crate::store::MessageStore;

/// Default upper bound on message content, in characters
pub const DEFAULT_MAX_CONTENT_LEN: usize = 4096;

/// Read loop for one connection
pub struct IngestSession<S> {
    handle: ConnectionHandle,
    registry: FanoutRegistry,
    store: Arc<S>,
    stats: Arc<FanoutStats>,
    max_content_len: usize,
    shutdown: Option<watch::Receiver<bool>>,
}

impl<S: MessageStore> IngestSession<S> {
    pub fn new(
        handle: ConnectionHandle,
        registry: FanoutRegistry,
        store: Arc<S>,
        stats: Arc<FanoutStats>,
    ) -> Self {
        Self {
            handle,
            registry,
            store,
            stats,
            max_content_len: DEFAULT_MAX_CONTENT_LEN,
            shutdown: None,
        }
    }

    /// Set the content length limit (0 = unlimited)
    pub fn max_content_len(mut self, max: usize) -> Self {
        self.max_content_len = max;
        self
    }

    /// End the session when `shutdown` flips to `true`
    pub fn with_shutdown(mut self, shutdown: watch::Receiver<bool>) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    /// Register the handle and process `frames` until the connection ends
    ///
    /// The handle is unregistered on every exit path, including the future
    /// being dropped mid-loop.
    pub async fn run<F>(mut self, mut frames: F) -> SessionSummary
    where
        F: Stream<Item = Result<InboundFrame, TransportError>> + Unpin,
    {
        let registration = Registration::new(&self.registry, &self.handle, &self.stats);

        tracing::info!(
            conversation = self.handle.conversation_id(),
            handle_id = %self.handle.id(),
            user = self.handle.user_id(),
            "Session started"
        );

        let mut summary = SessionSummary::new();
        let mut shutdown = self.shutdown.take();

        summary.close_reason = loop {
            let next = tokio::select! {
                biased;
                _ = wait_for_shutdown(&mut shutdown) => break CloseReason::Shutdown,
                next = frames.next() => next,
            };

            match next {
                None => break CloseReason::EndOfStream,
                Some(Err(e)) => {
                    tracing::debug!(
                        handle_id = %self.handle.id(),
                        error = %e,
                        "Read failed"
                    );
                    break CloseReason::ReadError;
                }
                Some(Ok(InboundFrame::Close)) => break CloseReason::ClientClosed,
                Some(Ok(InboundFrame::Ping)) => {}
                Some(Ok(InboundFrame::Text(text))) => {
                    let decoded = InboundMessage::from_text(&text).map_err(Error::from);
                    self.ingest(decoded, &mut summary).await;
                }
                Some(Ok(InboundFrame::Binary(data))) => {
                    let decoded = InboundMessage::from_binary(&data).map_err(Error::from);
                    self.ingest(decoded, &mut summary).await;
                }
            }
        };

        drop(registration);
        tracing::info!(
            conversation = self.handle.conversation_id(),
            handle_id = %self.handle.id(),
            reason = ?summary.close_reason,
            accepted = summary.accepted,
            rejected = summary.rejected,
            failed = summary.failed,
            duration_ms = summary.duration().as_millis() as u64,
            "Session ended"
        );

        summary
    }

    async fn ingest(&self, decoded: Result<InboundMessage, Error>, summary: &mut SessionSummary) {
        let inbound = match decoded.and_then(|m| {
            m.validate(self.max_content_len)?;
            Ok(m)
        }) {
            Ok(inbound) => inbound,
            Err(e) => {
                summary.rejected += 1;
                self.stats.frame_rejected();
                tracing::debug!(handle_id = %self.handle.id(), error = %e, "Frame rejected");
                return;
            }
        };

        let conversation_id = self.handle.conversation_id();
        if let Some(claimed) = inbound.conversation_id.as_deref() {
            if claimed != conversation_id {
                tracing::debug!(
                    handle_id = %self.handle.id(),
                    conversation = conversation_id,
                    claimed = claimed,
                    "Ignoring payload conversation id"
                );
            }
        }

        let draft = inbound.into_draft(conversation_id, self.handle.user_id());
        let record = match self.store.persist(draft).await {
            Ok(record) => record,
            Err(e) => {
                summary.failed += 1;
                self.stats.persist_failed();
                tracing::error!(
                    conversation = conversation_id,
                    handle_id = %self.handle.id(),
                    error = %e,
                    "Failed to persist message"
                );
                return;
            }
        };
        self.stats.message_persisted();

        let payload = match record.to_payload() {
            Ok(payload) => payload,
            Err(e) => {
                summary.failed += 1;
                tracing::error!(message_id = %record.id, error = %e, "Failed to encode message");
                return;
            }
        };

        summary.accepted += 1;
        self.registry
            .broadcast(conversation_id, payload, Some(self.handle.id()));
    }
}

/// Keeps a handle registered, and counted as active, for as long as it is alive
struct Registration {
    registry: FanoutRegistry,
    stats: Arc<FanoutStats>,
    id: HandleId,
    conversation_id: String,
}

impl Registration {
    fn new(registry: &FanoutRegistry, handle: &ConnectionHandle, stats: &Arc<FanoutStats>) -> Self {
        registry.register(handle.clone());
        stats.connection_opened();
        Self {
            registry: registry.clone(),
            stats: Arc::clone(stats),
            id: handle.id(),
            conversation_id: handle.conversation_id().to_string(),
        }
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.registry.unregister_id(self.id, &self.conversation_id);
        self.stats.connection_closed();
    }
}

/// Resolves once shutdown is requested; never resolves without a signal
async fn wait_for_shutdown(shutdown: &mut Option<watch::Receiver<bool>>) {
    match shutdown {
        Some(rx) => {
            let signalled = rx.wait_for(|stop| *stop).await.is_ok();
            if !signalled {
                // Sender gone without signalling: keep running
                std::future::pending::<()>().await;
            }
        }
        None => std::future::pending::<()>().await,
    }
}
