//! WebSocket connection
//!
//! Splits an upgraded socket into the read half, which feeds the ingestion
//! pipeline, and the write half, owned by a writer task that drains the
//! connection handle's outbound queue.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use bytes::Bytes;
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use super::auth::Authenticator;
use super::routes::AppState;
use crate::error::TransportError;
use crate::registry::{ConnectionHandle, HandleId};
use crate::session::{InboundFrame, IngestSession};
use crate::store::MessageStore;

/// Run one accepted connection to completion
pub(crate) async fn serve<S, A>(
    socket: WebSocket,
    state: Arc<AppState<S, A>>,
    user_id: String,
    conversation_id: String,
) where
    S: MessageStore,
    A: Authenticator,
{
    let (sink, stream) = socket.split();
    let (handle, outbound) =
        ConnectionHandle::new(user_id, conversation_id, state.config.outbound_buffer);
    let handle_id = handle.id();

    let writer = tokio::spawn(write_outbound(handle_id, sink, outbound));

    let frames = stream.map(adapt);
    let summary = IngestSession::new(
        handle,
        state.registry.clone(),
        Arc::clone(&state.store),
        Arc::clone(&state.stats),
    )
    .max_content_len(state.config.max_content_len)
    .with_shutdown(state.shutdown.clone())
    .run(frames)
    .await;

    // The writer ends once the registry has dropped its copy of the handle
    if let Err(e) = writer.await {
        tracing::error!(handle_id = %handle_id, error = %e, "Writer task failed");
    }

    tracing::debug!(
        handle_id = %handle_id,
        frames = summary.frames(),
        "Connection closed"
    );
}

fn adapt(msg: Result<Message, axum::Error>) -> Result<InboundFrame, TransportError> {
    match msg {
        Ok(Message::Text(text)) => Ok(InboundFrame::Text(text.as_str().to_owned())),
        Ok(Message::Binary(data)) => Ok(InboundFrame::Binary(data)),
        Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => Ok(InboundFrame::Ping),
        Ok(Message::Close(_)) => Ok(InboundFrame::Close),
        Err(e) => Err(TransportError::Receive(e.to_string())),
    }
}

async fn write_outbound(
    handle_id: HandleId,
    mut sink: SplitSink<WebSocket, Message>,
    mut outbound: mpsc::Receiver<Bytes>,
) {
    while let Some(payload) = outbound.recv().await {
        let text = match std::str::from_utf8(&payload) {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(handle_id = %handle_id, error = %e, "Dropping non-UTF-8 payload");
                continue;
            }
        };

        if let Err(e) = sink.send(Message::Text(text.into())).await {
            tracing::debug!(handle_id = %handle_id, error = %e, "Write failed");
            break;
        }
    }

    // Later sends on the handle report Closed
    outbound.close();
    let _ = sink.close().await;
}
