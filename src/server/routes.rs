//! HTTP routes
//!
//! - `GET  /ws/chat/{conversation_id}` WebSocket upgrade into a conversation
//! - `GET  /conversations/{conversation_id}/messages` recent history
//! - `POST /conversations/{conversation_id}/messages` send without a socket
//! - `PATCH /messages/{id}/save` exempt a message from retention
//! - `POST /admin/messages/sweep` run a retention sweep now
//! - `GET  /admin/stats` counter snapshot
//! - `GET  /health` liveness

use std::sync::Arc;

use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, patch, post};
use axum::Router;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch, Semaphore};
use uuid::Uuid;

use super::auth::Authenticator;
use super::config::ServerConfig;
use super::connection;
use crate::error::Error;
use crate::message::{InboundMessage, MessageRecord};
use crate::registry::FanoutRegistry;
use crate::retention::RetentionSweeper;
use crate::stats::{FanoutStats, StatsSnapshot};
use crate::store::MessageStore;

/// History page size when `limit` is absent
pub const DEFAULT_HISTORY_LIMIT: usize = 50;

/// Largest history page served
pub const MAX_HISTORY_LIMIT: usize = 500;

/// State shared by every handler and connection task
pub(crate) struct AppState<S, A> {
    pub(crate) config: ServerConfig,
    pub(crate) store: Arc<S>,
    pub(crate) auth: Arc<A>,
    pub(crate) registry: FanoutRegistry,
    pub(crate) sweeper: Arc<RetentionSweeper<S>>,
    pub(crate) stats: Arc<FanoutStats>,
    pub(crate) shutdown: watch::Receiver<bool>,
    pub(crate) connection_slots: Option<Arc<Semaphore>>,
    /// Never sent on; closes once every holder of the state is gone
    pub(crate) _tracker: mpsc::Sender<()>,
}

pub(crate) fn router<S, A>(state: Arc<AppState<S, A>>) -> Router
where
    S: MessageStore,
    A: Authenticator,
{
    Router::new()
        .route("/ws/chat/{conversation_id}", get(ws_upgrade::<S, A>))
        .route(
            "/conversations/{conversation_id}/messages",
            get(conversation_messages::<S, A>).post(send_message::<S, A>),
        )
        .route("/messages/{id}/save", patch(save_message::<S, A>))
        .route("/admin/messages/sweep", post(sweep_now::<S, A>))
        .route("/admin/stats", get(stats::<S, A>))
        .route("/health", get(health))
        .with_state(state)
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

fn error_response(status: StatusCode, error: impl ToString) -> Response {
    (
        status,
        Json(ErrorBody {
            error: error.to_string(),
        }),
    )
        .into_response()
}

/// GET /ws/chat/{conversation_id}
async fn ws_upgrade<S, A>(
    State(state): State<Arc<AppState<S, A>>>,
    Path(conversation_id): Path<String>,
    headers: HeaderMap,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response
where
    S: MessageStore,
    A: Authenticator,
{
    let Some(user_id) = state.auth.authenticate(&headers) else {
        return error_response(StatusCode::UNAUTHORIZED, "missing user identity");
    };

    if *state.shutdown.borrow() {
        return error_response(StatusCode::SERVICE_UNAVAILABLE, "server is shutting down");
    }

    // Check connection limit
    let permit = match &state.connection_slots {
        Some(slots) => match Arc::clone(slots).try_acquire_owned() {
            Ok(permit) => Some(permit),
            Err(_) => {
                tracing::warn!(
                    conversation = %conversation_id,
                    user = %user_id,
                    "Connection rejected: limit reached"
                );
                return error_response(StatusCode::SERVICE_UNAVAILABLE, "connection limit reached");
            }
        },
        None => None,
    };

    let ws = match ws {
        Ok(ws) => ws,
        Err(rejection) => return rejection.into_response(),
    };

    ws.on_upgrade(move |socket| async move {
        connection::serve(socket, state, user_id, conversation_id).await;
        drop(permit);
    })
}

#[derive(Debug, Deserialize)]
struct HistoryQuery {
    limit: Option<usize>,
}

/// GET /conversations/{conversation_id}/messages
async fn conversation_messages<S, A>(
    State(state): State<Arc<AppState<S, A>>>,
    Path(conversation_id): Path<String>,
    headers: HeaderMap,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<MessageRecord>>, Response>
where
    S: MessageStore,
    A: Authenticator,
{
    if state.auth.authenticate(&headers).is_none() {
        return Err(error_response(StatusCode::UNAUTHORIZED, "missing user identity"));
    }

    let limit = query
        .limit
        .unwrap_or(DEFAULT_HISTORY_LIMIT)
        .min(MAX_HISTORY_LIMIT);

    match state.store.conversation_messages(&conversation_id, limit).await {
        Ok(records) => Ok(Json(records)),
        Err(e) => {
            tracing::error!(conversation = %conversation_id, error = %e, "Failed to load history");
            Err(error_response(StatusCode::INTERNAL_SERVER_ERROR, e))
        }
    }
}

/// POST /conversations/{conversation_id}/messages
///
/// Same order as a socket frame: validate, persist, then broadcast to every
/// live member of the conversation.
async fn send_message<S, A>(
    State(state): State<Arc<AppState<S, A>>>,
    Path(conversation_id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Response
where
    S: MessageStore,
    A: Authenticator,
{
    let Some(user_id) = state.auth.authenticate(&headers) else {
        return error_response(StatusCode::UNAUTHORIZED, "missing user identity");
    };

    let decoded = InboundMessage::from_binary(&body).map_err(Error::from);
    let inbound = match decoded.and_then(|m| {
        m.validate(state.config.max_content_len)?;
        Ok(m)
    }) {
        Ok(inbound) => inbound,
        Err(e) => {
            state.stats.frame_rejected();
            return error_response(StatusCode::BAD_REQUEST, e);
        }
    };

    let draft = inbound.into_draft(&conversation_id, &user_id);
    let record = match state.store.persist(draft).await {
        Ok(record) => record,
        Err(e) => {
            state.stats.persist_failed();
            tracing::error!(
                conversation = %conversation_id,
                user = %user_id,
                error = %e,
                "Failed to persist message"
            );
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, e);
        }
    };
    state.stats.message_persisted();

    match record.to_payload() {
        Ok(payload) => state.registry.broadcast(conversation_id, payload, None),
        Err(e) => {
            tracing::error!(message_id = %record.id, error = %e, "Failed to encode message");
        }
    }

    (StatusCode::CREATED, Json(record)).into_response()
}

/// PATCH /messages/{id}/save
async fn save_message<S, A>(
    State(state): State<Arc<AppState<S, A>>>,
    Path(id): Path<String>,
) -> Response
where
    S: MessageStore,
    A: Authenticator,
{
    let Ok(id) = Uuid::parse_str(&id) else {
        return error_response(StatusCode::BAD_REQUEST, "invalid message id");
    };

    match state.store.mark_saved(id).await {
        Ok(true) => StatusCode::NO_CONTENT.into_response(),
        Ok(false) => error_response(StatusCode::NOT_FOUND, "message not found"),
        Err(e) => {
            tracing::error!(message_id = %id, error = %e, "Failed to save message");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e)
        }
    }
}

#[derive(Debug, Serialize)]
struct SweepResponse {
    deleted: u64,
}

/// POST /admin/messages/sweep
async fn sweep_now<S, A>(State(state): State<Arc<AppState<S, A>>>) -> Response
where
    S: MessageStore,
    A: Authenticator,
{
    tracing::info!("Retention sweep requested");
    match state.sweeper.sweep().await {
        Ok(deleted) => Json(SweepResponse { deleted }).into_response(),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e),
    }
}

/// GET /admin/stats
async fn stats<S, A>(State(state): State<Arc<AppState<S, A>>>) -> Json<StatsSnapshot>
where
    S: MessageStore,
    A: Authenticator,
{
    Json(state.stats.snapshot())
}

/// GET /health
async fn health() -> &'static str {
    "ok"
}
