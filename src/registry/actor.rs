//! Fan-out registry actor
//!
//! A single task owns the membership map and processes commands one at a
//! time, in arrival order across all producers. Nothing else reads or writes
//! the map.

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use super::config::{EchoPolicy, RegistryConfig};
use super::handle::{ConnectionHandle, HandleId};
use crate::stats::FanoutStats;

/// Commands accepted by the actor
#[derive(Debug)]
enum Command {
    Register(ConnectionHandle),
    Unregister {
        id: HandleId,
        conversation_id: String,
    },
    Broadcast {
        conversation_id: String,
        payload: Bytes,
        origin: Option<HandleId>,
    },
    Members {
        conversation_id: String,
        reply: oneshot::Sender<Vec<HandleId>>,
    },
    ConversationCount {
        reply: oneshot::Sender<usize>,
    },
    Shutdown,
}

impl Command {
    fn name(&self) -> &'static str {
        match self {
            Command::Register(_) => "register",
            Command::Unregister { .. } => "unregister",
            Command::Broadcast { .. } => "broadcast",
            Command::Members { .. } => "members",
            Command::ConversationCount { .. } => "conversation_count",
            Command::Shutdown => "shutdown",
        }
    }
}

/// Submission side of the fan-out registry
///
/// Cheap to clone; every session task holds one. Commands are
/// fire-and-forget: submitting never waits for the actor.
#[derive(Debug, Clone)]
pub struct FanoutRegistry {
    tx: mpsc::UnboundedSender<Command>,
}

impl FanoutRegistry {
    /// Start the actor task
    ///
    /// Returns the submission handle and the actor's join handle, which
    /// completes after [`FanoutRegistry::shutdown`] once the queue is drained.
    pub fn spawn(config: RegistryConfig, stats: Arc<FanoutStats>) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let actor = RegistryActor {
            members: HashMap::new(),
            rx,
            config,
            stats,
        };

        (Self { tx }, tokio::spawn(actor.run()))
    }

    /// Add a handle to its conversation
    pub fn register(&self, handle: ConnectionHandle) {
        self.submit(Command::Register(handle));
    }

    /// Remove a handle from its conversation
    pub fn unregister(&self, handle: &ConnectionHandle) {
        self.unregister_id(handle.id(), handle.conversation_id());
    }

    pub(crate) fn unregister_id(&self, id: HandleId, conversation_id: &str) {
        self.submit(Command::Unregister {
            id,
            conversation_id: conversation_id.to_string(),
        });
    }

    /// Deliver `payload` to the members of a conversation
    ///
    /// `origin` identifies the sending connection, used by
    /// [`EchoPolicy::ExcludeSender`].
    pub fn broadcast(
        &self,
        conversation_id: impl Into<String>,
        payload: Bytes,
        origin: Option<HandleId>,
    ) {
        self.submit(Command::Broadcast {
            conversation_id: conversation_id.into(),
            payload,
            origin,
        });
    }

    /// Current members of a conversation, in registration order
    ///
    /// Answered from the same serialized queue, so it observes every command
    /// submitted before it. Returns an empty list once the actor has stopped.
    pub async fn members(&self, conversation_id: impl Into<String>) -> Vec<HandleId> {
        let (reply, rx) = oneshot::channel();
        self.submit(Command::Members {
            conversation_id: conversation_id.into(),
            reply,
        });
        rx.await.unwrap_or_default()
    }

    /// Number of conversations with at least one member
    pub async fn conversation_count(&self) -> usize {
        let (reply, rx) = oneshot::channel();
        self.submit(Command::ConversationCount { reply });
        rx.await.unwrap_or_default()
    }

    /// Stop accepting commands, drain the ones already queued, then exit
    pub fn shutdown(&self) {
        self.submit(Command::Shutdown);
    }

    /// Whether the actor has stopped
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    fn submit(&self, command: Command) {
        if let Err(mpsc::error::SendError(command)) = self.tx.send(command) {
            tracing::debug!(command = command.name(), "Registry stopped, command dropped");
        }
    }
}

struct RegistryActor {
    /// conversation id -> handles, in registration order
    members: HashMap<String, Vec<ConnectionHandle>>,
    rx: mpsc::UnboundedReceiver<Command>,
    config: RegistryConfig,
    stats: Arc<FanoutStats>,
}

impl RegistryActor {
    async fn run(mut self) {
        tracing::debug!("Registry started");

        while let Some(command) = self.rx.recv().await {
            match command {
                Command::Register(handle) => self.register(handle),
                Command::Unregister {
                    id,
                    conversation_id,
                } => self.unregister(id, &conversation_id),
                Command::Broadcast {
                    conversation_id,
                    payload,
                    origin,
                } => self.broadcast(&conversation_id, payload, origin),
                Command::Members {
                    conversation_id,
                    reply,
                } => {
                    let ids = self
                        .members
                        .get(&conversation_id)
                        .map(|set| set.iter().map(ConnectionHandle::id).collect())
                        .unwrap_or_default();
                    let _ = reply.send(ids);
                }
                Command::ConversationCount { reply } => {
                    let _ = reply.send(self.members.len());
                }
                Command::Shutdown => {
                    // Already-queued commands are still delivered by recv()
                    self.rx.close();
                    tracing::info!("Registry shutting down, draining queue");
                }
            }
        }

        let remaining: usize = self.members.values().map(Vec::len).sum();
        tracing::info!(
            conversations = self.members.len(),
            handles = remaining,
            "Registry stopped"
        );
    }

    fn register(&mut self, handle: ConnectionHandle) {
        let set = self
            .members
            .entry(handle.conversation_id().to_string())
            .or_default();

        if set.contains(&handle) {
            tracing::warn!(
                conversation = handle.conversation_id(),
                handle_id = %handle.id(),
                "Handle already registered"
            );
            return;
        }

        tracing::debug!(
            conversation = handle.conversation_id(),
            handle_id = %handle.id(),
            user = handle.user_id(),
            members = set.len() + 1,
            "Handle registered"
        );
        set.push(handle);
    }

    fn unregister(&mut self, id: HandleId, conversation_id: &str) {
        let Some(set) = self.members.get_mut(conversation_id) else {
            return;
        };

        if let Some(pos) = set.iter().position(|h| h.id() == id) {
            set.remove(pos);
            tracing::debug!(
                conversation = conversation_id,
                handle_id = %id,
                members = set.len(),
                "Handle unregistered"
            );
        }

        if set.is_empty() {
            self.members.remove(conversation_id);
        }
    }

    fn broadcast(&self, conversation_id: &str, payload: Bytes, origin: Option<HandleId>) {
        self.stats.broadcast();

        let Some(set) = self.members.get(conversation_id) else {
            tracing::debug!(conversation = conversation_id, "Broadcast to empty conversation");
            return;
        };

        let mut delivered = 0usize;
        for handle in set {
            if self.config.echo_policy == EchoPolicy::ExcludeSender && origin == Some(handle.id()) {
                continue;
            }

            // Cheap clone: `Bytes` is reference counted
            match handle.send(payload.clone()) {
                Ok(()) => {
                    delivered += 1;
                    self.stats.delivered();
                }
                Err(e) => {
                    // The handle's own read loop is responsible for cleanup
                    self.stats.delivery_failed();
                    tracing::warn!(
                        conversation = conversation_id,
                        handle_id = %handle.id(),
                        user = handle.user_id(),
                        error = %e,
                        "Delivery failed"
                    );
                }
            }
        }

        tracing::trace!(
            conversation = conversation_id,
            members = set.len(),
            delivered = delivered,
            "Broadcast delivered"
        );
    }
}
