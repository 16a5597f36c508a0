//! Conversation registry for fan-out routing
//!
//! The registry tracks which connections are attached to which conversation
//! and delivers broadcast payloads to them. All membership changes and
//! broadcast reads go through one actor task, so the membership map is never
//! touched concurrently.
//!
//! # Architecture
//!
//! ```text
//!    [Session c1/alice]   [Session c1/bob]    [Session c2/carol]
//!     register/broadcast   register/unregister   register
//!            │                    │                   │
//!            └────────────────────┼───────────────────┘
//!                                 ▼
//!                     mpsc::UnboundedSender<Command>
//!                                 │
//!                     ┌───────────▼─────────────┐
//!                     │ RegistryActor           │
//!                     │  members: HashMap<      │
//!                     │    conversation_id,     │
//!                     │    Vec<ConnectionHandle>│
//!                     │  >                      │
//!                     └───────────┬─────────────┘
//!                                 │ handle.send() (try_send, never waits)
//!            ┌────────────────────┼───────────────────┐
//!            ▼                    ▼                   ▼
//!      outbound queue       outbound queue      outbound queue
//!      writer task ──► WS   writer task ──► WS  writer task ──► WS
//! ```
//!
//! # Delivery
//!
//! Each payload is a `bytes::Bytes` buffer, so all recipients share one
//! allocation. A member whose outbound queue is full or closed misses the
//! frame; the failure is logged and counted but never affects the other
//! members or the actor.

pub mod actor;
pub mod config;
pub mod handle;

pub use actor::FanoutRegistry;
pub use config::{EchoPolicy, RegistryConfig};
pub use handle::{ConnectionHandle, HandleId};
