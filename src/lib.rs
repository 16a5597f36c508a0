//! Realtime conversation fan-out
//!
//! Clients hold a WebSocket open on one conversation. Every message a client
//! sends is persisted first and then delivered to all connections currently
//! attached to the same conversation. Unsaved history is transient and is
//! swept once it is older than the retention age.
//!
//! # Layout
//!
//! - [`message`]: stored record, draft and client payload types
//! - [`store`]: the [`MessageStore`] contract with SQLite and in-memory backends
//! - [`registry`]: connection handles and the fan-out actor
//! - [`session`]: per-connection ingestion (decode, validate, persist, broadcast)
//! - [`retention`]: scheduled and on-demand deletion of expired unsaved messages
//! - [`server`]: axum front end and shutdown orchestration
//! - [`stats`]: process-wide counters
//!
//! # Example
//!
//! ```no_run
//! use convo_fanout::{ChatServer, ServerConfig, SqliteStore};
//!
//! # async fn run() -> convo_fanout::Result<()> {
//! let config = ServerConfig::default();
//! let store = SqliteStore::open_in_memory()?;
//! ChatServer::new(config, store)
//!     .run_until(async {
//!         let _ = tokio::signal::ctrl_c().await;
//!     })
//!     .await
//! # }
//! ```

pub mod error;
pub mod message;
pub mod registry;
pub mod retention;
pub mod server;
pub mod session;
pub mod stats;
pub mod store;

pub use error::{Error, Result};
pub use message::{InboundMessage, MessageDraft, MessageRecord};
pub use registry::{ConnectionHandle, EchoPolicy, FanoutRegistry, HandleId, RegistryConfig};
pub use retention::{RetentionConfig, RetentionSweeper};
pub use server::{Authenticator, ChatServer, HeaderAuthenticator, ServerConfig};
pub use session::{IngestSession, SessionSummary};
pub use stats::FanoutStats;
pub use store::{MemoryStore, MessageStore, SqliteStore};
