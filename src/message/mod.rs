//! Chat message types
//!
//! - [`MessageRecord`]: the durable, canonical form that is stored and
//!   broadcast verbatim
//! - [`MessageDraft`]: a record before the store has assigned its id and
//!   timestamps
//! - [`InboundMessage`]: what a client sends over its connection

pub mod inbound;
pub mod record;

pub use inbound::InboundMessage;
pub use record::{MessageDraft, MessageRecord, DEFAULT_KIND};
