//! Per-connection ingestion
//!
//! Each accepted connection runs one [`IngestSession`]: it registers the
//! connection's handle, then turns inbound frames into persisted messages
//! and hands them to the registry for broadcast. Frames from one connection
//! are processed strictly in order, one at a time.

pub mod frame;
pub mod pipeline;
pub mod state;

pub use frame::InboundFrame;
pub use pipeline::{IngestSession, DEFAULT_MAX_CONTENT_LEN};
pub use state::{CloseReason, SessionSummary};
