//! Transport-neutral inbound frames

use bytes::Bytes;

/// One frame read from a connection
///
/// The server adapts its WebSocket messages into this type so the ingestion
/// loop does not depend on a particular transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundFrame {
    /// UTF-8 text frame carrying a JSON message
    Text(String),
    /// Binary frame, accepted if it holds UTF-8 JSON
    Binary(Bytes),
    /// Keepalive (ping or pong), ignored
    Ping,
    /// Peer closed the connection
    Close,
}

impl From<&str> for InboundFrame {
    fn from(text: &str) -> Self {
        InboundFrame::Text(text.to_string())
    }
}

impl From<String> for InboundFrame {
    fn from(text: String) -> Self {
        InboundFrame::Text(text)
    }
}
