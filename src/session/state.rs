//! Session outcome tracking
//!
//! Counts what happened to each inbound frame of one connection and why the
//! read loop ended.

use std::time::{Duration, Instant};

/// Why a session's read loop exited
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// Peer sent a close frame
    ClientClosed,
    /// Transport stream ended without a close frame
    EndOfStream,
    /// Transport reported a read error
    ReadError,
    /// Server is shutting down
    Shutdown,
}

/// Per-session counters
#[derive(Debug, Clone)]
pub struct SessionSummary {
    /// Frames persisted and broadcast
    pub accepted: u64,
    /// Frames skipped for failing to decode or validate
    pub rejected: u64,
    /// Frames dropped because persistence failed
    pub failed: u64,
    /// How the loop ended
    pub close_reason: CloseReason,
    started_at: Instant,
}

impl SessionSummary {
    pub(crate) fn new() -> Self {
        Self {
            accepted: 0,
            rejected: 0,
            failed: 0,
            close_reason: CloseReason::EndOfStream,
            started_at: Instant::now(),
        }
    }

    /// Total frames that carried a message attempt
    pub fn frames(&self) -> u64 {
        self.accepted + self.rejected + self.failed
    }

    /// Time since the session started
    pub fn duration(&self) -> Duration {
        self.started_at.elapsed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_counts() {
        let mut summary = SessionSummary::new();
        summary.accepted = 3;
        summary.rejected = 2;
        summary.failed = 1;

        assert_eq!(summary.frames(), 6);
        assert_eq!(summary.close_reason, CloseReason::EndOfStream);
    }
}
