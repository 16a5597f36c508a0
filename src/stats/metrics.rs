//! Statistics for the fan-out server
//!
//! Counters are plain relaxed atomics: they are shared by every session task,
//! the registry actor and the sweeper, and only ever read for reporting.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Process-wide counters
#[derive(Debug, Default)]
pub struct FanoutStats {
    connections_opened: AtomicU64,
    connections_closed: AtomicU64,
    frames_rejected: AtomicU64,
    messages_persisted: AtomicU64,
    persist_failures: AtomicU64,
    broadcasts: AtomicU64,
    deliveries: AtomicU64,
    delivery_failures: AtomicU64,
    sweeps: AtomicU64,
    sweep_failures: AtomicU64,
    records_swept: AtomicU64,
}

impl FanoutStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connection_opened(&self) {
        self.connections_opened.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_closed(&self) {
        self.connections_closed.fetch_add(1, Ordering::Relaxed);
    }

    /// Frame skipped because it failed to decode or validate
    pub fn frame_rejected(&self) {
        self.frames_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn message_persisted(&self) {
        self.messages_persisted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn persist_failed(&self) {
        self.persist_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn broadcast(&self) {
        self.broadcasts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn delivered(&self) {
        self.deliveries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn delivery_failed(&self) {
        self.delivery_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a completed sweep and how many records it removed
    pub fn sweep_completed(&self, deleted: u64) {
        self.sweeps.fetch_add(1, Ordering::Relaxed);
        self.records_swept.fetch_add(deleted, Ordering::Relaxed);
    }

    pub fn sweep_failed(&self) {
        self.sweeps.fetch_add(1, Ordering::Relaxed);
        self.sweep_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Point-in-time copy of every counter
    pub fn snapshot(&self) -> StatsSnapshot {
        let opened = self.connections_opened.load(Ordering::Relaxed);
        let closed = self.connections_closed.load(Ordering::Relaxed);

        StatsSnapshot {
            connections_opened: opened,
            connections_closed: closed,
            active_connections: opened.saturating_sub(closed),
            frames_rejected: self.frames_rejected.load(Ordering::Relaxed),
            messages_persisted: self.messages_persisted.load(Ordering::Relaxed),
            persist_failures: self.persist_failures.load(Ordering::Relaxed),
            broadcasts: self.broadcasts.load(Ordering::Relaxed),
            deliveries: self.deliveries.load(Ordering::Relaxed),
            delivery_failures: self.delivery_failures.load(Ordering::Relaxed),
            sweeps: self.sweeps.load(Ordering::Relaxed),
            sweep_failures: self.sweep_failures.load(Ordering::Relaxed),
            records_swept: self.records_swept.load(Ordering::Relaxed),
        }
    }
}

/// Serializable copy of [`FanoutStats`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub connections_opened: u64,
    pub connections_closed: u64,
    pub active_connections: u64,
    pub frames_rejected: u64,
    pub messages_persisted: u64,
    pub persist_failures: u64,
    pub broadcasts: u64,
    pub deliveries: u64,
    pub delivery_failures: u64,
    pub sweeps: u64,
    pub sweep_failures: u64,
    pub records_swept: u64,
}
