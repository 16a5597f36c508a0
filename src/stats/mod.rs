//! Counters for connections, ingestion, delivery and retention

pub mod metrics;

pub use metrics::{FanoutStats, StatsSnapshot};
