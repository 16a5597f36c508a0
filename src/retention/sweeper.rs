//! Retention sweeper
//!
//! Deletes expired unsaved messages on a fixed period and on demand. The
//! first scheduled sweep happens one full interval after the task starts.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use super::config::RetentionConfig;
use crate::error::StorageError;
use crate::stats::FanoutStats;
use crate::store::MessageStore;

/// Shortest period the scheduler accepts
const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// Periodic and on-demand deletion of expired unsaved messages
pub struct RetentionSweeper<S> {
    store: Arc<S>,
    config: RetentionConfig,
    stats: Arc<FanoutStats>,
}

impl<S: MessageStore> RetentionSweeper<S> {
    pub fn new(store: Arc<S>, config: RetentionConfig, stats: Arc<FanoutStats>) -> Self {
        Self {
            store,
            config,
            stats,
        }
    }

    pub fn config(&self) -> &RetentionConfig {
        &self.config
    }

    /// Run one sweep now and return the number of deleted records
    ///
    /// Scheduled ticks and the admin endpoint both land here.
    pub async fn sweep(&self) -> Result<u64, StorageError> {
        match self.store.delete_expired_unsaved(self.config.max_age).await {
            Ok(deleted) => {
                self.stats.sweep_completed(deleted);
                tracing::info!(
                    deleted = deleted,
                    max_age_secs = self.config.max_age.as_secs(),
                    "Deleted expired unsaved messages"
                );
                Ok(deleted)
            }
            Err(e) => {
                self.stats.sweep_failed();
                tracing::error!(error = %e, "Retention sweep failed");
                Err(e)
            }
        }
    }

    /// Spawn the periodic sweep task
    ///
    /// A failed tick is logged and the schedule continues. The task exits
    /// when `shutdown` flips to `true` or its sender is dropped; a sweep
    /// already in progress finishes first.
    pub fn spawn(self: &Arc<Self>, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        let sweeper = Arc::clone(self);
        let period = sweeper.config.interval.max(MIN_INTERVAL);

        tokio::spawn(async move {
            if *shutdown.borrow() {
                return;
            }

            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            tracing::debug!(
                interval_ms = period.as_millis() as u64,
                "Retention sweeper started"
            );

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        // Error already logged and counted
                        let _ = sweeper.sweep().await;
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }

            tracing::debug!("Retention sweeper stopped");
        })
    }
}
