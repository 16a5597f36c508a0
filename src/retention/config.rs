//! Retention configuration

use std::time::Duration;

/// Default sweep period
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Default age after which unsaved messages are deleted
pub const DEFAULT_MAX_AGE: Duration = Duration::from_secs(24 * 60 * 60);

/// Retention sweep options
#[derive(Debug, Clone)]
pub struct RetentionConfig {
    /// Time between scheduled sweeps
    pub interval: Duration,

    /// Unsaved messages older than this are deleted
    pub max_age: Duration,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_SWEEP_INTERVAL,
            max_age: DEFAULT_MAX_AGE,
        }
    }
}

impl RetentionConfig {
    /// Set the sweep period
    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Set the retention age
    pub fn max_age(mut self, max_age: Duration) -> Self {
        self.max_age = max_age;
        self
    }
}
