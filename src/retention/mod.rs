//! Retention of unsaved chat history
//!
//! Unsaved messages are transient: a periodic sweep deletes every unsaved
//! record older than the configured age. The same sweep can be triggered on
//! demand, and both paths run the identical deletion.

pub mod config;
pub mod sweeper;

pub use config::RetentionConfig;
pub use sweeper::RetentionSweeper;
