//! HTTP and WebSocket front end
//!
//! [`ChatServer`] wires the fan-out core to axum: WebSocket upgrades become
//! ingestion sessions, and a few JSON routes expose history, saving and the
//! retention trigger.

pub mod auth;
pub mod config;
mod connection;
pub mod listener;
pub mod routes;

pub use auth::{Authenticator, HeaderAuthenticator, USER_ID_HEADER};
pub use config::ServerConfig;
pub use listener::ChatServer;
