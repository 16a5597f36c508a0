//! Server configuration

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::registry::{EchoPolicy, RegistryConfig};
use crate::retention::RetentionConfig;
use crate::session::DEFAULT_MAX_CONTENT_LEN;

/// Default per-connection outbound queue depth, in frames
pub const DEFAULT_OUTBOUND_BUFFER: usize = 64;

pub const ENV_BIND_ADDR: &str = "CONVO_BIND_ADDR";
pub const ENV_DB_PATH: &str = "CONVO_DB_PATH";
pub const ENV_MAX_CONNECTIONS: &str = "CONVO_MAX_CONNECTIONS";
pub const ENV_SWEEP_INTERVAL_SECS: &str = "CONVO_SWEEP_INTERVAL_SECS";
pub const ENV_RETENTION_SECS: &str = "CONVO_RETENTION_SECS";
pub const ENV_ECHO_SENDER: &str = "CONVO_ECHO_SENDER";

/// Server configuration options
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to
    pub bind_addr: SocketAddr,

    /// SQLite database file (`None` = in-memory database)
    pub database_path: Option<PathBuf>,

    /// Maximum concurrent WebSocket connections (0 = unlimited)
    pub max_connections: usize,

    /// Outbound frames buffered per connection before deliveries are dropped
    pub outbound_buffer: usize,

    /// Maximum message content length in characters (0 = unlimited)
    pub max_content_len: usize,

    /// Fan-out options
    pub registry: RegistryConfig,

    /// Retention sweep options
    pub retention: RetentionConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 3000)),
            database_path: None,
            max_connections: 0, // Unlimited
            outbound_buffer: DEFAULT_OUTBOUND_BUFFER,
            max_content_len: DEFAULT_MAX_CONTENT_LEN,
            registry: RegistryConfig::default(),
            retention: RetentionConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Create a new config with custom bind address
    pub fn with_addr(addr: SocketAddr) -> Self {
        Self {
            bind_addr: addr,
            ..Default::default()
        }
    }

    /// Build a config from `CONVO_*` environment variables
    ///
    /// Unset variables keep their defaults. A set but unparsable variable is
    /// an error.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(addr) = parse_var(&lookup, ENV_BIND_ADDR)? {
            config.bind_addr = addr;
        }
        if let Some(path) = lookup(ENV_DB_PATH).filter(|p| !p.trim().is_empty()) {
            config.database_path = Some(PathBuf::from(path));
        }
        if let Some(max) = parse_var(&lookup, ENV_MAX_CONNECTIONS)? {
            config.max_connections = max;
        }
        if let Some(secs) = parse_var::<u64, _>(&lookup, ENV_SWEEP_INTERVAL_SECS)? {
            if secs == 0 {
                return Err(Error::Config(format!("{ENV_SWEEP_INTERVAL_SECS} must be positive")));
            }
            config.retention.interval = Duration::from_secs(secs);
        }
        if let Some(secs) = parse_var(&lookup, ENV_RETENTION_SECS)? {
            config.retention.max_age = Duration::from_secs(secs);
        }
        if let Some(raw) = lookup(ENV_ECHO_SENDER) {
            config.registry.echo_policy = parse_echo(&raw)?;
        }

        Ok(config)
    }

    /// Set the bind address
    pub fn bind(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    /// Persist to a SQLite file
    pub fn database_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.database_path = Some(path.into());
        self
    }

    /// Set maximum connections
    pub fn max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }

    /// Set outbound queue depth (minimum 1)
    pub fn outbound_buffer(mut self, frames: usize) -> Self {
        self.outbound_buffer = frames.max(1);
        self
    }

    /// Set content length limit
    pub fn max_content_len(mut self, max: usize) -> Self {
        self.max_content_len = max;
        self
    }

    /// Set fan-out options
    pub fn registry(mut self, registry: RegistryConfig) -> Self {
        self.registry = registry;
        self
    }

    /// Set retention options
    pub fn retention(mut self, retention: RetentionConfig) -> Self {
        self.retention = retention;
        self
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| Error::Config(format!("{key}={raw:?}: {e}"))),
    }
}

fn parse_echo(raw: &str) -> Result<EchoPolicy> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(EchoPolicy::IncludeSender),
        "0" | "false" | "no" | "off" => Ok(EchoPolicy::ExcludeSender),
        _ => Err(Error::Config(format!("{ENV_ECHO_SENDER}={raw:?}: expected a boolean"))),
    }
}
