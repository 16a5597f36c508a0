//! convo-fanout server
//!
//! Configuration comes from `CONVO_*` environment variables; log filtering
//! from `RUST_LOG` (default `info`).

use convo_fanout::{ChatServer, ServerConfig, SqliteStore};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = ServerConfig::from_env()?;

    let store = match &config.database_path {
        Some(path) => {
            tracing::info!(path = %path.display(), "Opening message database");
            SqliteStore::open(path)?
        }
        None => {
            tracing::warn!("CONVO_DB_PATH not set, history will not survive a restart");
            SqliteStore::open_in_memory()?
        }
    };

    let server = ChatServer::new(config, store);
    server
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for ctrl-c");
                std::future::pending::<()>().await;
            }
        })
        .await?;

    Ok(())
}
