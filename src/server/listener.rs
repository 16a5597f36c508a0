//! Chat server
//!
//! Owns the long-lived tasks (registry actor, retention sweeper) and the HTTP
//! listener, and tears them down in order on shutdown.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::{mpsc, watch, Semaphore};

use super::auth::{Authenticator, HeaderAuthenticator};
use super::config::ServerConfig;
use super::routes::{self, AppState};
use crate::error::Result;
use crate::registry::FanoutRegistry;
use crate::retention::RetentionSweeper;
use crate::stats::FanoutStats;
use crate::store::MessageStore;

/// Conversation fan-out server
pub struct ChatServer<S, A = HeaderAuthenticator> {
    config: ServerConfig,
    store: Arc<S>,
    auth: Arc<A>,
    stats: Arc<FanoutStats>,
}

impl<S: MessageStore> ChatServer<S> {
    /// Create a server that reads identities from the `x-user-id` header
    pub fn new(config: ServerConfig, store: S) -> Self {
        Self::with_authenticator(config, store, HeaderAuthenticator::default())
    }
}

impl<S: MessageStore, A: Authenticator> ChatServer<S, A> {
    /// Create a server with a custom identity source
    pub fn with_authenticator(config: ServerConfig, store: S, auth: A) -> Self {
        Self {
            config,
            store: Arc::new(store),
            auth: Arc::new(auth),
            stats: Arc::new(FanoutStats::new()),
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn stats(&self) -> &Arc<FanoutStats> {
        &self.stats
    }

    /// Get the bind address
    pub fn bind_addr(&self) -> SocketAddr {
        self.config.bind_addr
    }

    /// Run the server
    ///
    /// This method blocks until the listener fails.
    pub async fn run(&self) -> Result<()> {
        self.run_until(std::future::pending()).await
    }

    /// Run the server with graceful shutdown
    pub async fn run_until<F>(&self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        self.serve(listener, shutdown).await
    }

    /// Serve on an already bound listener until `shutdown` resolves
    ///
    /// On shutdown: stop accepting, signal every session to end, wait for
    /// their connection tasks, drain and stop the registry, stop the sweeper.
    pub async fn serve<F>(&self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = listener.local_addr()?;

        let (registry, registry_task) =
            FanoutRegistry::spawn(self.config.registry.clone(), Arc::clone(&self.stats));
        let sweeper = Arc::new(RetentionSweeper::new(
            Arc::clone(&self.store),
            self.config.retention.clone(),
            Arc::clone(&self.stats),
        ));

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let sweeper_task = sweeper.spawn(shutdown_rx.clone());
        let (tracker, mut connections_done) = mpsc::channel::<()>(1);

        let connection_slots = if self.config.max_connections > 0 {
            Some(Arc::new(Semaphore::new(self.config.max_connections)))
        } else {
            None
        };

        let state = Arc::new(AppState {
            config: self.config.clone(),
            store: Arc::clone(&self.store),
            auth: Arc::clone(&self.auth),
            registry: registry.clone(),
            sweeper,
            stats: Arc::clone(&self.stats),
            shutdown: shutdown_rx,
            connection_slots,
            _tracker: tracker,
        });
        let app = routes::router(state);

        tracing::info!(
            addr = %addr,
            max_connections = self.config.max_connections,
            echo_policy = ?self.config.registry.echo_policy,
            "Chat server listening"
        );

        let served = axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                shutdown.await;
                tracing::info!("Shutdown signal received");
            })
            .await;

        if let Err(e) = &served {
            tracing::error!(error = %e, "Listener failed");
        }

        // Sessions exit their read loops and unregister
        let _ = shutdown_tx.send(true);

        // Each connection task keeps the app state, and with it the tracker
        // sender, alive until it finishes
        let _ = connections_done.recv().await;

        registry.shutdown();
        if let Err(e) = registry_task.await {
            tracing::error!(error = %e, "Registry task failed");
        }
        if let Err(e) = sweeper_task.await {
            tracing::error!(error = %e, "Sweeper task failed");
        }

        tracing::info!("Chat server stopped");
        served.map_err(Into::into)
    }
}
