//! `CastleServer` builder and accept loop.
//!
//! This is the entry point for running a Castle server. It wires the
//! layers together: transport → handler tasks → reactor thread → workers
//! → store.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use castle_exec::WorkerPool;
use castle_game::{ChessRules, RulesFactory};
use castle_protocol::JsonCodec;
use castle_session::Authenticator;
use castle_store::{GameStore, SqliteStore};
use castle_transport::{Transport, WebSocketTransport};
use tokio::sync::watch;
use tracing::{debug, error, info};

use crate::handler::{Shared, handle_connection};
use crate::reactor::{Reactor, ServerHandle};
use crate::{CastleError, Context, ServerConfig};

/// Builder for configuring and starting a Castle server.
///
/// # Example
///
/// ```rust,ignore
/// use castle::prelude::*;
///
/// let server = CastleServerBuilder::new()
///     .bind("0.0.0.0:8080")
///     .move_time(Duration::from_secs(180))
///     .build(my_auth)
///     .await?;
/// server.run().await
/// ```
pub struct CastleServerBuilder {
    config: ServerConfig,
    rules: Option<RulesFactory>,
    store: Option<Arc<dyn GameStore>>,
}

impl CastleServerBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self {
            config: ServerConfig::default(),
            rules: None,
            store: None,
        }
    }

    /// Replaces the whole configuration.
    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the address to bind the server to.
    pub fn bind(mut self, addr: &str) -> Self {
        self.config.bind = addr.to_string();
        self
    }

    pub fn move_time(mut self, move_time: Duration) -> Self {
        self.config.move_time = move_time;
        self
    }

    pub fn abandonment_grace(mut self, grace: Duration) -> Self {
        self.config.abandonment_grace = grace;
        self
    }

    /// `None` turns the clock-sync broadcast off.
    pub fn sync_interval(mut self, interval: Option<Duration>) -> Self {
        self.config.sync_interval = interval;
        self
    }

    pub fn worker_threads(mut self, threads: usize) -> Self {
        self.config.worker_threads = threads;
        self
    }

    /// Where the default SQLite store keeps its file. Ignored when a
    /// store is supplied with [`store`](Self::store).
    pub fn db_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.db_path = path.into();
        self
    }

    /// Uses another rules engine than standard chess.
    pub fn rules(mut self, rules: RulesFactory) -> Self {
        self.rules = Some(rules);
        self
    }

    /// Uses another store than SQLite at `db_path`.
    pub fn store(mut self, store: Arc<dyn GameStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Binds the listener, opens the store, and starts the worker pool
    /// and the reactor thread.
    pub async fn build<A: Authenticator>(self, auth: A) -> Result<CastleServer<A>, CastleError> {
        let config = self.config;
        let transport = WebSocketTransport::bind(&config.bind).await?;

        let store: Arc<dyn GameStore> = match self.store {
            Some(store) => store,
            None => Arc::new(SqliteStore::open(&config.db_path, config.db_pool_size)?),
        };
        let rules = self.rules.unwrap_or_else(ChessRules::factory);
        let workers = Arc::new(WorkerPool::new(config.worker_threads)?);

        let (marshal, receiver) = castle_exec::marshaler::<Context>();
        let handshake_timeout = config.handshake_timeout;
        let ctx = Context::new(config, rules, store, workers, marshal.clone());
        let reactor = Reactor::new(ctx, receiver).spawn()?;

        let shared = Arc::new(Shared {
            auth,
            codec: JsonCodec,
            marshal: marshal.clone(),
            handshake_timeout,
        });
        let (stop_tx, stop_rx) = watch::channel(false);

        Ok(CastleServer {
            transport,
            shared,
            handle: ServerHandle::new(marshal, Arc::new(stop_tx)),
            reactor: Some(reactor),
            stop_rx,
        })
    }
}

impl Default for CastleServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A bound Castle server.
///
/// Call [`run()`](Self::run) to start accepting connections.
pub struct CastleServer<A: Authenticator> {
    transport: WebSocketTransport,
    shared: Arc<Shared<A>>,
    handle: ServerHandle,
    reactor: Option<JoinHandle<()>>,
    stop_rx: watch::Receiver<bool>,
}

impl<A: Authenticator> CastleServer<A> {
    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.transport.local_addr()
    }

    /// In-process access to the running server, including shutdown.
    pub fn handle(&self) -> ServerHandle {
        self.handle.clone()
    }

    /// Runs the accept loop until shut down, then waits for the reactor
    /// thread to finish.
    pub async fn run(mut self) -> Result<(), CastleError> {
        info!(addr = ?self.local_addr().ok(), "castle server running");

        loop {
            tokio::select! {
                accepted = self.transport.accept() => match accepted {
                    Ok(conn) => {
                        let shared = Arc::clone(&self.shared);
                        tokio::spawn(async move {
                            if let Err(e) = handle_connection(conn, shared).await {
                                debug!(error = %e, "connection ended with error");
                            }
                        });
                    }
                    Err(e) => error!(error = %e, "accept failed"),
                },
                changed = self.stop_rx.changed() => {
                    if changed.is_err() || *self.stop_rx.borrow() {
                        break;
                    }
                }
            }
        }

        self.handle.shutdown();
        if let Some(reactor) = self.reactor.take() {
            match tokio::task::spawn_blocking(move || reactor.join()).await {
                Ok(Ok(())) => {}
                Ok(Err(_)) => error!("reactor thread panicked"),
                Err(e) => error!(error = %e, "could not join reactor thread"),
            }
        }
        info!("castle server stopped");
        Ok(())
    }
}

