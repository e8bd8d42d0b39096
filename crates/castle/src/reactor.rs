//! The reactor thread and the handle other threads use to reach it.
//!
//! ```text
//!   connection tasks ──defer──┐
//!   worker threads ───defer───┼──→ LoopReceiver ──→ callback(&mut Context)
//!   clock timers ─────defer───┘                         ↑
//!   SyncTicker ──────────────────── tick ───────────────┘ sync_clocks()
//! ```
//!
//! The reactor runs on its own OS thread with a single-threaded Tokio
//! runtime, so clock timers armed from a callback fire on that runtime
//! and every callback runs with exclusive access to the [`Context`].

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use castle_clock::SyncTicker;
use castle_exec::{LoopMarshaler, LoopReceiver};
use castle_protocol::{GameId, GameRecord, HistoryEntry, LiveGameEntry, UserId};
use tokio::sync::{oneshot, watch};
use tracing::{debug, error, info};

use crate::{CastleError, Context};

/// Runs deferred callbacks and sync ticks until the context stops.
pub struct Reactor {
    ctx: Context,
    receiver: LoopReceiver<Context>,
    ticker: SyncTicker,
}

impl Reactor {
    pub fn new(ctx: Context, receiver: LoopReceiver<Context>) -> Self {
        let ticker = SyncTicker::new(ctx.config().sync_interval);
        Self { ctx, receiver, ticker }
    }

    /// Drives the loop. Returns the context once stopped; its worker pool
    /// has been shut down by then.
    pub async fn run(mut self) -> Context {
        info!("reactor running");
        while !self.ctx.is_stopping() {
            tokio::select! {
                callback = self.receiver.recv() => match callback {
                    Some(callback) => callback(&mut self.ctx),
                    // The context holds a marshaler itself, so this only
                    // happens if it was built with a foreign one.
                    None => break,
                },
                tick = self.ticker.tick() => {
                    debug!(tick, "clock sync");
                    self.ctx.sync_clocks();
                }
            }
        }
        self.ctx.stop();
        self.ctx.shutdown_workers();
        // Completions that raced the shutdown still get to run.
        let late = self.receiver.run_pending(&mut self.ctx);
        info!(late, "reactor stopped");
        self.ctx
    }

    /// Starts the reactor on a dedicated thread.
    pub fn spawn(self) -> Result<JoinHandle<()>, CastleError> {
        let handle = thread::Builder::new()
            .name("castle-reactor".to_string())
            .spawn(move || {
                let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
                    Ok(runtime) => runtime,
                    Err(e) => {
                        error!(error = %e, "reactor runtime could not start");
                        return;
                    }
                };
                runtime.block_on(self.run());
            })?;
        Ok(handle)
    }
}

/// Snapshot of the server's population.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ServerStats {
    pub sessions: usize,
    pub active_players: usize,
    pub disconnected_players: usize,
    pub live_games: usize,
    pub connections: usize,
    /// Store tasks waiting for a free worker.
    pub queued_tasks: usize,
}

/// In-process access to a running server. Cheap to clone.
///
/// Every call is a closure deferred onto the reactor; the answer comes
/// back on a oneshot channel.
#[derive(Clone)]
pub struct ServerHandle {
    marshal: LoopMarshaler<Context>,
    /// Tells the accept loop to stop.
    stop: Arc<watch::Sender<bool>>,
}

impl ServerHandle {
    pub(crate) fn new(marshal: LoopMarshaler<Context>, stop: Arc<watch::Sender<bool>>) -> Self {
        Self { marshal, stop }
    }

    /// Runs `f` on the reactor and returns what it returns.
    pub async fn with_context<R, F>(&self, f: F) -> Result<R, CastleError>
    where
        R: Send + 'static,
        F: FnOnce(&mut Context) -> R + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let scheduled = self.marshal.defer(move |ctx: &mut Context| {
            let _ = tx.send(f(ctx));
        });
        if !scheduled {
            return Err(CastleError::ReactorStopped);
        }
        rx.await.map_err(|_| CastleError::ReactorStopped)
    }

    pub async fn live_games(&self) -> Result<Vec<LiveGameEntry>, CastleError> {
        self.with_context(|ctx| ctx.live_games()).await
    }

    pub async fn live_game_of(&self, user: UserId) -> Result<Option<GameId>, CastleError> {
        self.with_context(move |ctx| ctx.live_game_of(user)).await
    }

    /// A stored game, from the store via a worker thread.
    pub async fn fetch_game(&self, game_id: GameId) -> Result<Option<GameRecord>, CastleError> {
        let (tx, rx) = oneshot::channel();
        let scheduled = self.marshal.defer(move |ctx: &mut Context| {
            ctx.submit(
                move |store| store.load_game(game_id),
                move |_, result| {
                    let _ = tx.send(result);
                },
            );
        });
        if !scheduled {
            return Err(CastleError::ReactorStopped);
        }
        Ok(rx.await.map_err(|_| CastleError::ReactorStopped)??)
    }

    /// One page of a player's finished games, newest first.
    pub async fn history(&self, user: UserId, batch: u32) -> Result<Vec<HistoryEntry>, CastleError> {
        let (tx, rx) = oneshot::channel();
        let scheduled = self.marshal.defer(move |ctx: &mut Context| {
            let page_size = ctx.config().history_page_size;
            ctx.submit(
                move |store| store.history(user, batch, page_size),
                move |_, result| {
                    let _ = tx.send(result);
                },
            );
        });
        if !scheduled {
            return Err(CastleError::ReactorStopped);
        }
        Ok(rx.await.map_err(|_| CastleError::ReactorStopped)??)
    }

    pub async fn stats(&self) -> Result<ServerStats, CastleError> {
        self.with_context(|ctx| ServerStats {
            sessions: ctx.registry().session_count(),
            active_players: ctx.registry().active_count(),
            disconnected_players: ctx.registry().disconnected_count(),
            live_games: ctx.registry().live_game_count(),
            connections: ctx.connection_count(),
            queued_tasks: ctx.queued_tasks(),
        })
        .await
    }

    /// Stops accepting connections and asks the reactor to stop. Open
    /// connections are closed and the worker pool is joined. Returns
    /// `false` if the reactor had already stopped.
    pub fn shutdown(&self) -> bool {
        let _ = self.stop.send(true);
        self.marshal.defer(|ctx: &mut Context| ctx.stop())
    }

    pub fn is_stopped(&self) -> bool {
        self.marshal.is_closed()
    }
}

impl std::fmt::Debug for ServerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerHandle")
            .field("stopped", &self.is_stopped())
            .finish()
    }
}

