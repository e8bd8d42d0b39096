//! The reactor's state and the plumbing every handler shares.
//!
//! [`Context`] owns every player session, every game, the matchmaking
//! slots and the outbound links. Only the reactor thread ever holds it;
//! everything else reaches it by deferring a closure through its
//! [`LoopMarshaler`]. Handlers live in `lobby`, `play` and `queries` as
//! further `impl Context` blocks.

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use castle_exec::{CancelFlag, LoopMarshaler, WorkerPool};
use castle_game::{GameSession, Matchmaker, RulesFactory};
use castle_protocol::{ClientMessage, Codec, GameId, JsonCodec, QueueKind, ServerMessage};
use castle_session::{GameKey, Identity, PlayerSession, Registry, SessionKey};
use castle_store::{GameStore, StoreError};
use castle_transport::{ConnectionId, Hub};
use tracing::{debug, error, info, warn};

use crate::ServerConfig;
use crate::error::code;

/// What a connection asked for in its `Hello`, after authentication.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    /// Join matchmaking, or resume a game after a dropped connection.
    Play {
        identity: Option<Identity>,
        queue: QueueKind,
    },
    /// Follow a live game.
    Watch { game_id: GameId },
    /// Queries only.
    Browse,
}

/// What an open connection is attached to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Role {
    Player(SessionKey),
    Spectator(String),
    Browser,
}

#[derive(Debug)]
pub(crate) struct Link {
    pub(crate) role: Role,
    /// Raised when the connection closes; deferred query replies check it.
    pub(crate) cancel: CancelFlag,
}

/// All session state, owned by the reactor thread.
pub struct Context {
    pub(crate) config: ServerConfig,
    pub(crate) registry: Registry,
    pub(crate) matchmaker: Matchmaker,
    pub(crate) games: HashMap<GameKey, GameSession>,
    next_game: u64,
    pub(crate) hub: Hub,
    codec: JsonCodec,
    pub(crate) rules: RulesFactory,
    store: Arc<dyn GameStore>,
    workers: Arc<WorkerPool>,
    pub(crate) marshal: LoopMarshaler<Context>,
    pub(crate) links: HashMap<ConnectionId, Link>,
    /// Store tasks submitted whose completion has not run yet.
    pending: usize,
    stopping: bool,
}

impl Context {
    /// Creates an empty context.
    ///
    /// `marshal` must be the sending half whose receiver the reactor
    /// drains; store completions and clock expiries come back through it.
    pub fn new(
        config: ServerConfig,
        rules: RulesFactory,
        store: Arc<dyn GameStore>,
        workers: Arc<WorkerPool>,
        marshal: LoopMarshaler<Context>,
    ) -> Self {
        Self {
            config,
            registry: Registry::new(),
            matchmaker: Matchmaker::new(),
            games: HashMap::new(),
            next_game: 0,
            hub: Hub::new(),
            codec: JsonCodec,
            rules,
            store,
            workers,
            marshal,
            links: HashMap::new(),
            pending: 0,
            stopping: false,
        }
    }

    // -----------------------------------------------------------------------
    // Inbound
    // -----------------------------------------------------------------------

    /// Routes one decoded client message.
    pub fn on_message(&mut self, conn: ConnectionId, message: ClientMessage) {
        let Some(link) = self.links.get(&conn) else {
            debug!(conn_id = %conn, "message from unknown connection dropped");
            return;
        };
        let player = match link.role {
            Role::Player(key) => Some(key),
            _ => None,
        };

        match message {
            ClientMessage::ListLiveGames => self.list_live_games(conn),
            ClientMessage::FindLiveGame { user_id } => self.find_live_game(conn, user_id),
            ClientMessage::FetchGame { game_id } => self.fetch_game(conn, game_id),
            ClientMessage::FetchHistory { user_id, batch } => self.fetch_history(conn, user_id, batch),
            message => {
                let Some(key) = player else {
                    self.reject(conn, code::BAD_REQUEST, "only players can do that");
                    return;
                };
                match message {
                    ClientMessage::Move { notation } => self.handle_move(key, notation),
                    ClientMessage::Chat { text } => self.handle_chat(key, text),
                    ClientMessage::OfferDraw => self.handle_offer_draw(key),
                    ClientMessage::RespondDraw { accept } => self.handle_respond_draw(key, accept),
                    ClientMessage::Resign => self.handle_resign(key),
                    ClientMessage::RequestRematch => self.handle_request_rematch(key),
                    ClientMessage::RespondRematch { accept } => self.handle_respond_rematch(key, accept),
                    ClientMessage::NewGame => self.handle_new_game(key),
                    _ => {}
                }
            }
        }
    }

    // -----------------------------------------------------------------------
    // Outbound
    // -----------------------------------------------------------------------

    pub(crate) fn send(&self, conn: ConnectionId, message: &ServerMessage) {
        match self.codec.encode(message) {
            Ok(bytes) => {
                if !self.hub.send(conn, bytes) {
                    debug!(conn_id = %conn, "send to closed connection dropped");
                }
            }
            Err(e) => error!(conn_id = %conn, error = %e, "failed to encode message"),
        }
    }

    /// Sends to a player's current connection, if it has one.
    pub(crate) fn send_to(&self, key: SessionKey, message: &ServerMessage) {
        if let Some(conn) = self.registry.get(key).and_then(|s| s.connection) {
            self.send(conn, message);
        }
    }

    pub(crate) fn publish(&self, topic: &str, message: &ServerMessage) {
        match self.codec.encode(message) {
            Ok(bytes) => {
                self.hub.publish(topic, &bytes);
            }
            Err(e) => error!(topic, error = %e, "failed to encode message"),
        }
    }

    /// Answers a request that isn't allowed. Nothing else changes.
    pub(crate) fn reject(&self, conn: ConnectionId, code: u16, message: &str) {
        warn!(conn_id = %conn, code, message, "request rejected");
        self.send(conn, &ServerMessage::error(code, message));
    }

    pub(crate) fn reject_player(&self, key: SessionKey, code: u16, message: &str) {
        if let Some(conn) = self.registry.get(key).and_then(|s| s.connection) {
            self.reject(conn, code, message);
        }
    }

    /// Sends a final error and closes the connection.
    pub(crate) fn refuse(&mut self, conn: ConnectionId, code: u16, message: &str) {
        self.reject(conn, code, message);
        if let Some(link) = self.links.remove(&conn) {
            link.cancel.cancel();
        }
        self.hub.close(conn);
    }

    // -----------------------------------------------------------------------
    // Blocking work
    // -----------------------------------------------------------------------

    /// Runs `work` against the store on a worker thread, then `done` back
    /// on the reactor with its result.
    ///
    /// If the worker pool is already shut down `done` runs immediately
    /// with [`StoreError::Unavailable`].
    pub(crate) fn submit<T, W, D>(&mut self, work: W, done: D)
    where
        T: Send + 'static,
        W: FnOnce(&dyn GameStore) -> Result<T, StoreError> + Send + 'static,
        D: FnOnce(&mut Context, Result<T, StoreError>) + Send + 'static,
    {
        if !self.workers.is_running() {
            done(self, Err(StoreError::Unavailable("worker pool stopped".into())));
            return;
        }

        let store = Arc::clone(&self.store);
        let marshal = self.marshal.clone();
        self.pending += 1;
        let task = move || {
            let result = panic::catch_unwind(AssertUnwindSafe(|| work(store.as_ref())))
                .unwrap_or_else(|_| Err(StoreError::Unavailable("store task panicked".into())));
            marshal.defer(move |ctx: &mut Context| {
                ctx.pending -= 1;
                done(ctx, result);
            });
        };
        if let Err(e) = self.workers.submit(task) {
            self.pending -= 1;
            error!(error = %e, "store task not submitted");
        }
    }

    // -----------------------------------------------------------------------
    // Shared helpers
    // -----------------------------------------------------------------------

    pub(crate) fn next_game_key(&mut self) -> GameKey {
        self.next_game += 1;
        GameKey::new(self.next_game)
    }

    /// Forgets a game whose seats are empty. Its spectators stop following
    /// the topic and stay connected as browsers.
    pub(crate) fn drop_game(&mut self, key: GameKey) {
        let Some(game) = self.games.remove(&key) else {
            return;
        };
        let topic = game.topic();
        for (&conn, link) in self.links.iter_mut() {
            if matches!(&link.role, Role::Spectator(t) if t == topic) {
                self.hub.unsubscribe(conn, topic);
                link.role = Role::Browser;
            }
        }
        debug!(game_id = %game.game_id(), "game dropped");
    }

    /// Sessions without a connection whose game no longer needs them are
    /// dropped, releasing their clocks.
    pub(crate) fn release_if_orphaned(&mut self, key: SessionKey) -> bool {
        let orphaned = self
            .registry
            .get(key)
            .is_some_and(|s| !s.is_connected() && !s.in_game);
        if orphaned {
            self.registry.remove(key);
            info!(session = %key, "session released");
        }
        orphaned
    }

    /// Stops the reactor loop after the current callback.
    pub fn stop(&mut self) {
        if !self.stopping {
            info!(
                sessions = self.registry.session_count(),
                games = self.games.len(),
                "reactor stopping"
            );
        }
        self.stopping = true;
        for (conn, link) in self.links.drain() {
            link.cancel.cancel();
            self.hub.close(conn);
        }
    }

    pub(crate) fn shutdown_workers(&self) {
        self.workers.shutdown();
    }

    // -----------------------------------------------------------------------
    // Introspection
    // -----------------------------------------------------------------------

    pub fn is_stopping(&self) -> bool {
        self.stopping
    }

    /// Store tasks still in flight.
    pub fn pending_tasks(&self) -> usize {
        self.pending
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn matchmaker(&self) -> &Matchmaker {
        &self.matchmaker
    }

    pub fn session(&self, key: SessionKey) -> Option<&PlayerSession> {
        self.registry.get(key)
    }

    /// The player session attached to `conn`, if it is a player connection.
    pub fn session_of(&self, conn: ConnectionId) -> Option<SessionKey> {
        match self.links.get(&conn)?.role {
            Role::Player(key) => Some(key),
            _ => None,
        }
    }

    pub fn game(&self, key: GameKey) -> Option<&GameSession> {
        self.games.get(&key)
    }

    /// The game a player is seated in.
    pub fn game_of(&self, player: SessionKey) -> Option<&GameSession> {
        self.registry
            .get(player)
            .and_then(|s| s.game)
            .and_then(|g| self.games.get(&g))
    }

    pub fn game_count(&self) -> usize {
        self.games.len()
    }

    pub fn connection_count(&self) -> usize {
        self.links.len()
    }

    /// Connections following a game's topic.
    pub fn subscribers(&self, topic: &str) -> usize {
        self.hub.subscribers(topic)
    }

    /// Store tasks not yet picked up by a worker.
    pub fn queued_tasks(&self) -> usize {
        self.workers.queued()
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("sessions", &self.registry.session_count())
            .field("games", &self.games.len())
            .field("connections", &self.links.len())
            .field("pending", &self.pending)
            .field("stopping", &self.stopping)
            .finish()
    }
}
