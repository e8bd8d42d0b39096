//! Connections coming and going: admission, matchmaking, game creation,
//! reconnects and departures.

use castle_exec::CancelFlag;
use castle_game::{GamePhase, GameSession, Outcome, Pairing, Seating};
use castle_protocol::{ClockReading, Color, EndReason, GameId, QueueKind, RematchBlock, ServerMessage};
use castle_session::{GameKey, Identity, PlayerSession, SessionError, SessionKey};
use castle_store::{Participant, StoreError};
use castle_transport::{ConnectionId, Outbound};
use tracing::{debug, error, info, warn};

use crate::context::{Admission, Context, Link, Role};
use crate::error::code;

impl Context {
    /// A connection finished its hello. Attaches its outbound link and
    /// admits it as a player, spectator, or browser.
    pub fn on_open(&mut self, link: Outbound, admission: Admission, cancel: CancelFlag) {
        let conn = link.id();
        if self.is_stopping() {
            link.close();
            return;
        }
        self.hub.attach(link);
        self.links.insert(
            conn,
            Link {
                role: Role::Browser,
                cancel,
            },
        );
        debug!(conn_id = %conn, ?admission, "connection admitted");

        match admission {
            Admission::Play { identity, queue } => self.admit_player(conn, identity, queue),
            Admission::Watch { game_id } => self.admit_spectator(conn, game_id),
            Admission::Browse => {}
        }
    }

    /// A connection closed (or failed). Always the last thing that happens
    /// for a connection id.
    pub fn on_close(&mut self, conn: ConnectionId) {
        self.hub.detach(conn);
        let Some(link) = self.links.remove(&conn) else {
            return;
        };
        link.cancel.cancel();
        debug!(conn_id = %conn, role = ?link.role, "connection closed");

        if let Role::Player(key) = link.role {
            self.player_left(key, conn);
        }
    }

    fn admit_player(&mut self, conn: ConnectionId, identity: Option<Identity>, queue: QueueKind) {
        if queue == QueueKind::Ranked && identity.is_none() {
            self.refuse(conn, code::UNAUTHORIZED, "ranked play requires a token");
            return;
        }

        if let Some(user) = identity.as_ref().map(|i| i.user_id) {
            if let Some(key) = self.registry.take_disconnected(user) {
                self.reconnect(conn, key);
                return;
            }
            let existing = self
                .registry
                .session_of_user(user)
                .and_then(|key| self.registry.get(key).map(|s| (key, s.is_connected(), s.in_game)));
            if let Some((key, connected, in_game)) = existing {
                if connected {
                    self.refuse(conn, code::CONFLICT, "already connected");
                    return;
                }
                if in_game {
                    self.reattach(conn, key);
                    return;
                }
            }
        }

        let key = self.registry.next_key();
        let grace = self.config.abandonment_grace;
        self.registry
            .insert(PlayerSession::new(key, identity, queue, conn, grace));
        if let Some(link) = self.links.get_mut(&conn) {
            link.role = Role::Player(key);
        }
        self.enqueue(key, queue);
    }

    /// Hands a session that lost its connection while the store was
    /// creating its game to the player's new connection. The start
    /// message follows once the game exists.
    fn reattach(&mut self, conn: ConnectionId, key: SessionKey) {
        let Some(session) = self.registry.get_mut(key) else {
            return;
        };
        session.connection = Some(conn);
        if let Some(link) = self.links.get_mut(&conn) {
            link.role = Role::Player(key);
        }
        info!(session = %key, conn_id = %conn, "player reattached while game is created");
    }

    fn admit_spectator(&mut self, conn: ConnectionId, game_id: GameId) {
        let Some(game) = self
            .registry
            .live_game(game_id)
            .and_then(|key| self.games.get(&key))
        else {
            self.reject(conn, code::NOT_FOUND, "no such live game");
            return;
        };

        let topic = game.topic().to_string();
        let snapshot = ServerMessage::Spectate {
            game_id: game.game_id(),
            white: game.name(Color::White).to_string(),
            black: game.name(Color::Black).to_string(),
            moves: game.moves(),
            clock: self.clock_reading(game),
            white_score: game.score(Color::White),
            black_score: game.score(Color::Black),
        };

        self.hub.subscribe(conn, &topic);
        if let Some(link) = self.links.get_mut(&conn) {
            link.role = Role::Spectator(topic);
        }
        self.send(conn, &snapshot);
        debug!(conn_id = %conn, %game_id, "spectator joined");
    }

    // -----------------------------------------------------------------------
    // Matchmaking
    // -----------------------------------------------------------------------

    pub(crate) fn enqueue(&mut self, key: SessionKey, queue: QueueKind) {
        match self.matchmaker.enqueue_or_match(key, queue) {
            Some(pairing) => self.start_match(pairing),
            None => self.send_to(key, &ServerMessage::Queued { queue }),
        }
    }

    /// Seats a fresh pairing and asks the store for a game id. The game
    /// itself is created when the id comes back.
    fn start_match(&mut self, pairing: Pairing) {
        let seats = pairing.seat(&mut rand::rng());
        info!(
            white = %seats.white,
            black = %seats.black,
            queue = %pairing.queue,
            "players matched"
        );
        self.seat_players(seats);

        let (Some(white), Some(black)) = (self.participant(seats.white), self.participant(seats.black)) else {
            return;
        };
        self.submit(
            move |store| store.create_game(&white, &black),
            move |ctx: &mut Context, result| ctx.on_game_created(seats, result),
        );
    }

    /// Gives both players their color and a full move clock.
    pub(crate) fn seat_players(&mut self, seats: Seating) {
        let move_time = self.config.move_time;
        for (key, color, opponent) in [
            (seats.white, Color::White, seats.black),
            (seats.black, Color::Black, seats.white),
        ] {
            if let Some(session) = self.registry.get_mut(key) {
                session.seat(color, opponent);
                session.move_clock_or_init(move_time).reset();
            }
        }
    }

    pub(crate) fn participant(&self, key: SessionKey) -> Option<Participant> {
        let session = self.registry.get(key)?;
        Some(Participant::new(session.user_id, session.name()))
    }

    /// The store answered a new pairing's `create_game`.
    pub(crate) fn on_game_created(&mut self, seats: Seating, result: Result<GameId, StoreError>) {
        let game_id = match result {
            Ok(id) => id,
            Err(e) => {
                error!(white = %seats.white, black = %seats.black, error = %e, "game could not be created");
                self.abort_match(seats, "game could not be stored");
                return;
            }
        };
        if !self.both_connected(seats) {
            warn!(%game_id, "player left before the game started");
            self.abort_match(seats, "opponent left");
            return;
        }

        let key = self.next_game_key();
        let white_name = self.display_name(seats.white);
        let black_name = self.display_name(seats.black);
        let game = GameSession::new(
            key,
            game_id,
            (seats.white, white_name),
            (seats.black, black_name),
            (self.rules)(),
            ClockReading::even(self.config.move_time),
        );
        self.games.insert(key, game);
        self.announce_start(key, seats);
    }

    /// Links both players to the game, registers it as live, and tells
    /// everyone it started. White's clock starts running.
    pub(crate) fn announce_start(&mut self, key: GameKey, seats: Seating) {
        let Some(game) = self.games.get(&key) else {
            return;
        };
        let game_id = game.game_id();
        let topic = game.topic().to_string();
        let clock = ClockReading::even(self.config.move_time);
        let white_name = game.name(Color::White).to_string();
        let black_name = game.name(Color::Black).to_string();

        for player in [seats.white, seats.black] {
            if let Some(session) = self.registry.get_mut(player) {
                session.game = Some(key);
            }
            if let Err(e) = self.registry.mark_active(player) {
                match e {
                    SessionError::Anonymous(_) => {}
                    e => warn!(session = %player, error = %e, "could not mark player active"),
                }
            }
        }
        self.registry.register_game(game_id, key);

        self.send_to(
            seats.white,
            &ServerMessage::StartGame {
                game_id,
                color: Color::White,
                opponent: black_name.clone(),
                clock,
            },
        );
        self.send_to(
            seats.black,
            &ServerMessage::StartGame {
                game_id,
                color: Color::Black,
                opponent: white_name.clone(),
                clock,
            },
        );
        self.publish(
            &topic,
            &ServerMessage::GameStarted {
                game_id,
                white: white_name,
                black: black_name,
                clock,
            },
        );
        self.start_move_clock(seats.white);
    }

    /// A matched pair that will not get its game: both are unmatched and
    /// told, and a side that already left is released.
    pub(crate) fn abort_match(&mut self, seats: Seating, reason: &str) {
        for player in [seats.white, seats.black] {
            let Some(session) = self.registry.get_mut(player) else {
                continue;
            };
            session.clear_game_flags();
            session.opponent = None;
            if let Some(clock) = session.move_clock_mut() {
                clock.reset();
            }
            self.send_to(
                player,
                &ServerMessage::GameAborted {
                    reason: reason.to_string(),
                },
            );
            self.release_if_orphaned(player);
        }
    }

    fn both_connected(&self, seats: Seating) -> bool {
        [seats.white, seats.black]
            .iter()
            .all(|&k| self.registry.get(k).is_some_and(|s| s.is_connected()))
    }

    pub(crate) fn display_name(&self, key: SessionKey) -> String {
        self.registry
            .get(key)
            .map_or_else(|| "anonymous".to_string(), |s| s.name().to_string())
    }

    // -----------------------------------------------------------------------
    // Leaving and coming back
    // -----------------------------------------------------------------------

    fn player_left(&mut self, key: SessionKey, conn: ConnectionId) {
        let Some(session) = self.registry.get_mut(key) else {
            return;
        };
        if session.connection != Some(conn) {
            // Superseded by a reconnect.
            return;
        }
        session.connection = None;
        let (in_game, game_key, anonymous) = (session.in_game, session.game, session.is_anonymous());

        if self.matchmaker.cancel(key).is_some() {
            self.registry.remove(key);
            return;
        }

        let game_active = game_key
            .and_then(|g| self.games.get(&g))
            .is_some_and(|g| g.is_active());

        if in_game && game_active {
            let Some(game_key) = game_key else { return };
            if anonymous {
                let side = self.games.get(&game_key).and_then(|g| g.side_of(key));
                if let Some(side) = side {
                    info!(session = %key, "anonymous player left mid-game, forfeiting");
                    self.resolve(game_key, Outcome::win(side.opposite(), EndReason::Abandonment));
                }
                return;
            }
            if let Err(e) = self.registry.mark_disconnected(key) {
                warn!(session = %key, error = %e, "could not retain disconnected player");
            }
            let opponent = self.registry.get(key).and_then(|s| s.opponent);
            if let Some(opponent) = opponent {
                self.send_to(opponent, &ServerMessage::PeerLeft);
            }
            self.start_abandonment_clock(key);
            info!(session = %key, grace_s = self.config.abandonment_grace.as_secs(), "player disconnected mid-game");
            return;
        }

        if in_game {
            // Waiting on the store for a game or a rematch; that
            // completion releases the session.
            return;
        }

        self.leave_finished_game(key);
        self.registry.remove(key);
    }

    /// An identified player came back within the grace period.
    fn reconnect(&mut self, conn: ConnectionId, key: SessionKey) {
        let Some(session) = self.registry.get_mut(key) else {
            return;
        };
        session.connection = Some(conn);
        session.abandonment_clock_mut().reset();
        let in_game = session.in_game;
        let opponent = session.opponent;
        if let Some(link) = self.links.get_mut(&conn) {
            link.role = Role::Player(key);
        }
        if in_game {
            if let Err(e) = self.registry.mark_active(key) {
                warn!(session = %key, error = %e, "could not reactivate player");
            }
        }
        info!(session = %key, conn_id = %conn, "player reconnected");

        if let Some(opponent) = opponent {
            self.send_to(opponent, &ServerMessage::PeerReturned);
        }
        self.send_resync(key);
    }

    fn send_resync(&self, key: SessionKey) {
        let Some(session) = self.registry.get(key) else {
            return;
        };
        let move_time = self.config.move_time;
        let message = match self.game_of(key) {
            Some(game) => ServerMessage::Resync {
                game_id: Some(game.game_id()),
                color: session.color,
                your_turn: session.is_my_turn,
                moves: game.moves(),
                clock: self.clock_reading(game),
                white_score: game.score(Color::White),
                black_score: game.score(Color::Black),
            },
            None => ServerMessage::Resync {
                game_id: None,
                color: None,
                your_turn: false,
                moves: String::new(),
                clock: ClockReading::even(move_time),
                white_score: 0.0,
                black_score: 0.0,
            },
        };
        self.send_to(key, &message);
    }

    /// `new-game`: leave the finished game and go back into matchmaking.
    pub(crate) fn handle_new_game(&mut self, key: SessionKey) {
        let Some(session) = self.registry.get(key) else {
            return;
        };
        if session.in_game {
            self.reject_player(key, code::FORBIDDEN, "finish the current game first");
            return;
        }
        if self.matchmaker.is_waiting(key) {
            self.reject_player(key, code::FORBIDDEN, "already queued");
            return;
        }
        let queue = session.queue;

        self.leave_finished_game(key);
        if let Some(session) = self.registry.get_mut(key) {
            session.leave_game();
        }
        debug!(session = %key, %queue, "player requeued");
        self.enqueue(key, queue);
    }

    /// Gives up the seat in a finished game. The game is dropped once both
    /// seats are empty, unless its result is still being written. An
    /// opponent waiting on a rematch answer is told it won't come.
    fn leave_finished_game(&mut self, key: SessionKey) {
        let Some(game_key) = self.registry.get(key).and_then(|s| s.game) else {
            return;
        };
        let Some(game) = self.games.get_mut(&game_key) else {
            return;
        };
        let opponent = game.opponent_of(key);
        game.detach(key);
        if game.is_empty() && game.phase() != GamePhase::Resolving {
            self.drop_game(game_key);
        }

        let waiting = opponent.filter(|&o| self.registry.get(o).is_some_and(|s| s.rematch_requested));
        if let Some(opponent) = waiting {
            if let Some(session) = self.registry.get_mut(opponent) {
                session.rematch_requested = false;
            }
            self.send_to(
                opponent,
                &ServerMessage::RematchUnavailable {
                    reason: RematchBlock::OpponentLeft,
                },
            );
        }
    }
}
