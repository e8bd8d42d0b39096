//! In-game handlers: moves, clocks, draws, resignation, results, rematches.

use std::time::Duration;

use castle_game::{GamePhase, GameSession, Outcome, Seating};
use castle_protocol::{ClockReading, Color, EndReason, GameId, RematchBlock, ServerMessage};
use castle_session::{GameKey, SessionKey};
use castle_store::{CompletedGame, Participant, StoreError};
use tracing::{debug, error, info, warn};

use crate::context::Context;
use crate::error::code;

/// Which of a player's two clocks fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockKind {
    /// Thinking time ran out.
    Move,
    /// A disconnected player did not come back in time.
    Abandonment,
}

impl Context {
    // -----------------------------------------------------------------------
    // Clocks
    // -----------------------------------------------------------------------

    /// Both players' remaining thinking time.
    pub(crate) fn clock_reading(&self, game: &GameSession) -> ClockReading {
        let move_time = self.config.move_time;
        let remaining = |color: Color| -> Duration {
            game.player(color)
                .and_then(|key| self.registry.get(key))
                .map_or(move_time, |s| s.move_remaining(move_time))
        };
        ClockReading::new(remaining(Color::White), remaining(Color::Black))
    }

    pub(crate) fn start_move_clock(&mut self, key: SessionKey) {
        self.arm(key, ClockKind::Move);
    }

    pub(crate) fn start_abandonment_clock(&mut self, key: SessionKey) {
        self.arm(key, ClockKind::Abandonment);
    }

    /// Starts one of `key`'s clocks. Its expiry comes back to
    /// [`on_clock_expired`](Self::on_clock_expired) tagged with the arm
    /// epoch and the game it was armed for.
    fn arm(&mut self, key: SessionKey, kind: ClockKind) {
        let move_time = self.config.move_time;
        let marshal = self.marshal.clone();
        let Some(session) = self.registry.get_mut(key) else {
            return;
        };
        let game = session.game;
        let clock = match kind {
            ClockKind::Move => session.move_clock_or_init(move_time),
            ClockKind::Abandonment => session.abandonment_clock_mut(),
        };
        clock.start(move |epoch| {
            marshal.defer(move |ctx: &mut Context| ctx.on_clock_expired(key, kind, epoch, game));
        });
    }

    /// A clock timer fired. Stale expiries (the clock was stopped, reset,
    /// or re-armed since, or the player has moved on to another game) are
    /// dropped.
    pub fn on_clock_expired(&mut self, key: SessionKey, kind: ClockKind, epoch: u64, armed_for: Option<GameKey>) {
        let Some(session) = self.registry.get_mut(key) else {
            debug!(session = %key, ?kind, "expiry for released session ignored");
            return;
        };
        let current = match kind {
            ClockKind::Move => session.move_clock_mut().is_some_and(|c| c.expire(epoch)),
            ClockKind::Abandonment => session.abandonment_clock_mut().expire(epoch),
        };
        if !current {
            return;
        }
        if session.game != armed_for {
            warn!(session = %key, ?kind, "clock expired for a game the player has left");
            return;
        }
        let Some(game_key) = armed_for else {
            return;
        };
        let Some(game) = self.games.get(&game_key).filter(|g| g.is_active()) else {
            return;
        };
        let Some(side) = game.side_of(key) else {
            return;
        };

        let winner = side.opposite();
        let outcome = match kind {
            ClockKind::Move if game.rules().has_insufficient_material(winner) => {
                Outcome::draw(EndReason::Timeout)
            }
            ClockKind::Move => Outcome::win(winner, EndReason::Timeout),
            ClockKind::Abandonment => Outcome::win(winner, EndReason::Abandonment),
        };
        info!(session = %key, game_id = %game.game_id(), ?kind, "clock expired");
        self.resolve(game_key, outcome);
    }

    /// Periodic broadcast of both clocks for every game in progress.
    pub fn sync_clocks(&self) {
        for game in self.games.values().filter(|g| g.is_active()) {
            let message = ServerMessage::TimeUpdate {
                clock: self.clock_reading(game),
            };
            for color in [Color::White, Color::Black] {
                if let Some(player) = game.player(color) {
                    self.send_to(player, &message);
                }
            }
            self.publish(game.topic(), &message);
        }
    }

    // -----------------------------------------------------------------------
    // Moves and chat
    // -----------------------------------------------------------------------

    /// The player's seat in an active game, or `None` if it has none.
    fn active_seat(&self, key: SessionKey) -> Option<(GameKey, Color)> {
        let session = self.registry.get(key)?;
        if !session.in_game {
            return None;
        }
        let game_key = session.game?;
        let game = self.games.get(&game_key).filter(|g| g.is_active())?;
        Some((game_key, game.side_of(key)?))
    }

    pub(crate) fn handle_move(&mut self, key: SessionKey, notation: String) {
        let reject = |ctx: &Context, reason: &str| {
            ctx.send_to(
                key,
                &ServerMessage::MoveRejected {
                    notation: notation.clone(),
                    reason: reason.to_string(),
                },
            );
        };

        let Some((game_key, color)) = self.active_seat(key) else {
            reject(self, "no game in progress");
            return;
        };
        if !self.registry.get(key).is_some_and(|s| s.is_my_turn) {
            reject(self, "not your turn");
            return;
        }
        let Some(game) = self.games.get_mut(&game_key) else {
            return;
        };
        let outcome = match game.apply_move(color, &notation) {
            Ok(outcome) => outcome,
            Err(e) => {
                debug!(session = %key, %notation, error = %e, "move rejected");
                reject(self, &e.to_string());
                return;
            }
        };
        let opponent = game.opponent_of(key);

        if let Some(session) = self.registry.get_mut(key) {
            session.is_my_turn = false;
            if let Some(clock) = session.move_clock_mut() {
                clock.stop();
            }
        }
        if let Some(opponent) = opponent {
            if let Some(session) = self.registry.get_mut(opponent) {
                session.is_my_turn = outcome.is_none();
            }
            if outcome.is_none() {
                self.start_move_clock(opponent);
            }
        }

        let Some(game) = self.games.get(&game_key) else {
            return;
        };
        let clock = self.clock_reading(game);
        let topic = game.topic().to_string();
        if let Some(game) = self.games.get_mut(&game_key) {
            game.record_clocks(clock);
        }

        let message = ServerMessage::MoveMade { notation, clock };
        if let Some(opponent) = opponent {
            self.send_to(opponent, &message);
        }
        self.publish(&topic, &message);

        if let Some(outcome) = outcome {
            self.resolve(game_key, outcome);
        }
    }

    pub(crate) fn handle_chat(&mut self, key: SessionKey, text: String) {
        let Some(opponent) = self.registry.get(key).and_then(|s| s.opponent) else {
            self.reject_player(key, code::FORBIDDEN, "nobody to talk to");
            return;
        };
        self.send_to(opponent, &ServerMessage::Chat { text });
    }

    // -----------------------------------------------------------------------
    // Draws and resignation
    // -----------------------------------------------------------------------

    /// Offers a draw, or withdraws the standing offer. Offering against the
    /// opponent's standing offer agrees to it.
    pub(crate) fn handle_offer_draw(&mut self, key: SessionKey) {
        let Some((game_key, _)) = self.active_seat(key) else {
            self.reject_player(key, code::FORBIDDEN, "no game in progress");
            return;
        };
        let opponent_offered = self
            .registry
            .get(key)
            .and_then(|s| s.opponent)
            .is_some_and(|o| self.registry.get(o).is_some_and(|s| s.draw_offered));
        if opponent_offered {
            // Both offered: that's an agreement.
            self.resolve(game_key, Outcome::draw(EndReason::Agreement));
            return;
        }
        let Some(session) = self.registry.get_mut(key) else {
            return;
        };
        session.draw_offered = !session.draw_offered;
        let (active, opponent) = (session.draw_offered, session.opponent);
        if let Some(opponent) = opponent {
            self.send_to(opponent, &ServerMessage::DrawOffered { active });
        }
    }

    /// Answers the opponent's draw offer. Without an offer standing this
    /// changes nothing.
    pub(crate) fn handle_respond_draw(&mut self, key: SessionKey, accept: bool) {
        let Some((game_key, _)) = self.active_seat(key) else {
            self.reject_player(key, code::FORBIDDEN, "no game in progress");
            return;
        };
        let offerer = self
            .registry
            .get(key)
            .and_then(|s| s.opponent)
            .filter(|&o| self.registry.get(o).is_some_and(|s| s.draw_offered));
        let Some(offerer) = offerer else {
            self.reject_player(key, code::FORBIDDEN, "no draw offer to answer");
            return;
        };

        if accept {
            self.resolve(game_key, Outcome::draw(EndReason::Agreement));
            return;
        }
        if let Some(session) = self.registry.get_mut(offerer) {
            session.draw_offered = false;
        }
        self.send_to(offerer, &ServerMessage::DrawDeclined);
    }

    pub(crate) fn handle_resign(&mut self, key: SessionKey) {
        let Some((game_key, color)) = self.active_seat(key) else {
            self.reject_player(key, code::FORBIDDEN, "no game in progress");
            return;
        };
        info!(session = %key, %color, "player resigned");
        self.resolve(game_key, Outcome::win(color.opposite(), EndReason::Resignation));
    }

    // -----------------------------------------------------------------------
    // Results
    // -----------------------------------------------------------------------

    /// Ends an active game with `outcome`: clocks stop, both players are
    /// released from it, everyone is told, and the result is written.
    ///
    /// A game that is no longer active is left alone, so racing end
    /// conditions (a resignation and a timeout in the same instant)
    /// produce one result.
    pub(crate) fn resolve(&mut self, game_key: GameKey, outcome: Outcome) {
        let fresh = (self.rules)();
        let Some(game) = self.games.get_mut(&game_key) else {
            return;
        };
        let resolution = match game.resolve(outcome, fresh) {
            Ok(resolution) => resolution,
            Err(e) => {
                debug!(game = %game_key, error = %e, "result already decided");
                return;
            }
        };
        let white_name = game.name(Color::White).to_string();
        let black_name = game.name(Color::Black).to_string();
        let topic = game.topic().to_string();

        let user_of = |key: Option<SessionKey>| key.and_then(|k| self.registry.get(k)).and_then(|s| s.user_id);
        let completed = CompletedGame {
            game_id: resolution.game_id,
            white: Participant::new(user_of(resolution.white), white_name),
            black: Participant::new(user_of(resolution.black), black_name),
            result: resolution.outcome.result,
            reason: resolution.outcome.reason,
            moves: resolution.moves.clone(),
            time_log: resolution.time_log.clone(),
        };

        for player in [resolution.white, resolution.black].into_iter().flatten() {
            if let Some(session) = self.registry.get_mut(player) {
                if let Some(clock) = session.move_clock_mut() {
                    clock.reset();
                }
                session.abandonment_clock_mut().reset();
                session.clear_game_flags();
                session.rematch_requested = false;
            }
            self.registry.deactivate(player);
        }
        self.registry.unregister_game(resolution.game_id);

        let message = ServerMessage::GameOver {
            game_id: resolution.game_id,
            result: resolution.outcome.result,
            reason: resolution.outcome.reason,
            white_score: resolution.white_score,
            black_score: resolution.black_score,
        };
        for player in [resolution.white, resolution.black].into_iter().flatten() {
            self.send_to(player, &message);
        }
        self.publish(&topic, &message);

        let game_id = resolution.game_id;
        self.submit(
            move |store| store.save_result(&completed),
            move |ctx: &mut Context, result| ctx.on_result_saved(game_key, game_id, result),
        );
    }

    /// The result write finished. In-memory state stands either way.
    /// Seats whose player is gone are released; a rematch agreed in the
    /// meantime starts now.
    pub(crate) fn on_result_saved(&mut self, game_key: GameKey, game_id: GameId, result: Result<(), StoreError>) {
        match result {
            Ok(()) => debug!(%game_id, "result saved"),
            Err(e) => error!(%game_id, error = %e, "result not saved"),
        }
        let Some(game) = self.games.get_mut(&game_key) else {
            return;
        };
        game.finish_persistence();

        for color in [Color::White, Color::Black] {
            let Some(game) = self.games.get_mut(&game_key) else {
                return;
            };
            let Some(player) = game.player(color) else {
                continue;
            };
            if !self.registry.get(player).is_some_and(|s| s.is_connected()) {
                game.detach(player);
                self.registry.remove(player);
                debug!(session = %player, %game_id, "departed player released");
            }
        }

        let Some(game) = self.games.get(&game_key) else {
            return;
        };
        if game.is_empty() {
            self.drop_game(game_key);
        } else if game.rematch_pending {
            self.launch_rematch(game_key);
        }
    }

    // -----------------------------------------------------------------------
    // Rematch
    // -----------------------------------------------------------------------

    /// The last opponent, if a rematch could be played against them now.
    fn rematch_partner(&self, key: SessionKey) -> Result<(GameKey, SessionKey), RematchBlock> {
        let session = self.registry.get(key).ok_or(RematchBlock::OpponentLeft)?;
        let game_key = session.game.ok_or(RematchBlock::OpponentLeft)?;
        let game = self.games.get(&game_key).ok_or(RematchBlock::OpponentLeft)?;
        let opponent = game.opponent_of(key).ok_or(RematchBlock::OpponentLeft)?;
        let theirs = self
            .registry
            .get(opponent)
            .filter(|s| s.is_connected())
            .ok_or(RematchBlock::OpponentLeft)?;
        if theirs.in_game || theirs.game != Some(game_key) {
            return Err(RematchBlock::OpponentBusy);
        }
        Ok((game_key, opponent))
    }

    pub(crate) fn handle_request_rematch(&mut self, key: SessionKey) {
        let Some(session) = self.registry.get(key) else {
            return;
        };
        if session.in_game || session.game.is_none() {
            self.reject_player(key, code::FORBIDDEN, "no finished game to rematch");
            return;
        }
        let (game_key, opponent) = match self.rematch_partner(key) {
            Ok(partner) => partner,
            Err(reason) => {
                self.send_to(key, &ServerMessage::RematchUnavailable { reason });
                return;
            }
        };

        if self.registry.get(opponent).is_some_and(|s| s.rematch_requested) {
            // Both asked: that's an agreement.
            self.agree_rematch(game_key, key, opponent);
            return;
        }
        if let Some(session) = self.registry.get_mut(key) {
            session.rematch_requested = true;
        }
        self.send_to(opponent, &ServerMessage::RematchOffered);
    }

    pub(crate) fn handle_respond_rematch(&mut self, key: SessionKey, accept: bool) {
        let requester = self
            .registry
            .get(key)
            .filter(|s| !s.in_game)
            .and_then(|s| s.opponent)
            .filter(|&o| self.registry.get(o).is_some_and(|s| s.rematch_requested));
        let Some(requester) = requester else {
            self.reject_player(key, code::FORBIDDEN, "no rematch request to answer");
            return;
        };

        if !accept {
            if let Some(session) = self.registry.get_mut(requester) {
                session.rematch_requested = false;
            }
            self.send_to(requester, &ServerMessage::RematchDeclined);
            return;
        }
        match self.rematch_partner(key) {
            Ok((game_key, opponent)) => self.agree_rematch(game_key, key, opponent),
            Err(reason) => self.send_to(key, &ServerMessage::RematchUnavailable { reason }),
        }
    }

    /// Both sides want another game. If the last result is still being
    /// written, the rematch waits for it.
    fn agree_rematch(&mut self, game_key: GameKey, a: SessionKey, b: SessionKey) {
        for player in [a, b] {
            if let Some(session) = self.registry.get_mut(player) {
                session.rematch_requested = false;
            }
        }
        let Some(game) = self.games.get_mut(&game_key) else {
            return;
        };
        if game.phase() == GamePhase::Resolving {
            debug!(game = %game_key, "rematch waits for the result write");
            game.rematch_pending = true;
            return;
        }
        self.launch_rematch(game_key);
    }

    /// Seats the same two players again with a fresh coin flip and asks
    /// the store for the new game's id.
    fn launch_rematch(&mut self, game_key: GameKey) {
        let Some(game) = self.games.get_mut(&game_key) else {
            return;
        };
        game.rematch_pending = false;
        let players = [game.player(Color::White), game.player(Color::Black)];
        let ready = players
            .iter()
            .all(|p| p.is_some_and(|k| self.registry.get(k).is_some_and(|s| s.is_connected())));
        let (true, [Some(a), Some(b)]) = (ready, players) else {
            for player in players.into_iter().flatten() {
                self.send_to(
                    player,
                    &ServerMessage::RematchUnavailable {
                        reason: RematchBlock::OpponentLeft,
                    },
                );
            }
            return;
        };

        let seats = Seating::flip(a, b, &mut rand::rng());
        self.seat_players(seats);
        let (Some(white), Some(black)) = (self.participant(seats.white), self.participant(seats.black)) else {
            return;
        };
        info!(game = %game_key, white = %seats.white, black = %seats.black, "rematch agreed");
        self.submit(
            move |store| store.create_game(&white, &black),
            move |ctx: &mut Context, result| ctx.on_rematch_created(game_key, seats, result),
        );
    }

    fn on_rematch_created(&mut self, game_key: GameKey, seats: Seating, result: Result<GameId, StoreError>) {
        let game_id = match result {
            Ok(id) => id,
            Err(e) => {
                error!(game = %game_key, error = %e, "rematch could not be created");
                self.abort_rematch(game_key, seats, "game could not be stored");
                return;
            }
        };
        let seated = [seats.white, seats.black].iter().all(|&k| {
            self.registry
                .get(k)
                .is_some_and(|s| s.is_connected() && s.game == Some(game_key))
        });
        if !seated {
            warn!(%game_id, "player left before the rematch started");
            self.abort_rematch(game_key, seats, "opponent left");
            return;
        }

        let white = (seats.white, self.display_name(seats.white));
        let black = (seats.black, self.display_name(seats.black));
        let initial = ClockReading::even(self.config.move_time);
        let Some(game) = self.games.get_mut(&game_key) else {
            return;
        };
        if let Err(e) = game.begin_rematch(game_id, white, black, initial) {
            error!(game = %game_key, error = %e, "rematch could not start");
            self.abort_rematch(game_key, seats, "game could not start");
            return;
        }
        self.announce_start(game_key, seats);
    }

    /// Like a failed pairing, but a departed player also gives up its seat.
    fn abort_rematch(&mut self, game_key: GameKey, seats: Seating, reason: &str) {
        for player in [seats.white, seats.black] {
            let connected = self.registry.get(player).is_some_and(|s| s.is_connected());
            if !connected {
                if let Some(game) = self.games.get_mut(&game_key) {
                    game.detach(player);
                }
            }
        }
        self.abort_match(seats, reason);
        if self.games.get(&game_key).is_some_and(|g| g.is_empty()) {
            self.drop_game(game_key);
        }
    }
}
