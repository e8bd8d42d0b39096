//! A game between two player sessions, and its result state machine.

use std::fmt;

use castle_protocol::{ClockReading, Color, GameId};
use castle_session::{GameKey, SessionKey};
use tracing::{debug, info};

use crate::{GameError, Outcome, Rules, classify};

// ---------------------------------------------------------------------------
// GamePhase
// ---------------------------------------------------------------------------

/// Where a game session is in its result cycle.
///
/// ```text
///   Active ──resolve──→ Resolving ──finish_persistence──→ Idle
///     ↑                                                    │
///     └────────────────────── begin_rematch ───────────────┘
/// ```
///
/// Moves are only accepted while `Active`. `Resolving` covers the window
/// in which the result is being written; a rematch can only begin once
/// that write has come back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GamePhase {
    Active,
    Resolving,
    Idle,
}

impl fmt::Display for GamePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Active => write!(f, "active"),
            Self::Resolving => write!(f, "resolving"),
            Self::Idle => write!(f, "idle"),
        }
    }
}

// ---------------------------------------------------------------------------
// Resolution
// ---------------------------------------------------------------------------

/// Everything captured from a game at the moment it ended, ready to be
/// announced and persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub game_id: GameId,
    pub outcome: Outcome,
    pub moves: String,
    /// `white-black` remaining seconds per reading, space separated.
    pub time_log: String,
    pub white: Option<SessionKey>,
    pub black: Option<SessionKey>,
    pub white_score: f64,
    pub black_score: f64,
}

// ---------------------------------------------------------------------------
// GameSession
// ---------------------------------------------------------------------------

/// Two seated players, a rules engine, and the running score between them.
///
/// One `GameSession` lives across any number of rematches. Each game gets
/// a new [`GameId`], but the session keeps its [`GameKey`], its spectator
/// topic, and its scores; only the seat pointers and per-game fields are
/// replaced in place.
pub struct GameSession {
    key: GameKey,
    game_id: GameId,
    /// Spectator topic. Fixed at the first game's id.
    topic: String,
    white: Option<SessionKey>,
    black: Option<SessionKey>,
    white_name: String,
    black_name: String,
    white_score: f64,
    black_score: f64,
    rules: Box<dyn Rules>,
    turn: Color,
    time_log: Vec<ClockReading>,
    phase: GamePhase,
    /// A rematch was agreed while the previous result was still being
    /// written. It starts when that write completes.
    pub rematch_pending: bool,
}

impl GameSession {
    /// Creates an active game. `game_id` must come from the store.
    pub fn new(
        key: GameKey,
        game_id: GameId,
        (white, white_name): (SessionKey, String),
        (black, black_name): (SessionKey, String),
        rules: Box<dyn Rules>,
        initial: ClockReading,
    ) -> Self {
        info!(game = %key, %game_id, %white, %black, "game started");
        Self {
            key,
            game_id,
            topic: game_id.topic(),
            white: Some(white),
            black: Some(black),
            white_name,
            black_name,
            white_score: 0.0,
            black_score: 0.0,
            rules,
            turn: Color::White,
            time_log: vec![initial],
            phase: GamePhase::Active,
            rematch_pending: false,
        }
    }

    /// Applies `mover`'s move.
    ///
    /// Returns the outcome if the move ended the game. The caller then
    /// passes it to [`resolve`](Self::resolve). On error nothing changes.
    pub fn apply_move(&mut self, mover: Color, notation: &str) -> Result<Option<Outcome>, GameError> {
        if self.phase != GamePhase::Active {
            return Err(GameError::NotActive(self.phase));
        }
        if mover != self.turn {
            return Err(GameError::NotYourTurn(mover));
        }
        self.rules.apply_move(notation)?;
        self.turn = mover.opposite();
        debug!(game_id = %self.game_id, %mover, notation, "move applied");

        if self.rules.is_game_over() {
            return Ok(Some(classify(self.rules.as_ref(), mover)));
        }
        Ok(None)
    }

    /// Appends a clock reading to the time log.
    pub fn record_clocks(&mut self, reading: ClockReading) {
        self.time_log.push(reading);
    }

    /// Ends the game: updates the score, captures the record, and swaps
    /// in `fresh` rules for a possible rematch.
    ///
    /// Only an active game can be resolved, so a result is applied at most
    /// once per game.
    pub fn resolve(&mut self, outcome: Outcome, fresh: Box<dyn Rules>) -> Result<Resolution, GameError> {
        if self.phase != GamePhase::Active {
            return Err(GameError::NotActive(self.phase));
        }
        match outcome.result.winner() {
            Some(Color::White) => self.white_score += 1.0,
            Some(Color::Black) => self.black_score += 1.0,
            None => {
                self.white_score += 0.5;
                self.black_score += 0.5;
            }
        }

        let moves = self.rules.move_history();
        let time_log = self
            .time_log
            .iter()
            .map(ClockReading::log_entry)
            .collect::<Vec<_>>()
            .join(" ");
        self.rules = fresh;
        self.phase = GamePhase::Resolving;

        info!(
            game_id = %self.game_id,
            result = ?outcome.result,
            reason = %outcome.reason,
            white_score = self.white_score,
            black_score = self.black_score,
            "game resolved"
        );

        Ok(Resolution {
            game_id: self.game_id,
            outcome,
            moves,
            time_log,
            white: self.white,
            black: self.black,
            white_score: self.white_score,
            black_score: self.black_score,
        })
    }

    /// The result write came back (either way). `Resolving → Idle`.
    pub fn finish_persistence(&mut self) {
        if self.phase == GamePhase::Resolving {
            self.phase = GamePhase::Idle;
        }
    }

    /// Starts the next game on this session with new seats.
    ///
    /// Keeps the key, topic, and scores. Scores stay attached to the
    /// seat colors' players by swapping them along with a color swap.
    pub fn begin_rematch(
        &mut self,
        game_id: GameId,
        (white, white_name): (SessionKey, String),
        (black, black_name): (SessionKey, String),
        initial: ClockReading,
    ) -> Result<(), GameError> {
        if self.phase != GamePhase::Idle {
            return Err(GameError::NotIdle(self.phase));
        }
        if self.white != Some(white) {
            // Colors swapped: scores follow the players.
            std::mem::swap(&mut self.white_score, &mut self.black_score);
        }
        self.game_id = game_id;
        self.white = Some(white);
        self.black = Some(black);
        self.white_name = white_name;
        self.black_name = black_name;
        self.turn = Color::White;
        self.time_log = vec![initial];
        self.phase = GamePhase::Active;
        self.rematch_pending = false;
        info!(game = %self.key, %game_id, topic = %self.topic, "rematch started");
        Ok(())
    }

    /// Removes `player` from its seat. Returns `false` if it wasn't seated.
    pub fn detach(&mut self, player: SessionKey) -> bool {
        if self.white == Some(player) {
            self.white = None;
        } else if self.black == Some(player) {
            self.black = None;
        } else {
            return false;
        }
        debug!(game = %self.key, session = %player, "player detached");
        true
    }

    /// Whether neither seat is occupied any more.
    pub fn is_empty(&self) -> bool {
        self.white.is_none() && self.black.is_none()
    }

    pub fn side_of(&self, player: SessionKey) -> Option<Color> {
        if self.white == Some(player) {
            Some(Color::White)
        } else if self.black == Some(player) {
            Some(Color::Black)
        } else {
            None
        }
    }

    pub fn player(&self, color: Color) -> Option<SessionKey> {
        match color {
            Color::White => self.white,
            Color::Black => self.black,
        }
    }

    pub fn opponent_of(&self, player: SessionKey) -> Option<SessionKey> {
        self.side_of(player).and_then(|c| self.player(c.opposite()))
    }

    pub fn name(&self, color: Color) -> &str {
        match color {
            Color::White => &self.white_name,
            Color::Black => &self.black_name,
        }
    }

    pub fn score(&self, color: Color) -> f64 {
        match color {
            Color::White => self.white_score,
            Color::Black => self.black_score,
        }
    }

    pub fn rules(&self) -> &dyn Rules {
        self.rules.as_ref()
    }

    pub fn moves(&self) -> String {
        self.rules.move_history()
    }

    pub fn key(&self) -> GameKey {
        self.key
    }

    pub fn game_id(&self) -> GameId {
        self.game_id
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn phase(&self) -> GamePhase {
        self.phase
    }

    pub fn is_active(&self) -> bool {
        self.phase == GamePhase::Active
    }

    pub fn turn(&self) -> Color {
        self.turn
    }

    pub fn time_log(&self) -> &[ClockReading] {
        &self.time_log
    }
}

impl fmt::Debug for GameSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GameSession")
            .field("key", &self.key)
            .field("game_id", &self.game_id)
            .field("topic", &self.topic)
            .field("white", &self.white)
            .field("black", &self.black)
            .field("phase", &self.phase)
            .field("turn", &self.turn)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use castle_protocol::{EndReason, GameResult};

    use super::*;
    use crate::ScriptedRules;

    const W: SessionKey = SessionKey::new(1);
    const B: SessionKey = SessionKey::new(2);

    fn game() -> GameSession {
        GameSession::new(
            GameKey::new(1),
            GameId(10),
            (W, "white".into()),
            (B, "black".into()),
            Box::new(ScriptedRules::new()),
            ClockReading::even(Duration::from_secs(300)),
        )
    }

    fn fresh() -> Box<dyn Rules> {
        Box::new(ScriptedRules::new())
    }

    // =====================================================================
    // apply_move()
    // =====================================================================

    #[test]
    fn test_apply_move_alternates_turns() {
        let mut g = game();
        assert_eq!(g.apply_move(Color::White, "e4"), Ok(None));
        assert_eq!(g.turn(), Color::Black);
        assert_eq!(g.apply_move(Color::Black, "e5"), Ok(None));
        assert_eq!(g.moves(), "e4 e5");
    }

    #[test]
    fn test_apply_move_wrong_side_is_rejected() {
        let mut g = game();
        assert_eq!(
            g.apply_move(Color::Black, "e5"),
            Err(GameError::NotYourTurn(Color::Black))
        );
        assert_eq!(g.moves(), "");
    }

    #[test]
    fn test_apply_move_illegal_leaves_turn() {
        let mut g = game();
        assert!(matches!(
            g.apply_move(Color::White, "?x"),
            Err(GameError::Illegal(_))
        ));
        assert_eq!(g.turn(), Color::White);
    }

    #[test]
    fn test_apply_move_mate_returns_outcome() {
        let mut g = game();
        g.apply_move(Color::White, "e4").unwrap();
        let outcome = g.apply_move(Color::Black, "Qh4#").unwrap();
        assert_eq!(outcome, Some(Outcome::win(Color::Black, EndReason::Checkmate)));
    }

    // =====================================================================
    // resolve()
    // =====================================================================

    #[test]
    fn test_resolve_win_scores_one_zero() {
        let mut g = game();
        g.apply_move(Color::White, "e4").unwrap();
        g.record_clocks(ClockReading::new(Duration::from_secs(290), Duration::from_secs(300)));

        let r = g.resolve(Outcome::win(Color::White, EndReason::Resignation), fresh()).unwrap();
        assert_eq!(r.white_score, 1.0);
        assert_eq!(r.black_score, 0.0);
        assert_eq!(r.moves, "e4");
        assert_eq!(r.time_log, "300-300 290-300");
        assert_eq!(g.phase(), GamePhase::Resolving);
        // The engine was replaced.
        assert_eq!(g.moves(), "");
    }

    #[test]
    fn test_resolve_draw_splits_point() {
        let mut g = game();
        let r = g.resolve(Outcome::draw(EndReason::Agreement), fresh()).unwrap();
        assert_eq!((r.white_score, r.black_score), (0.5, 0.5));
        assert_eq!(r.outcome.result, GameResult::Draw);
    }

    #[test]
    fn test_resolve_twice_second_is_rejected() {
        let mut g = game();
        g.resolve(Outcome::win(Color::Black, EndReason::Resignation), fresh()).unwrap();
        let again = g.resolve(Outcome::win(Color::Black, EndReason::Resignation), fresh());
        assert_eq!(again, Err(GameError::NotActive(GamePhase::Resolving)));
        assert_eq!(g.score(Color::Black), 1.0);
    }

    #[test]
    fn test_moves_rejected_after_resolve() {
        let mut g = game();
        g.resolve(Outcome::draw(EndReason::Agreement), fresh()).unwrap();
        assert!(matches!(
            g.apply_move(Color::White, "e4"),
            Err(GameError::NotActive(_))
        ));
    }

    // =====================================================================
    // rematch
    // =====================================================================

    #[test]
    fn test_begin_rematch_requires_idle() {
        let mut g = game();
        g.resolve(Outcome::draw(EndReason::Agreement), fresh()).unwrap();
        let initial = ClockReading::even(Duration::from_secs(300));

        let early = g.begin_rematch(GameId(11), (B, "b".into()), (W, "w".into()), initial);
        assert_eq!(early, Err(GameError::NotIdle(GamePhase::Resolving)));

        g.finish_persistence();
        g.begin_rematch(GameId(11), (B, "b".into()), (W, "w".into()), initial)
            .unwrap();
        assert_eq!(g.phase(), GamePhase::Active);
        assert_eq!(g.game_id(), GameId(11));
    }

    #[test]
    fn test_begin_rematch_keeps_topic_and_swaps_scores_with_colors() {
        let mut g = game();
        g.resolve(Outcome::win(Color::White, EndReason::Resignation), fresh()).unwrap();
        g.finish_persistence();

        // The previous white player now plays black.
        g.begin_rematch(
            GameId(42),
            (B, "b".into()),
            (W, "w".into()),
            ClockReading::even(Duration::from_secs(300)),
        )
        .unwrap();

        assert_eq!(g.topic(), "10");
        assert_eq!(g.key(), GameKey::new(1));
        assert_eq!(g.player(Color::White), Some(B));
        assert_eq!(g.score(Color::Black), 1.0);
        assert_eq!(g.score(Color::White), 0.0);
        assert_eq!(g.turn(), Color::White);
        assert_eq!(g.time_log().len(), 1);
    }

    // =====================================================================
    // seats
    // =====================================================================

    #[test]
    fn test_detach_until_empty() {
        let mut g = game();
        assert_eq!(g.opponent_of(W), Some(B));
        assert!(g.detach(W));
        assert!(!g.detach(W));
        assert_eq!(g.opponent_of(B), None);
        assert!(!g.is_empty());
        assert!(g.detach(B));
        assert!(g.is_empty());
    }
}
