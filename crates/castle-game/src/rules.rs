//! The `Rules` trait, the seam between a game session and a rules engine.

use std::sync::Arc;

use castle_protocol::{Color, EndReason, GameResult};

use crate::IllegalMove;

/// A rules engine for one game in progress.
///
/// One instance is shared by both sides of a [`GameSession`](crate::GameSession)
/// and replaced with a fresh one when the game ends. The game session
/// tracks whose turn it is; the engine only validates and records moves.
///
/// `Send + 'static` so a session (and the engine inside it) can be built
/// on one thread and handed to the reactor.
pub trait Rules: Send + 'static {
    /// Applies `notation` for the side to move, or refuses it.
    fn apply_move(&mut self, notation: &str) -> Result<(), IllegalMove>;

    /// Whether the position after the last move ends the game.
    fn is_game_over(&self) -> bool;

    /// Whether `color` has been checkmated.
    fn is_checkmate(&self, color: Color) -> bool;

    fn is_stalemate(&self) -> bool;

    /// Draw because neither side can possibly mate.
    fn is_insufficient_material(&self) -> bool;

    /// Draw by threefold repetition.
    fn is_repetition(&self) -> bool;

    /// Draw by the fifty-move rule.
    fn is_fifty_move(&self) -> bool;

    /// Whether `color` alone lacks the material to ever mate.
    ///
    /// Decides whether running out of time loses or only draws.
    fn has_insufficient_material(&self, color: Color) -> bool;

    /// Every move so far, space separated.
    fn move_history(&self) -> String;
}

/// Builds a fresh engine for each new game.
pub type RulesFactory = Arc<dyn Fn() -> Box<dyn Rules> + Send + Sync>;

/// How a game ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Outcome {
    pub result: GameResult,
    pub reason: EndReason,
}

impl Outcome {
    pub fn new(result: GameResult, reason: EndReason) -> Self {
        Self { result, reason }
    }

    /// `winner` wins for `reason`.
    pub fn win(winner: Color, reason: EndReason) -> Self {
        Self::new(GameResult::win_for(winner), reason)
    }

    pub fn draw(reason: EndReason) -> Self {
        Self::new(GameResult::Draw, reason)
    }
}

/// Decides the outcome of a game the engine reports as over, right after
/// `mover` made the last move.
///
/// A mated opponent means `mover` won. Anything else is a draw, checked in
/// the order stalemate, insufficient material, repetition, fifty moves.
pub fn classify(rules: &dyn Rules, mover: Color) -> Outcome {
    if rules.is_checkmate(mover.opposite()) {
        return Outcome::win(mover, EndReason::Checkmate);
    }
    let reason = if rules.is_stalemate() {
        EndReason::Stalemate
    } else if rules.is_insufficient_material() {
        EndReason::InsufficientMaterial
    } else if rules.is_repetition() {
        EndReason::Repetition
    } else if rules.is_fifty_move() {
        EndReason::FiftyMoveRule
    } else {
        // Over, but not for any reason the engine names.
        EndReason::Stalemate
    };
    Outcome::draw(reason)
}
