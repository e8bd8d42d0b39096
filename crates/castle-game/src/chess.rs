//! Standard chess via `shakmaty`.
//!
//! Moves are exchanged in UCI notation (`e2e4`, `e7e8q`, `e1g1`).

use std::collections::HashMap;
use std::sync::Arc;

use castle_protocol::Color;
use shakmaty::uci::UciMove;
use shakmaty::{Chess, EnPassantMode, Position};

use crate::{IllegalMove, Rules, RulesFactory};

/// Halfmoves without a capture or pawn move that end the game.
const FIFTY_MOVE_PLIES: u32 = 100;

/// A chess game from the standard starting position.
#[derive(Debug, Clone)]
pub struct ChessRules {
    pos: Chess,
    history: Vec<String>,
    /// How often each position has occurred, for threefold repetition.
    seen: HashMap<String, u32>,
    repeated: bool,
}

impl Default for ChessRules {
    fn default() -> Self {
        Self::new()
    }
}

impl ChessRules {
    pub fn new() -> Self {
        let pos = Chess::default();
        let mut seen = HashMap::new();
        seen.insert(position_key(&pos), 1);
        Self {
            pos,
            history: Vec::new(),
            seen,
            repeated: false,
        }
    }

    /// A factory producing a fresh game each call.
    pub fn factory() -> RulesFactory {
        Arc::new(|| Box::new(ChessRules::new()))
    }

    /// The side to move.
    pub fn turn(&self) -> Color {
        from_shakmaty(self.pos.turn())
    }
}

impl Rules for ChessRules {
    fn apply_move(&mut self, notation: &str) -> Result<(), IllegalMove> {
        let uci = notation
            .parse::<UciMove>()
            .map_err(|e| IllegalMove::new(notation, e.to_string()))?;
        let m = uci
            .to_move(&self.pos)
            .map_err(|e| IllegalMove::new(notation, e.to_string()))?;

        self.pos.play_unchecked(&m);
        self.history.push(notation.to_string());

        let count = self.seen.entry(position_key(&self.pos)).or_insert(0);
        *count += 1;
        if *count >= 3 {
            self.repeated = true;
        }
        Ok(())
    }

    fn is_game_over(&self) -> bool {
        self.pos.is_game_over() || self.is_repetition() || self.is_fifty_move()
    }

    fn is_checkmate(&self, color: Color) -> bool {
        self.pos.is_checkmate() && self.pos.turn() == to_shakmaty(color)
    }

    fn is_stalemate(&self) -> bool {
        self.pos.is_stalemate()
    }

    fn is_insufficient_material(&self) -> bool {
        self.pos.is_insufficient_material()
    }

    fn is_repetition(&self) -> bool {
        self.repeated
    }

    fn is_fifty_move(&self) -> bool {
        self.pos.halfmoves() >= FIFTY_MOVE_PLIES
    }

    fn has_insufficient_material(&self, color: Color) -> bool {
        self.pos.has_insufficient_material(to_shakmaty(color))
    }

    fn move_history(&self) -> String {
        self.history.join(" ")
    }
}

/// Identity of a position for repetition purposes: placement, side to
/// move, castling rights, and a legal en passant square.
fn position_key(pos: &Chess) -> String {
    format!(
        "{:?}|{:?}|{:?}|{:?}",
        pos.board(),
        pos.turn(),
        pos.castles().castling_rights(),
        pos.ep_square(EnPassantMode::Legal),
    )
}

fn to_shakmaty(color: Color) -> shakmaty::Color {
    match color {
        Color::White => shakmaty::Color::White,
        Color::Black => shakmaty::Color::Black,
    }
}

fn from_shakmaty(color: shakmaty::Color) -> Color {
    match color {
        shakmaty::Color::White => Color::White,
        shakmaty::Color::Black => Color::Black,
    }
}
