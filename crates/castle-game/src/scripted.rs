//! A rules engine that reads outcomes from the move text.
//!
//! Useful wherever real chess would get in the way of exercising the
//! session machinery:
//!
//! | notation      | effect                                   |
//! |---------------|------------------------------------------|
//! | `?...`        | rejected as illegal                      |
//! | `...#`        | the side to move next is checkmated      |
//! | `=stalemate`  | game over, stalemate                     |
//! | `=insufficient` | game over, insufficient material       |
//! | `=repetition` | game over, threefold repetition          |
//! | `=fifty`      | game over, fifty-move rule               |
//! | anything else | accepted, game continues                 |

use castle_protocol::Color;

use crate::{IllegalMove, Rules};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Ending {
    Mate(Color),
    Stalemate,
    Insufficient,
    Repetition,
    Fifty,
}

#[derive(Debug, Clone)]
pub struct ScriptedRules {
    moves: Vec<String>,
    to_move: Color,
    ending: Option<Ending>,
    bare: Vec<Color>,
}

impl Default for ScriptedRules {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedRules {
    pub fn new() -> Self {
        Self {
            moves: Vec::new(),
            to_move: Color::White,
            ending: None,
            bare: Vec::new(),
        }
    }

    /// Marks `color` as lacking mating material.
    pub fn with_bare(mut self, color: Color) -> Self {
        self.bare.push(color);
        self
    }
}

impl Rules for ScriptedRules {
    fn apply_move(&mut self, notation: &str) -> Result<(), IllegalMove> {
        if notation.is_empty() || notation.starts_with('?') {
            return Err(IllegalMove::new(notation, "scripted as illegal"));
        }
        if self.ending.is_some() {
            return Err(IllegalMove::new(notation, "game is over"));
        }
        let mover = self.to_move;
        self.ending = match notation {
            "=stalemate" => Some(Ending::Stalemate),
            "=insufficient" => Some(Ending::Insufficient),
            "=repetition" => Some(Ending::Repetition),
            "=fifty" => Some(Ending::Fifty),
            n if n.ends_with('#') => Some(Ending::Mate(mover.opposite())),
            _ => None,
        };
        self.moves.push(notation.to_string());
        self.to_move = mover.opposite();
        Ok(())
    }

    fn is_game_over(&self) -> bool {
        self.ending.is_some()
    }

    fn is_checkmate(&self, color: Color) -> bool {
        self.ending == Some(Ending::Mate(color))
    }

    fn is_stalemate(&self) -> bool {
        self.ending == Some(Ending::Stalemate)
    }

    fn is_insufficient_material(&self) -> bool {
        self.ending == Some(Ending::Insufficient)
    }

    fn is_repetition(&self) -> bool {
        self.ending == Some(Ending::Repetition)
    }

    fn is_fifty_move(&self) -> bool {
        self.ending == Some(Ending::Fifty)
    }

    fn has_insufficient_material(&self, color: Color) -> bool {
        self.bare.contains(&color)
    }

    fn move_history(&self) -> String {
        self.moves.join(" ")
    }
}
