//! Values written by the server.

use castle_protocol::{EndReason, GameId, GameResult, UserId};

/// One side of a game as stored: a display name, plus a user id for
/// identified players.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Participant {
    pub user_id: Option<UserId>,
    pub name: String,
}

impl Participant {
    pub fn new(user_id: Option<UserId>, name: impl Into<String>) -> Self {
        Self {
            user_id,
            name: name.into(),
        }
    }

    pub fn anonymous(name: impl Into<String>) -> Self {
        Self::new(None, name)
    }
}

/// A finished game, ready to be written back to its row.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletedGame {
    pub game_id: GameId,
    pub white: Participant,
    pub black: Participant,
    pub result: GameResult,
    pub reason: EndReason,
    /// Space-separated moves.
    pub moves: String,
    /// Space-separated `white-black` clock readings in seconds.
    pub time_log: String,
}
