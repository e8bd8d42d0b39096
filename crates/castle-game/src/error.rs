//! Error types for the game layer.

use castle_protocol::Color;
use castle_session::SessionKey;

use crate::GamePhase;

/// The rules engine refused a move.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("illegal move {notation}: {reason}")]
pub struct IllegalMove {
    pub notation: String,
    pub reason: String,
}

impl IllegalMove {
    pub fn new(notation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            notation: notation.into(),
            reason: reason.into(),
        }
    }
}

/// Errors from operating on a [`GameSession`](crate::GameSession).
///
/// None of these change any state; the caller reports them to the sender
/// and carries on.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GameError {
    #[error("game is {0}, not active")]
    NotActive(GamePhase),

    #[error("game is {0}, a new game can only start once it is idle")]
    NotIdle(GamePhase),

    #[error("{0} is not seated in this game")]
    NotSeated(SessionKey),

    #[error("it is not {0}'s turn")]
    NotYourTurn(Color),

    #[error(transparent)]
    Illegal(#[from] IllegalMove),
}
