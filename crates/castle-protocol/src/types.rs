//! Identifiers and small value types shared by every layer.
//!
//! Everything here travels on the wire, so the serde attributes define
//! the JSON shape clients see.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// Stable identity of a registered player, as issued by the auth system.
///
/// Anonymous players have no `UserId` at all; code that deals with
/// "maybe a registered player" uses `Option<UserId>`.
///
/// `#[serde(transparent)]` keeps it a plain number in JSON.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub i64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "U-{}", self.0)
    }
}

/// Identifier of a persisted game row.
///
/// Only ever created from an id the database returned, so a client never
/// sees a game id for a game that was not stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GameId(pub i64);

impl GameId {
    /// The spectator pub/sub topic for this game.
    ///
    /// A game session keeps the topic of its *first* game across
    /// rematches, so spectators never need to re-subscribe.
    pub fn topic(&self) -> String {
        self.0.to_string()
    }
}

impl fmt::Display for GameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "G-{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Color, queue
// ---------------------------------------------------------------------------

/// Side of the board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Color {
    White,
    Black,
}

impl Color {
    pub fn opposite(self) -> Self {
        match self {
            Self::White => Self::Black,
            Self::Black => Self::White,
        }
    }

    /// Default display name for a player who supplied none.
    pub fn default_name(self) -> &'static str {
        match self {
            Self::White => "white",
            Self::Black => "black",
        }
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.default_name())
    }
}

/// Which matchmaking slot a player waits in.
///
/// Ranked games require a registered identity; casual games accept
/// anonymous players.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueKind {
    Ranked,
    Casual,
}

impl fmt::Display for QueueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ranked => write!(f, "ranked"),
            Self::Casual => write!(f, "casual"),
        }
    }
}

// ---------------------------------------------------------------------------
// ClockReading
// ---------------------------------------------------------------------------

/// Both players' remaining move time, in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ClockReading {
    pub white_ms: u64,
    pub black_ms: u64,
}

impl ClockReading {
    pub fn new(white: Duration, black: Duration) -> Self {
        Self {
            white_ms: white.as_millis() as u64,
            black_ms: black.as_millis() as u64,
        }
    }

    /// Both sides at the same duration (a fresh game).
    pub fn even(each: Duration) -> Self {
        Self::new(each, each)
    }

    /// Entry for the persisted time log: whole seconds, `white-black`.
    pub fn log_entry(&self) -> String {
        format!("{}-{}", self.white_ms / 1000, self.black_ms / 1000)
    }
}

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// Outcome of a finished game.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GameResult {
    WhiteWins,
    BlackWins,
    Draw,
}

impl GameResult {
    /// A win for `color`.
    pub fn win_for(color: Color) -> Self {
        match color {
            Color::White => Self::WhiteWins,
            Color::Black => Self::BlackWins,
        }
    }

    pub fn winner(&self) -> Option<Color> {
        match self {
            Self::WhiteWins => Some(Color::White),
            Self::BlackWins => Some(Color::Black),
            Self::Draw => None,
        }
    }

    /// Code stored in the `game.result` column.
    pub fn code(&self) -> char {
        match self {
            Self::WhiteWins => 'w',
            Self::BlackWins => 'b',
            Self::Draw => 'd',
        }
    }

    pub fn from_code(code: char) -> Option<Self> {
        match code {
            'w' => Some(Self::WhiteWins),
            'b' => Some(Self::BlackWins),
            'd' => Some(Self::Draw),
            _ => None,
        }
    }

    /// How the game ended from `color`'s point of view.
    pub fn standing_of(&self, color: Color) -> Standing {
        match self.winner() {
            None => Standing::Drew,
            Some(winner) if winner == color => Standing::Won,
            Some(_) => Standing::Lost,
        }
    }
}

/// One player's result, as stored per user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Standing {
    Won,
    Lost,
    Drew,
}

impl Standing {
    /// Code stored in the `user_to_game.result` column.
    pub fn code(&self) -> char {
        match self {
            Self::Won => 'w',
            Self::Lost => 'l',
            Self::Drew => 'd',
        }
    }

    pub fn from_code(code: char) -> Option<Self> {
        match code {
            'w' => Some(Self::Won),
            'l' => Some(Self::Lost),
            'd' => Some(Self::Drew),
            _ => None,
        }
    }
}

/// Why a game ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EndReason {
    Checkmate,
    Stalemate,
    InsufficientMaterial,
    Repetition,
    FiftyMoveRule,
    Agreement,
    Resignation,
    Timeout,
    Abandonment,
}

impl EndReason {
    /// Code stored in the `game.reason` column.
    pub fn code(&self) -> char {
        match self {
            Self::Checkmate => 'c',
            Self::Stalemate => 's',
            Self::InsufficientMaterial => 'i',
            Self::Repetition => 'r',
            Self::FiftyMoveRule => 'f',
            Self::Agreement => 'a',
            Self::Resignation => 'R',
            Self::Timeout => 't',
            Self::Abandonment => 'A',
        }
    }

    pub fn from_code(code: char) -> Option<Self> {
        Some(match code {
            'c' => Self::Checkmate,
            's' => Self::Stalemate,
            'i' => Self::InsufficientMaterial,
            'r' => Self::Repetition,
            'f' => Self::FiftyMoveRule,
            'a' => Self::Agreement,
            'R' => Self::Resignation,
            't' => Self::Timeout,
            'A' => Self::Abandonment,
            _ => return None,
        })
    }
}

impl fmt::Display for EndReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Checkmate => "Checkmate",
            Self::Stalemate => "Stalemate",
            Self::InsufficientMaterial => "Insufficient Material",
            Self::Repetition => "Repetition",
            Self::FiftyMoveRule => "50 Half Moves",
            Self::Agreement => "Agreement",
            Self::Resignation => "Resigned",
            Self::Timeout => "Timeout",
            Self::Abandonment => "Abandonment",
        };
        f.write_str(label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_serialize_as_plain_numbers() {
        assert_eq!(serde_json::to_string(&UserId(7)).unwrap(), "7");
        assert_eq!(serde_json::to_string(&GameId(12)).unwrap(), "12");
    }

    #[test]
    fn test_game_id_topic_is_bare_number() {
        assert_eq!(GameId(12).topic(), "12");
        assert_eq!(GameId(12).to_string(), "G-12");
    }

    #[test]
    fn test_color_opposite_and_json() {
        assert_eq!(Color::White.opposite(), Color::Black);
        assert_eq!(Color::Black.opposite(), Color::White);
        assert_eq!(serde_json::to_string(&Color::White).unwrap(), "\"white\"");
    }

    #[test]
    fn test_clock_reading_log_entry_uses_whole_seconds() {
        let reading = ClockReading::new(
            Duration::from_millis(290_400),
            Duration::from_secs(300),
        );
        assert_eq!(reading.log_entry(), "290-300");
        assert_eq!(ClockReading::even(Duration::from_secs(300)).log_entry(), "300-300");
    }

    #[test]
    fn test_reason_codes_are_distinct_and_reversible() {
        let all = [
            EndReason::Checkmate,
            EndReason::Stalemate,
            EndReason::InsufficientMaterial,
            EndReason::Repetition,
            EndReason::FiftyMoveRule,
            EndReason::Agreement,
            EndReason::Resignation,
            EndReason::Timeout,
            EndReason::Abandonment,
        ];
        let codes: std::collections::HashSet<char> =
            all.iter().map(EndReason::code).collect();
        assert_eq!(codes.len(), all.len());
        for reason in all {
            assert_eq!(EndReason::from_code(reason.code()), Some(reason));
        }
        assert_eq!(EndReason::from_code('x'), None);
    }

    #[test]
    fn test_standing_of_each_side() {
        let result = GameResult::win_for(Color::Black);
        assert_eq!(result, GameResult::BlackWins);
        assert_eq!(result.standing_of(Color::Black), Standing::Won);
        assert_eq!(result.standing_of(Color::White), Standing::Lost);
        assert_eq!(GameResult::Draw.standing_of(Color::White), Standing::Drew);
        assert_eq!(Standing::Lost.code(), 'l');
    }

    #[test]
    fn test_result_code_round_trip() {
        for result in [GameResult::WhiteWins, GameResult::BlackWins, GameResult::Draw] {
            assert_eq!(GameResult::from_code(result.code()), Some(result));
        }
    }
}
