//! Messages exchanged between clients and the server.
//!
//! All three enums are *internally tagged*: the variant name goes in a
//! `"type"` field next to the variant's own fields, in kebab-case.
//!
//! ```text
//! client → { "type": "play", "version": 1, "token": "...", "queue": "ranked" }
//! client → { "type": "move", "notation": "e2e4" }
//! server → { "type": "move-made", "notation": "e2e4",
//!            "clock": { "white_ms": 290000, "black_ms": 300000 } }
//! ```

use serde::{Deserialize, Serialize};

use crate::{ClockReading, Color, EndReason, GameId, GameResult, QueueKind, Standing, UserId};

// ---------------------------------------------------------------------------
// Hello: the first frame on every connection
// ---------------------------------------------------------------------------

/// Declares what a new connection wants to do.
///
/// The server reads exactly one `Hello` before anything else and closes
/// the connection if the first frame is something else or the version
/// does not match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Hello {
    /// Join matchmaking, or resume a game after a dropped connection.
    ///
    /// Without a token the player is anonymous and may only use the
    /// casual queue.
    Play {
        version: u32,
        #[serde(default)]
        token: Option<String>,
        queue: QueueKind,
    },

    /// Follow a live game as a spectator.
    Watch { version: u32, game_id: GameId },

    /// Query-only connection (lists, records, history).
    Browse { version: u32 },
}

impl Hello {
    pub fn version(&self) -> u32 {
        match self {
            Self::Play { version, .. }
            | Self::Watch { version, .. }
            | Self::Browse { version } => *version,
        }
    }
}

// ---------------------------------------------------------------------------
// ClientMessage
// ---------------------------------------------------------------------------

/// Everything a client may send after its `Hello`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ClientMessage {
    /// A move in UCI notation (`e2e4`, `e7e8q`).
    Move { notation: String },
    /// Text relayed to the opponent.
    Chat { text: String },
    /// Offer a draw, or withdraw a standing offer.
    OfferDraw,
    /// Answer the opponent's draw offer.
    RespondDraw { accept: bool },
    Resign,
    /// Ask the last opponent for another game.
    RequestRematch,
    /// Answer the opponent's rematch request.
    RespondRematch { accept: bool },
    /// Go back into matchmaking after a finished game.
    NewGame,

    ListLiveGames,
    FetchGame { game_id: GameId },
    FetchHistory {
        user_id: UserId,
        #[serde(default)]
        batch: u32,
    },
    FindLiveGame { user_id: UserId },
}

// ---------------------------------------------------------------------------
// ServerMessage
// ---------------------------------------------------------------------------

/// Why a rematch request could not be forwarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RematchBlock {
    /// The previous opponent is no longer connected.
    OpponentLeft,
    /// The previous opponent already started another game.
    OpponentBusy,
}

/// A live game as shown in the lobby.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiveGameEntry {
    pub game_id: GameId,
    pub white: String,
    pub black: String,
}

/// A stored game, finished or still in progress.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameRecord {
    pub game_id: GameId,
    pub white: String,
    pub black: String,
    pub white_id: Option<UserId>,
    pub black_id: Option<UserId>,
    /// Space-separated UCI moves.
    pub moves: String,
    /// Space-separated `white-black` remaining seconds after each move.
    pub time_log: String,
    /// `None` while the game has not been resolved.
    pub result: Option<GameResult>,
    pub reason: Option<EndReason>,
}

/// One line of a player's game history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub game_id: GameId,
    pub white: String,
    pub black: String,
    pub standing: Standing,
    pub reason: Option<EndReason>,
}

/// Everything the server sends to players and spectators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ServerMessage {
    /// Waiting in the matchmaking slot.
    Queued { queue: QueueKind },

    /// To a player: a game was created and stored.
    StartGame {
        game_id: GameId,
        color: Color,
        opponent: String,
        clock: ClockReading,
    },

    /// To spectators: a game (or a rematch) started on this topic.
    GameStarted {
        game_id: GameId,
        white: String,
        black: String,
        clock: ClockReading,
    },

    /// The opponent (or, for spectators, either side) moved.
    MoveMade { notation: String, clock: ClockReading },

    /// Only to the sender of a move that was not applied.
    MoveRejected { notation: String, reason: String },

    /// Periodic clock sync.
    TimeUpdate { clock: ClockReading },

    Chat { text: String },

    /// The opponent offered (`active: true`) or withdrew a draw.
    DrawOffered { active: bool },

    DrawDeclined,

    GameOver {
        game_id: GameId,
        result: GameResult,
        reason: EndReason,
        white_score: f64,
        black_score: f64,
    },

    /// The opponent's connection dropped; they have a grace period.
    PeerLeft,
    PeerReturned,

    /// Full state pushed to a player after reconnecting.
    Resync {
        game_id: Option<GameId>,
        color: Option<Color>,
        your_turn: bool,
        moves: String,
        clock: ClockReading,
        white_score: f64,
        black_score: f64,
    },

    /// Full state pushed to a new spectator.
    Spectate {
        game_id: GameId,
        white: String,
        black: String,
        moves: String,
        clock: ClockReading,
        white_score: f64,
        black_score: f64,
    },

    RematchOffered,
    RematchDeclined,
    RematchUnavailable { reason: RematchBlock },

    /// A matched game could not be stored and will not start.
    GameAborted { reason: String },

    LiveGames { games: Vec<LiveGameEntry> },
    GameRecord { game: Option<GameRecord> },
    History {
        user_id: UserId,
        batch: u32,
        games: Vec<HistoryEntry>,
    },
    LiveGame {
        user_id: UserId,
        game_id: Option<GameId>,
    },

    /// HTTP-style codes: 400 bad request, 401 unauthorized, 403 not
    /// allowed now, 404 unknown, 409 conflict, 500 server error.
    Error { code: u16, message: String },
}

impl ServerMessage {
    pub fn error(code: u16, message: impl Into<String>) -> Self {
        Self::Error {
            code,
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    //! JSON shape checks. Clients parse these by hand, so the tag names
    //! and field names are part of the contract.

    use super::*;
    use serde_json::{Value, json};

    fn to_json<T: Serialize>(value: &T) -> Value {
        serde_json::to_value(value).unwrap()
    }

    #[test]
    fn test_hello_play_without_token_defaults_to_none() {
        let hello: Hello =
            serde_json::from_value(json!({"type": "play", "version": 1, "queue": "casual"}))
                .unwrap();
        assert_eq!(
            hello,
            Hello::Play {
                version: 1,
                token: None,
                queue: QueueKind::Casual
            }
        );
        assert_eq!(hello.version(), 1);
    }

    #[test]
    fn test_hello_watch_parses_game_id() {
        let hello: Hello =
            serde_json::from_value(json!({"type": "watch", "version": 2, "game_id": 31})).unwrap();
        assert_eq!(
            hello,
            Hello::Watch {
                version: 2,
                game_id: GameId(31)
            }
        );
    }

    #[test]
    fn test_client_unit_variants_use_kebab_tags() {
        let msg: ClientMessage = serde_json::from_value(json!({"type": "offer-draw"})).unwrap();
        assert_eq!(msg, ClientMessage::OfferDraw);
        let msg: ClientMessage =
            serde_json::from_value(json!({"type": "respond-rematch", "accept": true})).unwrap();
        assert_eq!(msg, ClientMessage::RespondRematch { accept: true });
    }

    #[test]
    fn test_client_fetch_history_batch_defaults_to_zero() {
        let msg: ClientMessage =
            serde_json::from_value(json!({"type": "fetch-history", "user_id": 4})).unwrap();
        assert_eq!(
            msg,
            ClientMessage::FetchHistory {
                user_id: UserId(4),
                batch: 0
            }
        );
    }

    #[test]
    fn test_client_unknown_type_is_rejected() {
        let parsed = serde_json::from_value::<ClientMessage>(json!({"type": "castle-queenside"}));
        assert!(parsed.is_err());
    }

    #[test]
    fn test_server_start_game_json_shape() {
        let msg = ServerMessage::StartGame {
            game_id: GameId(9),
            color: Color::Black,
            opponent: "alice".into(),
            clock: ClockReading {
                white_ms: 300_000,
                black_ms: 300_000,
            },
        };
        let value = to_json(&msg);
        assert_eq!(value["type"], "start-game");
        assert_eq!(value["game_id"], 9);
        assert_eq!(value["color"], "black");
        assert_eq!(value["clock"]["white_ms"], 300_000);
    }

    #[test]
    fn test_server_game_over_json_shape() {
        let msg = ServerMessage::GameOver {
            game_id: GameId(3),
            result: GameResult::Draw,
            reason: EndReason::FiftyMoveRule,
            white_score: 1.5,
            black_score: 0.5,
        };
        let value = to_json(&msg);
        assert_eq!(value["type"], "game-over");
        assert_eq!(value["result"], "draw");
        assert_eq!(value["reason"], "fifty-move-rule");
        assert_eq!(value["white_score"], 1.5);
    }

    #[test]
    fn test_server_rematch_unavailable_reason_shape() {
        let value = to_json(&ServerMessage::RematchUnavailable {
            reason: RematchBlock::OpponentBusy,
        });
        assert_eq!(value, json!({"type": "rematch-unavailable", "reason": "opponent-busy"}));
    }

    #[test]
    fn test_server_error_helper() {
        assert_eq!(
            ServerMessage::error(403, "no draw offered"),
            ServerMessage::Error {
                code: 403,
                message: "no draw offered".into()
            }
        );
    }
}
