//! Games for Castle.
//!
//! - [`Rules`] is the seam to a rules engine: it validates moves and
//!   reports how a position ended. [`ChessRules`] adapts `shakmaty`.
//! - [`GameSession`] pairs two player sessions and runs the
//!   `Active → Resolving → Idle` result state machine, keeping scores and
//!   its spectator topic across rematches.
//! - [`Matchmaker`] holds one waiting player per queue and pairs the next
//!   arrival with them.
//!
//! # Feature Flags
//!
//! - `chess` (default): [`ChessRules`] via `shakmaty`
//! - `testing`: [`ScriptedRules`], a rules engine driven by move text

mod error;
mod game;
mod matchmaking;
mod rules;

#[cfg(feature = "chess")]
mod chess;
#[cfg(any(test, feature = "testing"))]
mod scripted;

pub use error::{GameError, IllegalMove};
pub use game::{GamePhase, GameSession, Resolution};
pub use matchmaking::{Matchmaker, Pairing, Seating};
pub use rules::{Outcome, Rules, RulesFactory, classify};

#[cfg(feature = "chess")]
pub use chess::ChessRules;
#[cfg(any(test, feature = "testing"))]
pub use scripted::ScriptedRules;
