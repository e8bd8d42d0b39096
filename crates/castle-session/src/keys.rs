//! Arena keys.

use std::fmt;

/// Stable handle to a [`PlayerSession`](crate::PlayerSession) in the
/// [`Registry`](crate::Registry).
///
/// Keys are never reused within a process, so a stale key can only ever
/// miss; it can't land on somebody else's session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionKey(u64);

impl SessionKey {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session-{}", self.0)
    }
}

/// Stable handle to a game session.
///
/// Unlike a [`GameId`](castle_protocol::GameId), which changes on every
/// rematch, a `GameKey` names the session object for its whole life.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GameKey(u64);

impl GameKey {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for GameKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "game-{}", self.0)
    }
}
