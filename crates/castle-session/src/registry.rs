//! The session arena and its registries.
//!
//! `Registry` is owned by the reactor and never shared. It is a plain set
//! of `HashMap`s with no locking: every caller already runs on the one
//! thread allowed to touch session state.

use std::collections::HashMap;

use castle_protocol::{GameId, UserId};
use tracing::{debug, info};

use crate::{GameKey, PlayerSession, SessionError, SessionKey};

/// Where an identified player is currently registered.
///
/// A player is in at most one of these at a time (and in neither while
/// queued or between games).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    Active,
    Disconnected,
}

/// All player sessions, plus the process-wide lookup maps.
///
/// ```text
///   insert ──→ [arena] ──mark_active──→ active ──mark_disconnected──→ disconnected
///                 ↑                       ↑                               │
///                 │                       └────── take_disconnected ──────┘
///                 └── remove (drops every mapping for the key)
/// ```
#[derive(Debug, Default)]
pub struct Registry {
    next_key: u64,
    sessions: HashMap<SessionKey, PlayerSession>,
    /// The newest session stored for each identified player.
    by_user: HashMap<UserId, SessionKey>,
    /// Identified players with a game in progress and a live connection.
    active: HashMap<UserId, SessionKey>,
    /// Identified players retained after dropping mid-game.
    disconnected: HashMap<UserId, SessionKey>,
    live_games: HashMap<GameId, GameKey>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates a fresh key for a session about to be inserted.
    pub fn next_key(&mut self) -> SessionKey {
        self.next_key += 1;
        SessionKey::new(self.next_key)
    }

    /// Stores a session in the arena. It is not yet in any lookup map.
    pub fn insert(&mut self, session: PlayerSession) -> SessionKey {
        let key = session.key();
        debug!(session = %key, user_id = ?session.user_id, "session stored");
        if let Some(user) = session.user_id {
            self.by_user.insert(user, key);
        }
        self.sessions.insert(key, session);
        key
    }

    pub fn get(&self, key: SessionKey) -> Option<&PlayerSession> {
        self.sessions.get(&key)
    }

    pub fn get_mut(&mut self, key: SessionKey) -> Option<&mut PlayerSession> {
        self.sessions.get_mut(&key)
    }

    pub fn contains(&self, key: SessionKey) -> bool {
        self.sessions.contains_key(&key)
    }

    /// Releases a session: removes it from the arena and from any lookup
    /// map that still points at it. Its clocks are disarmed on drop.
    pub fn remove(&mut self, key: SessionKey) -> Option<PlayerSession> {
        let session = self.sessions.remove(&key)?;
        if let Some(user) = session.user_id {
            if self.by_user.get(&user) == Some(&key) {
                self.by_user.remove(&user);
            }
            if self.active.get(&user) == Some(&key) {
                self.active.remove(&user);
            }
            if self.disconnected.get(&user) == Some(&key) {
                self.disconnected.remove(&user);
            }
        }
        debug!(session = %key, "session released");
        Some(session)
    }

    /// Registers an identified player as active.
    ///
    /// Moves the player out of the disconnected map if it was there.
    /// Fails if a *different* session is already active for the player.
    pub fn mark_active(&mut self, key: SessionKey) -> Result<(), SessionError> {
        let user = self.user_of(key)?;
        if let Some(&other) = self.active.get(&user) {
            if other != key {
                return Err(SessionError::AlreadyActive(user));
            }
        }
        if self.disconnected.get(&user) == Some(&key) {
            self.disconnected.remove(&user);
        }
        self.active.insert(user, key);
        Ok(())
    }

    /// Moves an identified player from active to disconnected.
    pub fn mark_disconnected(&mut self, key: SessionKey) -> Result<(), SessionError> {
        let user = self.user_of(key)?;
        if self.active.get(&user) == Some(&key) {
            self.active.remove(&user);
        }
        self.disconnected.insert(user, key);
        info!(session = %key, user_id = %user, "player retained for reconnect");
        Ok(())
    }

    /// Removes a disconnected player's entry and returns its session key.
    ///
    /// The session stays in the arena; the caller re-registers it.
    pub fn take_disconnected(&mut self, user: UserId) -> Option<SessionKey> {
        self.disconnected.remove(&user)
    }

    /// Removes the player from the active map (game over). Sessions that
    /// are disconnected stay where they are until released.
    pub fn deactivate(&mut self, key: SessionKey) {
        let Some(user) = self.sessions.get(&key).and_then(|s| s.user_id) else {
            return;
        };
        if self.active.get(&user) == Some(&key) {
            self.active.remove(&user);
        }
    }

    /// The session stored for `user`, whatever its state.
    pub fn session_of_user(&self, user: UserId) -> Option<SessionKey> {
        self.by_user.get(&user).copied()
    }

    pub fn active_session(&self, user: UserId) -> Option<SessionKey> {
        self.active.get(&user).copied()
    }

    pub fn disconnected_session(&self, user: UserId) -> Option<SessionKey> {
        self.disconnected.get(&user).copied()
    }

    /// Which lookup map currently holds `key`, if any.
    pub fn placement(&self, key: SessionKey) -> Option<Placement> {
        let user = self.sessions.get(&key)?.user_id?;
        if self.active.get(&user) == Some(&key) {
            Some(Placement::Active)
        } else if self.disconnected.get(&user) == Some(&key) {
            Some(Placement::Disconnected)
        } else {
            None
        }
    }

    pub fn register_game(&mut self, game_id: GameId, game: GameKey) {
        self.live_games.insert(game_id, game);
    }

    pub fn unregister_game(&mut self, game_id: GameId) -> Option<GameKey> {
        self.live_games.remove(&game_id)
    }

    pub fn live_game(&self, game_id: GameId) -> Option<GameKey> {
        self.live_games.get(&game_id).copied()
    }

    /// Live game ids, newest first.
    pub fn live_game_ids(&self) -> Vec<GameId> {
        let mut ids: Vec<GameId> = self.live_games.keys().copied().collect();
        ids.sort_unstable_by(|a, b| b.cmp(a));
        ids
    }

    pub fn live_game_count(&self) -> usize {
        self.live_games.len()
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    pub fn disconnected_count(&self) -> usize {
        self.disconnected.len()
    }

    fn user_of(&self, key: SessionKey) -> Result<UserId, SessionError> {
        let session = self.sessions.get(&key).ok_or(SessionError::NotFound(key))?;
        session.user_id.ok_or(SessionError::Anonymous(key))
    }
}
