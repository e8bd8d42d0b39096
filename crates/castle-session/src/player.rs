//! Per-player session state.

use std::time::Duration;

use castle_clock::Clock;
use castle_protocol::{Color, QueueKind, UserId};
use castle_transport::ConnectionId;

use crate::{GameKey, Identity, SessionKey};

/// One player's state on the server.
///
/// Created when a player connects (or reused when an identified player
/// reconnects mid-game) and released once its game no longer needs it and
/// no connection is attached.
///
/// Links to other objects are keys, not references:
///
/// - `connection` is `None` while the player is disconnected but the
///   session is retained for a possible reconnect.
/// - `opponent` and `game` are looked up in their registries on every use,
///   so nothing has to be patched when a player drops and comes back.
#[derive(Debug)]
pub struct PlayerSession {
    key: SessionKey,
    /// `None` for anonymous casual players.
    pub user_id: Option<UserId>,
    /// Name supplied by the player's identity, if any.
    pub display_name: Option<String>,
    pub queue: QueueKind,

    pub color: Option<Color>,
    pub is_my_turn: bool,
    /// Set while this player has an open draw offer to the opponent.
    pub draw_offered: bool,
    pub in_game: bool,
    pub rematch_requested: bool,

    pub connection: Option<ConnectionId>,
    pub opponent: Option<SessionKey>,
    pub game: Option<GameKey>,

    move_clock: Option<Clock>,
    abandonment_clock: Clock,
}

impl PlayerSession {
    /// Creates an unmatched session attached to `connection`.
    pub fn new(
        key: SessionKey,
        identity: Option<Identity>,
        queue: QueueKind,
        connection: ConnectionId,
        abandonment_grace: Duration,
    ) -> Self {
        let (user_id, display_name) = match identity {
            Some(id) => (Some(id.user_id), Some(id.name)),
            None => (None, None),
        };
        Self {
            key,
            user_id,
            display_name,
            queue,
            color: None,
            is_my_turn: false,
            draw_offered: false,
            in_game: false,
            rematch_requested: false,
            connection: Some(connection),
            opponent: None,
            game: None,
            move_clock: None,
            abandonment_clock: Clock::new(abandonment_grace),
        }
    }

    pub fn key(&self) -> SessionKey {
        self.key
    }

    pub fn is_anonymous(&self) -> bool {
        self.user_id.is_none()
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    /// The name shown to opponents and spectators.
    ///
    /// Players without an identity are called by their color once they
    /// have one.
    pub fn name(&self) -> &str {
        match (&self.display_name, self.color) {
            (Some(name), _) => name,
            (None, Some(color)) => color.default_name(),
            (None, None) => "anonymous",
        }
    }

    /// Assigns a side for a new game.
    pub fn seat(&mut self, color: Color, opponent: SessionKey) {
        self.color = Some(color);
        self.opponent = Some(opponent);
        self.is_my_turn = color == Color::White;
        self.draw_offered = false;
        self.rematch_requested = false;
        self.in_game = true;
    }

    /// Clears the flags that only mean something during a game.
    ///
    /// The opponent and game links survive so a rematch can be arranged.
    pub fn clear_game_flags(&mut self) {
        self.is_my_turn = false;
        self.color = None;
        self.draw_offered = false;
        self.in_game = false;
    }

    /// Drops every link to the previous game and opponent.
    pub fn leave_game(&mut self) {
        self.clear_game_flags();
        self.rematch_requested = false;
        self.opponent = None;
        self.game = None;
    }

    /// The move clock, created on first use with `move_time`.
    pub fn move_clock_or_init(&mut self, move_time: Duration) -> &mut Clock {
        self.move_clock.get_or_insert_with(|| Clock::new(move_time))
    }

    pub fn move_clock(&self) -> Option<&Clock> {
        self.move_clock.as_ref()
    }

    pub fn move_clock_mut(&mut self) -> Option<&mut Clock> {
        self.move_clock.as_mut()
    }

    /// Time left on the move clock, or `fallback` if there isn't one yet.
    pub fn move_remaining(&self, fallback: Duration) -> Duration {
        self.move_clock.as_ref().map_or(fallback, Clock::remaining)
    }

    pub fn abandonment_clock(&self) -> &Clock {
        &self.abandonment_clock
    }

    pub fn abandonment_clock_mut(&mut self) -> &mut Clock {
        &mut self.abandonment_clock
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(identity: Option<Identity>) -> PlayerSession {
        PlayerSession::new(
            SessionKey::new(1),
            identity,
            QueueKind::Casual,
            ConnectionId::new(1),
            Duration::from_secs(30),
        )
    }

    #[test]
    fn test_new_session_is_connected_and_unmatched() {
        let s = session(None);
        assert!(s.is_connected());
        assert!(s.is_anonymous());
        assert!(!s.in_game);
        assert!(s.game.is_none());
        assert!(s.move_clock().is_none());
    }

    #[test]
    fn test_name_prefers_identity_then_color() {
        let mut anon = session(None);
        assert_eq!(anon.name(), "anonymous");
        anon.seat(Color::Black, SessionKey::new(2));
        assert_eq!(anon.name(), "black");

        let mut named = session(Some(Identity::new(UserId(4), "ada")));
        named.seat(Color::White, SessionKey::new(2));
        assert_eq!(named.name(), "ada");
    }

    #[test]
    fn test_seat_white_moves_first() {
        let mut s = session(None);
        s.draw_offered = true;
        s.seat(Color::White, SessionKey::new(2));
        assert!(s.is_my_turn);
        assert!(s.in_game);
        assert!(!s.draw_offered);
        assert_eq!(s.opponent, Some(SessionKey::new(2)));
    }

    #[test]
    fn test_clear_game_flags_keeps_links() {
        let mut s = session(None);
        s.seat(Color::White, SessionKey::new(2));
        s.game = Some(GameKey::new(1));
        s.clear_game_flags();

        assert!(!s.in_game);
        assert!(!s.is_my_turn);
        assert!(s.color.is_none());
        assert_eq!(s.opponent, Some(SessionKey::new(2)));
        assert_eq!(s.game, Some(GameKey::new(1)));
    }

    #[test]
    fn test_leave_game_drops_links() {
        let mut s = session(None);
        s.seat(Color::White, SessionKey::new(2));
        s.game = Some(GameKey::new(1));
        s.rematch_requested = true;
        s.leave_game();

        assert!(s.opponent.is_none());
        assert!(s.game.is_none());
        assert!(!s.rematch_requested);
    }

    #[test]
    fn test_move_clock_created_once() {
        let mut s = session(None);
        assert_eq!(s.move_remaining(Duration::from_secs(300)), Duration::from_secs(300));

        s.move_clock_or_init(Duration::from_secs(60));
        // A second call keeps the existing clock.
        let clock = s.move_clock_or_init(Duration::from_secs(999));
        assert_eq!(clock.initial(), Duration::from_secs(60));
    }

    #[test]
    fn test_abandonment_clock_uses_grace() {
        let s = session(None);
        assert_eq!(s.abandonment_clock().initial(), Duration::from_secs(30));
    }
}
