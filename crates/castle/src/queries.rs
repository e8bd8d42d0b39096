//! Lobby and archive queries.
//!
//! Live-game lookups read the registries and answer at once. Stored games
//! and histories come from the store on a worker thread; the reply is
//! dropped if the asking connection closed in the meantime.

use castle_protocol::{Color, GameId, LiveGameEntry, ServerMessage, UserId};
use castle_transport::ConnectionId;
use tracing::{debug, error};

use crate::context::Context;
use crate::error::code;

impl Context {
    /// The newest live games, at most `live_games_limit` of them.
    pub fn live_games(&self) -> Vec<LiveGameEntry> {
        self.registry
            .live_game_ids()
            .into_iter()
            .filter_map(|id| {
                let game = self.games.get(&self.registry.live_game(id)?)?;
                Some(LiveGameEntry {
                    game_id: id,
                    white: game.name(Color::White).to_string(),
                    black: game.name(Color::Black).to_string(),
                })
            })
            .take(self.config.live_games_limit)
            .collect()
    }

    /// The live game `user` is playing, including one they are currently
    /// disconnected from.
    pub fn live_game_of(&self, user: UserId) -> Option<GameId> {
        let key = self
            .registry
            .active_session(user)
            .or_else(|| self.registry.disconnected_session(user))?;
        self.game_of(key)
            .filter(|g| g.is_active())
            .map(|g| g.game_id())
    }

    pub(crate) fn list_live_games(&self, conn: ConnectionId) {
        let games = self.live_games();
        self.send(conn, &ServerMessage::LiveGames { games });
    }

    pub(crate) fn find_live_game(&self, conn: ConnectionId, user_id: UserId) {
        let game_id = self.live_game_of(user_id);
        self.send(conn, &ServerMessage::LiveGame { user_id, game_id });
    }

    pub(crate) fn fetch_game(&mut self, conn: ConnectionId, game_id: GameId) {
        let Some(cancel) = self.links.get(&conn).map(|l| l.cancel.clone()) else {
            return;
        };
        self.submit(
            move |store| store.load_game(game_id),
            move |ctx: &mut Context, result| {
                if cancel.is_cancelled() {
                    debug!(conn_id = %conn, %game_id, "requester gone, game record dropped");
                    return;
                }
                match result {
                    Ok(game) => ctx.send(conn, &ServerMessage::GameRecord { game }),
                    Err(e) => {
                        error!(%game_id, error = %e, "game lookup failed");
                        ctx.reject(conn, code::SERVER_ERROR, "game lookup failed");
                    }
                }
            },
        );
    }

    pub(crate) fn fetch_history(&mut self, conn: ConnectionId, user_id: UserId, batch: u32) {
        let Some(cancel) = self.links.get(&conn).map(|l| l.cancel.clone()) else {
            return;
        };
        let page_size = self.config.history_page_size;
        self.submit(
            move |store| store.history(user_id, batch, page_size),
            move |ctx: &mut Context, result| {
                if cancel.is_cancelled() {
                    debug!(conn_id = %conn, %user_id, "requester gone, history dropped");
                    return;
                }
                match result {
                    Ok(games) => ctx.send(conn, &ServerMessage::History { user_id, batch, games }),
                    Err(e) => {
                        error!(%user_id, error = %e, "history lookup failed");
                        ctx.reject(conn, code::SERVER_ERROR, "history lookup failed");
                    }
                }
            },
        );
    }
}
