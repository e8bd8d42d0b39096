//! Game persistence for Castle.
//!
//! Everything here is *blocking*. The server only ever calls a
//! [`GameStore`] from its worker threads, never from the reactor.
//!
//! - [`GameStore`]: the statements the server needs: create a game row,
//!   save a result, load a game, page through a player's history.
//! - [`SqliteStore`]: SQLite via `rusqlite`, one connection per
//!   [`ResourcePool`](castle_exec::ResourcePool) slot.
//! - [`MemoryStore`]: in-process maps, for tests and throwaway servers.
//!
//! # Feature Flags
//!
//! - `sqlite` (default): [`SqliteStore`]

mod error;
mod memory;
mod record;
#[cfg(feature = "sqlite")]
mod sqlite;

pub use error::StoreError;
pub use memory::MemoryStore;
pub use record::{CompletedGame, Participant};
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStore;

use std::sync::Arc;

use castle_protocol::{GameId, GameRecord, HistoryEntry, UserId};

/// Blocking persistence operations.
///
/// `Send + Sync + 'static` because one store is shared by every worker
/// thread for the lifetime of the server.
pub trait GameStore: Send + Sync + 'static {
    /// Inserts a game row for a new pairing and returns its generated id.
    fn create_game(&self, white: &Participant, black: &Participant) -> Result<GameId, StoreError>;

    /// Writes the result, reason, moves and time log of a finished game,
    /// plus one result row per identified player.
    fn save_result(&self, game: &CompletedGame) -> Result<(), StoreError>;

    /// Loads one game. `Ok(None)` if there is no such row.
    fn load_game(&self, game_id: GameId) -> Result<Option<GameRecord>, StoreError>;

    /// One page of `user`'s finished games, newest first.
    ///
    /// `batch` is the zero-based page index.
    fn history(&self, user: UserId, batch: u32, page_size: u32) -> Result<Vec<HistoryEntry>, StoreError>;
}

impl<S: GameStore + ?Sized> GameStore for Arc<S> {
    fn create_game(&self, white: &Participant, black: &Participant) -> Result<GameId, StoreError> {
        (**self).create_game(white, black)
    }

    fn save_result(&self, game: &CompletedGame) -> Result<(), StoreError> {
        (**self).save_result(game)
    }

    fn load_game(&self, game_id: GameId) -> Result<Option<GameRecord>, StoreError> {
        (**self).load_game(game_id)
    }

    fn history(&self, user: UserId, batch: u32, page_size: u32) -> Result<Vec<HistoryEntry>, StoreError> {
        (**self).history(user, batch, page_size)
    }
}
