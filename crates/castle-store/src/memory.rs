//! In-memory backend.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};

use castle_protocol::{Color, GameId, GameRecord, HistoryEntry, Standing, UserId};
use parking_lot::Mutex;

use crate::{CompletedGame, GameStore, Participant, StoreError};

#[derive(Debug, Default)]
struct Tables {
    next_id: i64,
    games: BTreeMap<GameId, GameRecord>,
    /// `(user, game, standing)`, one per identified player per result.
    user_games: Vec<(UserId, GameId, Standing)>,
}

/// A [`GameStore`] kept in process memory.
///
/// Nothing survives a restart. Writes can be made to fail on demand,
/// which is how the server's persistence-failure paths are exercised.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
    fail_creates: AtomicBool,
    fail_saves: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every following `create_game` fail (or succeed again).
    pub fn fail_creates(&self, fail: bool) {
        self.fail_creates.store(fail, Ordering::SeqCst);
    }

    /// Makes every following `save_result` fail (or succeed again).
    pub fn fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    /// Number of game rows.
    pub fn game_count(&self) -> usize {
        self.tables.lock().games.len()
    }

    /// Number of games that have a saved result.
    pub fn result_count(&self) -> usize {
        self.tables
            .lock()
            .games
            .values()
            .filter(|g| g.result.is_some())
            .count()
    }
}

impl GameStore for MemoryStore {
    fn create_game(&self, white: &Participant, black: &Participant) -> Result<GameId, StoreError> {
        if self.fail_creates.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("create_game disabled".into()));
        }
        let mut tables = self.tables.lock();
        tables.next_id += 1;
        let game_id = GameId(tables.next_id);
        tables.games.insert(
            game_id,
            GameRecord {
                game_id,
                white: white.name.clone(),
                black: black.name.clone(),
                white_id: white.user_id,
                black_id: black.user_id,
                moves: String::new(),
                time_log: String::new(),
                result: None,
                reason: None,
            },
        );
        Ok(game_id)
    }

    fn save_result(&self, game: &CompletedGame) -> Result<(), StoreError> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("save_result disabled".into()));
        }
        let mut tables = self.tables.lock();
        let row = tables
            .games
            .get_mut(&game.game_id)
            .ok_or(StoreError::MissingGame(game.game_id))?;
        row.moves = game.moves.clone();
        row.time_log = game.time_log.clone();
        row.result = Some(game.result);
        row.reason = Some(game.reason);

        for (side, color) in [(&game.white, Color::White), (&game.black, Color::Black)] {
            if let Some(user) = side.user_id {
                let standing = game.result.standing_of(color);
                tables.user_games.push((user, game.game_id, standing));
            }
        }
        Ok(())
    }

    fn load_game(&self, game_id: GameId) -> Result<Option<GameRecord>, StoreError> {
        Ok(self.tables.lock().games.get(&game_id).cloned())
    }

    fn history(&self, user: UserId, batch: u32, page_size: u32) -> Result<Vec<HistoryEntry>, StoreError> {
        let tables = self.tables.lock();
        let mut mine: Vec<_> = tables
            .user_games
            .iter()
            .filter(|(u, _, _)| *u == user)
            .collect();
        mine.sort_by(|a, b| b.1.cmp(&a.1));

        let skip = batch as usize * page_size as usize;
        Ok(mine
            .into_iter()
            .skip(skip)
            .take(page_size as usize)
            .filter_map(|(_, game_id, standing)| {
                let game = tables.games.get(game_id)?;
                Some(HistoryEntry {
                    game_id: *game_id,
                    white: game.white.clone(),
                    black: game.black.clone(),
                    standing: *standing,
                    reason: game.reason,
                })
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use castle_protocol::{EndReason, GameResult};

    use super::*;

    #[test]
    fn test_fail_creates_toggle() {
        let store = MemoryStore::new();
        store.fail_creates(true);
        let a = Participant::anonymous("white");
        let b = Participant::anonymous("black");
        assert!(store.create_game(&a, &b).is_err());
        store.fail_creates(false);
        assert_eq!(store.create_game(&a, &b).unwrap(), GameId(1));
    }

    #[test]
    fn test_save_result_unknown_game_is_missing() {
        let store = MemoryStore::new();
        let game = CompletedGame {
            game_id: GameId(9),
            white: Participant::anonymous("w"),
            black: Participant::anonymous("b"),
            result: GameResult::Draw,
            reason: EndReason::Agreement,
            moves: String::new(),
            time_log: String::new(),
        };
        assert!(matches!(
            store.save_result(&game),
            Err(StoreError::MissingGame(GameId(9)))
        ));
    }
}
