//! SQLite backend.

use std::path::{Path, PathBuf};
use std::time::Duration;

use castle_exec::ResourcePool;
use castle_protocol::{EndReason, GameId, GameRecord, GameResult, HistoryEntry, Standing, UserId};
use rusqlite::{Connection, OptionalExtension, params};
use tracing::{debug, info};

use crate::{CompletedGame, GameStore, Participant, StoreError};

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS game (
        id              INTEGER PRIMARY KEY AUTOINCREMENT,
        white_name      TEXT NOT NULL,
        black_name      TEXT NOT NULL,
        white_id        INTEGER,
        black_id        INTEGER,
        move_history    TEXT NOT NULL DEFAULT '',
        move_time_stamp TEXT NOT NULL DEFAULT '',
        result          TEXT,
        reason          TEXT,
        created_at      INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
    );

    CREATE TABLE IF NOT EXISTS user_to_game (
        user_id INTEGER NOT NULL,
        game_id INTEGER NOT NULL REFERENCES game(id),
        result  TEXT NOT NULL,
        PRIMARY KEY (user_id, game_id)
    );

    CREATE INDEX IF NOT EXISTS idx_user_to_game_user ON user_to_game(user_id, game_id DESC);
";

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// A [`GameStore`] over a SQLite file.
///
/// Holds a fixed pool of connections, all opened up front. Each call
/// borrows one for its duration, blocking the worker if they are all busy.
/// The path must name a file; `:memory:` would give every pooled
/// connection its own empty database.
pub struct SqliteStore {
    path: PathBuf,
    pool: ResourcePool<Connection>,
}

impl SqliteStore {
    /// Opens (or creates) the database and fills the connection pool.
    ///
    /// Fails if the schema can't be applied or any connection can't be
    /// opened. There is no lazy retry: a store that exists is usable.
    pub fn open(path: impl AsRef<Path>, pool_size: usize) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();

        let setup = open_connection(&path)?;
        let _: String = setup.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
        setup.execute_batch(SCHEMA)?;
        drop(setup);

        let pool = ResourcePool::new(pool_size, || open_connection(&path))?;
        info!(path = %path.display(), connections = pool.size(), "game store opened");
        Ok(Self { path, pool })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Connections not currently borrowed.
    pub fn idle_connections(&self) -> usize {
        self.pool.idle()
    }
}

fn open_connection(path: &Path) -> Result<Connection, StoreError> {
    let conn = Connection::open(path)?;
    conn.busy_timeout(BUSY_TIMEOUT)?;
    Ok(conn)
}

impl GameStore for SqliteStore {
    fn create_game(&self, white: &Participant, black: &Participant) -> Result<GameId, StoreError> {
        let conn = self.pool.acquire();
        conn.execute(
            "INSERT INTO game (white_name, black_name, white_id, black_id) VALUES (?1, ?2, ?3, ?4)",
            params![
                white.name,
                black.name,
                white.user_id.map(|u| u.0),
                black.user_id.map(|u| u.0),
            ],
        )?;
        let id = GameId(conn.last_insert_rowid());
        debug!(game_id = %id, "game row created");
        Ok(id)
    }

    fn save_result(&self, game: &CompletedGame) -> Result<(), StoreError> {
        let mut conn = self.pool.acquire();
        let tx = conn.transaction()?;

        let updated = tx.execute(
            "UPDATE game SET move_history = ?1, reason = ?2, result = ?3, move_time_stamp = ?4
             WHERE id = ?5",
            params![
                game.moves,
                game.reason.code().to_string(),
                game.result.code().to_string(),
                game.time_log,
                game.game_id.0,
            ],
        )?;
        if updated == 0 {
            // Dropping the transaction rolls it back.
            return Err(StoreError::MissingGame(game.game_id));
        }

        for (side, color) in [
            (&game.white, castle_protocol::Color::White),
            (&game.black, castle_protocol::Color::Black),
        ] {
            let Some(user) = side.user_id else {
                continue;
            };
            tx.execute(
                "INSERT INTO user_to_game (user_id, game_id, result) VALUES (?1, ?2, ?3)",
                params![
                    user.0,
                    game.game_id.0,
                    game.result.standing_of(color).code().to_string()
                ],
            )?;
        }

        tx.commit()?;
        debug!(game_id = %game.game_id, "game result saved");
        Ok(())
    }

    fn load_game(&self, game_id: GameId) -> Result<Option<GameRecord>, StoreError> {
        let conn = self.pool.acquire();
        let row = conn
            .query_row(
                "SELECT white_name, black_name, white_id, black_id, move_history,
                        move_time_stamp, result, reason
                 FROM game WHERE id = ?1",
                params![game_id.0],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, Option<i64>>(2)?,
                        row.get::<_, Option<i64>>(3)?,
                        row.get::<_, String>(4)?,
                        row.get::<_, String>(5)?,
                        row.get::<_, Option<String>>(6)?,
                        row.get::<_, Option<String>>(7)?,
                    ))
                },
            )
            .optional()?;

        let Some((white, black, white_id, black_id, moves, time_log, result, reason)) = row else {
            return Ok(None);
        };
        Ok(Some(GameRecord {
            game_id,
            white,
            black,
            white_id: white_id.map(UserId),
            black_id: black_id.map(UserId),
            moves,
            time_log,
            result: decode("result", result, GameResult::from_code)?,
            reason: decode("reason", reason, EndReason::from_code)?,
        }))
    }

    fn history(&self, user: UserId, batch: u32, page_size: u32) -> Result<Vec<HistoryEntry>, StoreError> {
        let conn = self.pool.acquire();
        let mut stmt = conn.prepare(
            "SELECT g.id, g.white_name, g.black_name, u.result, g.reason
             FROM user_to_game u JOIN game g ON g.id = u.game_id
             WHERE u.user_id = ?1
             ORDER BY g.id DESC
             LIMIT ?2 OFFSET ?3",
        )?;
        let offset = i64::from(batch) * i64::from(page_size);
        let rows = stmt.query_map(params![user.0, i64::from(page_size), offset], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, Option<String>>(4)?,
            ))
        })?;

        let mut entries = Vec::new();
        for row in rows {
            let (id, white, black, standing, reason) = row?;
            let standing = decode_code("user_to_game.result", standing, Standing::from_code)?;
            entries.push(HistoryEntry {
                game_id: GameId(id),
                white,
                black,
                standing,
                reason: decode("reason", reason, EndReason::from_code)?,
            });
        }
        Ok(entries)
    }
}

/// Decodes a nullable one-character code column. `NULL` decodes to `None`.
fn decode<T>(
    column: &'static str,
    value: Option<String>,
    parse: fn(char) -> Option<T>,
) -> Result<Option<T>, StoreError> {
    value.map(|v| decode_code(column, v, parse)).transpose()
}

fn decode_code<T>(column: &'static str, value: String, parse: fn(char) -> Option<T>) -> Result<T, StoreError> {
    let mut chars = value.chars();
    let code = match (chars.next(), chars.next()) {
        (Some(c), None) => parse(c),
        _ => None,
    };
    code.ok_or(StoreError::Corrupt { column, value })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_codes() {
        assert_eq!(decode("r", None, GameResult::from_code).unwrap(), None);
        assert_eq!(
            decode("r", Some("w".into()), GameResult::from_code).unwrap(),
            Some(GameResult::WhiteWins)
        );
        assert!(decode("r", Some("x".into()), GameResult::from_code).is_err());
        assert!(decode("r", Some("ww".into()), GameResult::from_code).is_err());
    }
}
