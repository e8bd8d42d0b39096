//! SQLite store against a real database file.

#![cfg(feature = "sqlite")]

use std::sync::Arc;
use std::thread;

use castle_protocol::{EndReason, GameId, GameResult, Standing, UserId};
use castle_store::{CompletedGame, GameStore, Participant, SqliteStore};

fn open(dir: &tempfile::TempDir, pool: usize) -> SqliteStore {
    SqliteStore::open(dir.path().join("castle.db"), pool).expect("store should open")
}

fn alice() -> Participant {
    Participant::new(Some(UserId(1)), "alice")
}

fn bob() -> Participant {
    Participant::new(Some(UserId(2)), "bob")
}

fn finished(game_id: GameId, white: Participant, black: Participant, result: GameResult) -> CompletedGame {
    CompletedGame {
        game_id,
        white,
        black,
        result,
        reason: EndReason::Resignation,
        moves: "e2e4 e7e5".into(),
        time_log: "300-300 298-300 298-297".into(),
    }
}

#[test]
fn test_create_game_returns_increasing_ids() {
    let dir = tempfile::tempdir().unwrap();
    let store = open(&dir, 2);

    let first = store.create_game(&alice(), &bob()).unwrap();
    let second = store.create_game(&bob(), &alice()).unwrap();
    assert!(second > first);

    let record = store.load_game(first).unwrap().expect("row exists");
    assert_eq!(record.white, "alice");
    assert_eq!(record.black_id, Some(UserId(2)));
    assert_eq!(record.result, None);
    assert_eq!(record.moves, "");
}

#[test]
fn test_save_result_updates_row_and_history() {
    let dir = tempfile::tempdir().unwrap();
    let store = open(&dir, 2);

    let id = store.create_game(&alice(), &bob()).unwrap();
    store
        .save_result(&finished(id, alice(), bob(), GameResult::WhiteWins))
        .unwrap();

    let record = store.load_game(id).unwrap().unwrap();
    assert_eq!(record.result, Some(GameResult::WhiteWins));
    assert_eq!(record.reason, Some(EndReason::Resignation));
    assert_eq!(record.time_log, "300-300 298-300 298-297");

    let alice_games = store.history(UserId(1), 0, 10).unwrap();
    assert_eq!(alice_games.len(), 1);
    assert_eq!(alice_games[0].standing, Standing::Won);
    let bob_games = store.history(UserId(2), 0, 10).unwrap();
    assert_eq!(bob_games[0].standing, Standing::Lost);
}

#[test]
fn test_save_result_anonymous_side_has_no_history_row() {
    let dir = tempfile::tempdir().unwrap();
    let store = open(&dir, 1);

    let guest = Participant::anonymous("black");
    let id = store.create_game(&alice(), &guest).unwrap();
    store
        .save_result(&finished(id, alice(), guest, GameResult::Draw))
        .unwrap();

    let games = store.history(UserId(1), 0, 10).unwrap();
    assert_eq!(games[0].standing, Standing::Drew);
    assert_eq!(games[0].black, "black");
}

#[test]
fn test_save_result_missing_row_is_error() {
    let dir = tempfile::tempdir().unwrap();
    let store = open(&dir, 1);
    let err = store
        .save_result(&finished(GameId(77), alice(), bob(), GameResult::Draw))
        .unwrap_err();
    assert!(matches!(err, castle_store::StoreError::MissingGame(GameId(77))));
    assert!(store.history(UserId(1), 0, 10).unwrap().is_empty());
}

#[test]
fn test_history_pages_newest_first() {
    let dir = tempfile::tempdir().unwrap();
    let store = open(&dir, 1);

    let mut ids = Vec::new();
    for _ in 0..5 {
        let id = store.create_game(&alice(), &bob()).unwrap();
        store
            .save_result(&finished(id, alice(), bob(), GameResult::BlackWins))
            .unwrap();
        ids.push(id);
    }

    let page0 = store.history(UserId(1), 0, 2).unwrap();
    let page2 = store.history(UserId(1), 2, 2).unwrap();
    assert_eq!(
        page0.iter().map(|e| e.game_id).collect::<Vec<_>>(),
        vec![ids[4], ids[3]]
    );
    assert_eq!(page2.len(), 1);
    assert_eq!(page2[0].game_id, ids[0]);
    assert!(store.history(UserId(1), 3, 2).unwrap().is_empty());
}

#[test]
fn test_load_unknown_game_is_none() {
    let dir = tempfile::tempdir().unwrap();
    let store = open(&dir, 1);
    assert!(store.load_game(GameId(404)).unwrap().is_none());
}

#[test]
fn test_concurrent_writers_share_small_pool() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(open(&dir, 2));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let store = Arc::clone(&store);
            thread::spawn(move || store.create_game(&alice(), &bob()).unwrap())
        })
        .collect();
    let mut ids: Vec<GameId> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    ids.sort();
    ids.dedup();

    assert_eq!(ids.len(), 8);
    assert_eq!(store.idle_connections(), 2);
}

#[test]
fn test_reopen_keeps_rows() {
    let dir = tempfile::tempdir().unwrap();
    let id = open(&dir, 1).create_game(&alice(), &bob()).unwrap();
    let store = open(&dir, 1);
    assert!(store.load_game(id).unwrap().is_some());
}
