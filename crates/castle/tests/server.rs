//! End-to-end tests: a real server on an OS-assigned port, tungstenite
//! clients speaking JSON, and an in-memory store.

use std::sync::Arc;
use std::time::Duration;

use castle::prelude::*;
use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio_tungstenite::tungstenite::Message;

// =========================================================================
// Authenticator and helpers
// =========================================================================

/// Accepts tokens of the form `<id>:<name>`.
struct TokenAuth;

impl Authenticator for TokenAuth {
    async fn authenticate(&self, token: &str) -> Result<Identity, SessionError> {
        let (id, name) = token
            .split_once(':')
            .ok_or_else(|| SessionError::AuthFailed("expected <id>:<name>".into()))?;
        let id: i64 = id
            .parse()
            .map_err(|_| SessionError::AuthFailed("id is not a number".into()))?;
        Ok(Identity::new(UserId(id), name))
    }
}

type ClientWs = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

/// Starts a server on a random port. Returns its address, a handle, and
/// the task running the accept loop.
async fn start_server() -> (String, ServerHandle, tokio::task::JoinHandle<Result<(), CastleError>>) {
    let server = CastleServerBuilder::new()
        .bind("127.0.0.1:0")
        .sync_interval(None)
        .store(Arc::new(MemoryStore::new()))
        .build(TokenAuth)
        .await
        .expect("server should build");
    let addr = server.local_addr().expect("bound address").to_string();
    let handle = server.handle();
    let task = tokio::spawn(server.run());
    (addr, handle, task)
}

async fn connect(addr: &str) -> ClientWs {
    let (ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}"))
        .await
        .expect("should connect");
    ws
}

async fn send(ws: &mut ClientWs, value: Value) {
    ws.send(Message::Text(value.to_string().into()))
        .await
        .expect("send should succeed");
}

/// The next JSON frame, or `None` once the server closed the connection.
async fn recv(ws: &mut ClientWs) -> Option<Value> {
    loop {
        let next = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timed out waiting for a frame");
        match next {
            Some(Ok(Message::Text(text))) => {
                return Some(serde_json::from_str(text.as_str()).expect("valid json"));
            }
            Some(Ok(Message::Close(_))) | None | Some(Err(_)) => return None,
            Some(Ok(_)) => continue,
        }
    }
}

/// Reads frames until one of type `kind` arrives.
async fn recv_type(ws: &mut ClientWs, kind: &str) -> Value {
    loop {
        let value = recv(ws)
            .await
            .unwrap_or_else(|| panic!("closed before a {kind} frame"));
        if value["type"] == kind {
            return value;
        }
    }
}

async fn play(addr: &str, token: &str) -> ClientWs {
    let mut ws = connect(addr).await;
    send(
        &mut ws,
        json!({"type": "play", "version": 1, "token": token, "queue": "casual"}),
    )
    .await;
    ws
}

/// Two players paired through the server, returned as `(white, black)`
/// along with the game id.
async fn paired(addr: &str) -> (ClientWs, ClientWs, i64) {
    let mut alice = play(addr, "1:alice").await;
    recv_type(&mut alice, "queued").await;
    let mut bob = play(addr, "2:bob").await;

    let start_a = recv_type(&mut alice, "start-game").await;
    let start_b = recv_type(&mut bob, "start-game").await;
    assert_eq!(start_a["game_id"], start_b["game_id"]);
    let game_id = start_a["game_id"].as_i64().expect("numeric game id");
    if start_a["color"] == "white" {
        (alice, bob, game_id)
    } else {
        (bob, alice, game_id)
    }
}

// =========================================================================
// Hello
// =========================================================================

#[tokio::test]
async fn test_wrong_version_refused_with_400() {
    let (addr, _handle, _task) = start_server().await;
    let mut ws = connect(&addr).await;
    send(&mut ws, json!({"type": "browse", "version": 99})).await;

    let error = recv(&mut ws).await.expect("an error frame");
    assert_eq!(error["type"], "error");
    assert_eq!(error["code"], 400);
    assert!(recv(&mut ws).await.is_none());
}

#[tokio::test]
async fn test_bad_token_refused_with_401() {
    let (addr, _handle, _task) = start_server().await;
    let mut ws = play(&addr, "nobody").await;

    let error = recv(&mut ws).await.expect("an error frame");
    assert_eq!(error["code"], 401);
    assert!(recv(&mut ws).await.is_none());
}

#[tokio::test]
async fn test_malformed_message_answered_and_connection_kept() {
    let (addr, _handle, _task) = start_server().await;
    let mut ws = connect(&addr).await;
    send(&mut ws, json!({"type": "browse", "version": 1})).await;

    send(&mut ws, json!({"type": "castle-queenside"})).await;
    let error = recv(&mut ws).await.expect("an error frame");
    assert_eq!(error["code"], 400);

    send(&mut ws, json!({"type": "list-live-games"})).await;
    let live = recv_type(&mut ws, "live-games").await;
    assert_eq!(live["games"], json!([]));
}

// =========================================================================
// Game flow
// =========================================================================

#[tokio::test]
async fn test_full_game_over_websocket() {
    let (addr, handle, _task) = start_server().await;
    let (mut white, mut black, game_id) = paired(&addr).await;

    send(&mut white, json!({"type": "move", "notation": "e4"})).await;
    let made = recv_type(&mut black, "move-made").await;
    assert_eq!(made["notation"], "e4");

    let mut watcher = connect(&addr).await;
    send(&mut watcher, json!({"type": "watch", "version": 1, "game_id": game_id})).await;
    let snapshot = recv_type(&mut watcher, "spectate").await;
    assert_eq!(snapshot["moves"], "e4");

    send(&mut black, json!({"type": "resign"})).await;
    for ws in [&mut white, &mut black, &mut watcher] {
        let over = recv_type(ws, "game-over").await;
        assert_eq!(over["result"], "white-wins");
        assert_eq!(over["reason"], "resignation");
    }

    // The result write is asynchronous; poll until it lands.
    let mut record = None;
    for _ in 0..50 {
        record = handle
            .fetch_game(GameId(game_id))
            .await
            .expect("reactor running")
            .filter(|r| r.result.is_some());
        if record.is_some() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    let record = record.expect("result stored");
    assert_eq!(record.result, Some(GameResult::WhiteWins));
    assert_eq!(record.moves, "e4");

    let history = handle.history(UserId(1), 0).await.expect("reactor running");
    assert_eq!(history.len(), 1);
}

#[tokio::test]
async fn test_dropped_player_reconnects_to_same_game() {
    let (addr, handle, _task) = start_server().await;
    let (mut white, black, game_id) = paired(&addr).await;
    let stats = handle.stats().await.expect("reactor running");
    assert_eq!(stats.active_players, 2);
    assert_eq!(stats.live_games, 1);
    let token = if is_black(&handle, 2).await { "2:bob" } else { "1:alice" };

    drop(black);
    recv_type(&mut white, "peer-left").await;

    let mut back = play(&addr, token).await;
    let resync = recv_type(&mut back, "resync").await;
    assert_eq!(resync["game_id"], game_id);
    assert_eq!(resync["color"], "black");
    recv_type(&mut white, "peer-returned").await;
    assert_eq!(
        handle.live_game_of(UserId(1)).await.expect("reactor running"),
        Some(GameId(game_id))
    );
}

/// Whether `user` holds the black pieces in their live game.
async fn is_black(handle: &ServerHandle, user: i64) -> bool {
    handle
        .with_context(move |ctx| {
            ctx.registry()
                .active_session(UserId(user))
                .and_then(|key| ctx.game_of(key)?.side_of(key))
                == Some(Color::Black)
        })
        .await
        .expect("reactor running")
}

// =========================================================================
// Shutdown
// =========================================================================

#[tokio::test]
async fn test_shutdown_closes_clients_and_stops_run() {
    let (addr, handle, task) = start_server().await;
    let mut ws = connect(&addr).await;
    send(&mut ws, json!({"type": "browse", "version": 1})).await;
    let stats = loop {
        let stats = handle.stats().await.expect("reactor running");
        if stats.connections == 1 {
            break stats;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    };
    assert_eq!(stats.sessions, 0);
    assert_eq!(stats.queued_tasks, 0);

    assert!(handle.shutdown());
    assert!(recv(&mut ws).await.is_none());

    let result = tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .expect("run should return after shutdown")
        .expect("run task should not panic");
    assert!(result.is_ok());
    assert!(handle.is_stopped());
    assert!(handle.live_games().await.is_err());
}
