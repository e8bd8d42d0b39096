//! Shared harness: a `Context` driven by hand on the test thread.
//!
//! Store work runs on a real worker pool against a [`MemoryStore`];
//! completions are drained with [`Harness::settle`]. Clock timers run on
//! the test's Tokio runtime, so `start_paused` tests move time with
//! [`Harness::advance`].

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use castle::prelude::*;
use castle_exec::{CancelFlag, LoopReceiver, WorkerPool};
use castle_game::ScriptedRules;
use castle_session::SessionKey;
use castle_transport::{ConnectionId, Frame, Outbound, OutboundReceiver};

pub fn scripted() -> RulesFactory {
    Arc::new(|| Box::new(ScriptedRules::new()) as Box<dyn Rules>)
}

/// Defaults with the periodic clock sync off; tests call `sync_clocks`
/// themselves.
pub fn config() -> ServerConfig {
    ServerConfig {
        sync_interval: None,
        worker_threads: 2,
        ..ServerConfig::default()
    }
}

pub fn identity(id: i64, name: &str) -> Option<Identity> {
    Some(Identity::new(UserId(id), name))
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// The far end of one connection's outbound link.
pub struct Client {
    pub conn: ConnectionId,
    rx: OutboundReceiver,
    inbox: Vec<ServerMessage>,
    closed: bool,
}

impl Client {
    fn pump(&mut self) {
        while let Some(frame) = self.rx.try_recv() {
            match frame {
                Frame::Data(bytes) => {
                    let message = serde_json::from_slice(&bytes).expect("server sent invalid json");
                    self.inbox.push(message);
                }
                Frame::Close => self.closed = true,
            }
        }
    }

    /// Everything received since the last call.
    pub fn take(&mut self) -> Vec<ServerMessage> {
        self.pump();
        std::mem::take(&mut self.inbox)
    }

    /// Whether the server asked for this connection to be closed.
    pub fn is_closed(&mut self) -> bool {
        self.pump();
        self.closed
    }

    /// Error codes among the pending messages.
    pub fn error_codes(&mut self) -> Vec<u16> {
        self.take()
            .into_iter()
            .filter_map(|m| match m {
                ServerMessage::Error { code, .. } => Some(code),
                _ => None,
            })
            .collect()
    }

    /// The `GameOver` frames among the pending messages.
    pub fn game_overs(&mut self) -> Vec<(GameResult, EndReason)> {
        self.take()
            .into_iter()
            .filter_map(|m| match m {
                ServerMessage::GameOver { result, reason, .. } => Some((result, reason)),
                _ => None,
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

pub struct Harness {
    pub ctx: Context,
    receiver: LoopReceiver<Context>,
    pub store: Arc<MemoryStore>,
    next_conn: u64,
}

impl Harness {
    pub fn new() -> Self {
        Self::with(config(), scripted())
    }

    pub fn with(config: ServerConfig, rules: RulesFactory) -> Self {
        let store = Arc::new(MemoryStore::new());
        let workers = Arc::new(WorkerPool::new(config.worker_threads).expect("worker pool"));
        let (marshal, receiver) = castle_exec::marshaler::<Context>();
        let ctx = Context::new(config, rules, store.clone(), workers, marshal);
        Self {
            ctx,
            receiver,
            store,
            next_conn: 0,
        }
    }

    pub fn connect(&mut self, admission: Admission) -> Client {
        let client = self.open(admission);
        self.settle();
        client
    }

    /// Opens a connection without draining completions, so store work it
    /// triggered is still in flight.
    pub fn open(&mut self, admission: Admission) -> Client {
        self.next_conn += 1;
        let conn = ConnectionId::new(self.next_conn);
        let (link, rx) = Outbound::channel(conn);
        self.ctx.on_open(link, admission, CancelFlag::new());
        Client {
            conn,
            rx,
            inbox: Vec::new(),
            closed: false,
        }
    }

    pub fn player(&mut self, identity: Option<Identity>, queue: QueueKind) -> Client {
        self.connect(Admission::Play { identity, queue })
    }

    pub fn send(&mut self, client: &Client, message: ClientMessage) {
        self.ctx.on_message(client.conn, message);
        self.settle();
    }

    pub fn disconnect(&mut self, client: &Client) {
        self.ctx.on_close(client.conn);
        self.settle();
    }

    /// Runs completions until no store task is outstanding.
    pub fn settle(&mut self) {
        loop {
            self.receiver.run_pending(&mut self.ctx);
            if self.ctx.pending_tasks() == 0 {
                break;
            }
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    /// Moves paused time forward, lets due timers fire, then settles.
    pub async fn advance(&mut self, by: Duration) {
        tokio::time::sleep(by).await;
        for _ in 0..8 {
            tokio::task::yield_now().await;
        }
        self.settle();
    }

    pub fn key_of(&self, client: &Client) -> SessionKey {
        self.ctx.session_of(client.conn).expect("client has no session")
    }

    /// Pairs two identified casual players and returns them as
    /// `(white, black)` with their start messages consumed.
    pub fn start_game(&mut self) -> (Client, Client) {
        let a = self.player(identity(1, "alice"), QueueKind::Casual);
        let b = self.player(identity(2, "bob"), QueueKind::Casual);
        self.seat_pair(a, b)
    }

    /// Like [`start_game`](Self::start_game) for two anonymous players.
    pub fn start_anonymous_game(&mut self) -> (Client, Client) {
        let a = self.player(None, QueueKind::Casual);
        let b = self.player(None, QueueKind::Casual);
        self.seat_pair(a, b)
    }

    fn seat_pair(&mut self, mut a: Client, mut b: Client) -> (Client, Client) {
        let color = start_color(&a.take());
        b.take();
        match color {
            Color::White => (a, b),
            Color::Black => (b, a),
        }
    }
}

/// The color in the `StartGame` among `messages`.
pub fn start_color(messages: &[ServerMessage]) -> Color {
    messages
        .iter()
        .find_map(|m| match m {
            ServerMessage::StartGame { color, .. } => Some(*color),
            _ => None,
        })
        .expect("no start-game message")
}

/// The game id in the `StartGame` among `messages`.
pub fn start_game_id(messages: &[ServerMessage]) -> Option<GameId> {
    messages.iter().find_map(|m| match m {
        ServerMessage::StartGame { game_id, .. } => Some(*game_id),
        _ => None,
    })
}
