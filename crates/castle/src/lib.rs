//! # Castle
//!
//! A concurrent chess session server.
//!
//! Players connect over WebSocket, get paired first-come in a ranked or
//! casual queue, and play timed games with draw offers, resignation,
//! reconnection after a dropped connection, and rematches. Spectators
//! follow a game's topic; finished games are written to a store.
//!
//! ## Threads
//!
//! - one Tokio task per connection, reading frames and forwarding them
//! - one **reactor** thread owning every session, game, and registry
//!   ([`Context`]); nothing else touches that state
//! - a small [`WorkerPool`](castle_exec::WorkerPool) running blocking
//!   store calls, handing results back through a
//!   [`LoopMarshaler`](castle_exec::LoopMarshaler)
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use castle::prelude::*;
//!
//! struct OpenDoor;
//!
//! impl Authenticator for OpenDoor {
//!     async fn authenticate(&self, token: &str) -> Result<Identity, SessionError> {
//!         Ok(Identity::new(UserId(token.len() as i64), token))
//!     }
//! }
//!
//! # async fn run() -> Result<(), CastleError> {
//! let server = CastleServerBuilder::new()
//!     .bind("0.0.0.0:8080")
//!     .build(OpenDoor)
//!     .await?;
//! server.run().await
//! # }
//! ```

mod config;
mod context;
mod error;
mod handler;
mod lobby;
mod play;
mod queries;
mod reactor;
mod server;

pub use config::ServerConfig;
pub use context::{Admission, Context};
pub use error::CastleError;
pub use play::ClockKind;
pub use reactor::{Reactor, ServerHandle, ServerStats};
pub use server::{CastleServer, CastleServerBuilder};

/// Everything needed to run a server or drive a [`Context`] directly.
pub mod prelude {
    pub use crate::{
        Admission, CastleError, CastleServer, CastleServerBuilder, ClockKind, Context, Reactor,
        ServerConfig, ServerHandle, ServerStats,
    };
    pub use castle_game::{Rules, RulesFactory};
    pub use castle_protocol::{
        ClientMessage, ClockReading, Color, EndReason, GameId, GameResult, Hello, QueueKind,
        ServerMessage, UserId,
    };
    pub use castle_session::{Authenticator, Identity, SessionError};
    pub use castle_store::{GameStore, MemoryStore};
}
