//! Player sessions for Castle.
//!
//! This crate holds the per-player half of the server's state:
//!
//! 1. **Identity**: who a player is, if anyone ([`Identity`],
//!    [`Authenticator`]). Casual players may stay anonymous.
//! 2. **Sessions**: what a player is doing right now ([`PlayerSession`]):
//!    color, turn, flags, clocks, and links to an opponent and a game.
//! 3. **Registries**: where every session lives ([`Registry`]): the
//!    arena of sessions plus the active / disconnected / live-game maps.
//!
//! # Stable keys instead of pointers
//!
//! Sessions are never referenced by address. Every session gets a
//! [`SessionKey`] when it is created and keeps it until it is removed;
//! opponents, games, and timer callbacks hold keys and look the session up
//! again when they need it. A lookup that fails means the session is gone,
//! and the caller simply stops (guard-and-return).
//!
//! ```text
//! Game layer (above)     ← pairs sessions, refers to them by SessionKey
//!     ↕
//! Session layer (this)   ← owns sessions, clocks, and registries
//!     ↕
//! Protocol / Clock / Transport (below)
//! ```

#![allow(async_fn_in_trait)]

mod auth;
mod error;
mod keys;
mod player;
mod registry;

pub use auth::{Authenticator, Identity};
pub use error::SessionError;
pub use keys::{GameKey, SessionKey};
pub use player::PlayerSession;
pub use registry::{Placement, Registry};
