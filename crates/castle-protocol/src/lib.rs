//! Wire protocol for Castle.
//!
//! - **Types** ([`UserId`], [`GameId`], [`Color`], [`GameResult`],
//!   [`EndReason`], ...): identifiers and value types every layer shares.
//! - **Messages** ([`Hello`], [`ClientMessage`], [`ServerMessage`]): what
//!   travels over a connection.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]): how messages become bytes.
//!
//! The protocol layer knows nothing about connections, sessions, or games;
//! it only defines shapes and their encoding.

mod codec;
mod error;
mod messages;
mod types;

/// Version clients must send in their [`Hello`].
pub const PROTOCOL_VERSION: u32 = 1;

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::ProtocolError;
pub use messages::{
    ClientMessage, GameRecord, Hello, HistoryEntry, LiveGameEntry, RematchBlock, ServerMessage,
};
pub use types::{ClockReading, Color, EndReason, GameId, GameResult, QueueKind, Standing, UserId};
