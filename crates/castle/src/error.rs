//! Unified error type for the Castle server.

use castle_exec::PoolError;
use castle_game::GameError;
use castle_protocol::ProtocolError;
use castle_session::SessionError;
use castle_store::StoreError;
use castle_transport::TransportError;

/// Wire codes carried by `ServerMessage::Error`.
pub(crate) mod code {
    pub const BAD_REQUEST: u16 = 400;
    pub const UNAUTHORIZED: u16 = 401;
    pub const FORBIDDEN: u16 = 403;
    pub const NOT_FOUND: u16 = 404;
    pub const CONFLICT: u16 = 409;
    pub const SERVER_ERROR: u16 = 500;
}

/// Top-level error that wraps all crate-specific errors.
///
/// The `#[from]` attribute on each variant generates the `From` impl, so
/// `?` converts sub-crate errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum CastleError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Game(#[from] GameError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Pool(#[from] PoolError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// The reactor thread is gone; nothing can be scheduled on it.
    #[error("reactor stopped")]
    ReactorStopped,

    #[error("bad configuration: {0}")]
    Config(String),
}
