//! Error types for the session layer.

use castle_protocol::UserId;

use crate::SessionKey;

/// Errors that can occur while authenticating or registering sessions.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The token was invalid, expired, or rejected by the
    /// [`Authenticator`](crate::Authenticator).
    #[error("authentication failed: {0}")]
    AuthFailed(String),

    /// No session exists under this key. It was released, or never existed.
    #[error("no session {0}")]
    NotFound(SessionKey),

    /// The player already has a live session. Only one is allowed.
    #[error("player {0} already has an active session")]
    AlreadyActive(UserId),

    /// Anonymous sessions have no stable id and can't be registered by one.
    #[error("{0} is anonymous")]
    Anonymous(SessionKey),
}
