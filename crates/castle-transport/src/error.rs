/// Errors raised while listening for or reading from connections.
///
/// Writes never surface here: an [`Outbound`](crate::Outbound) whose
/// writer is gone drops frames silently.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("could not bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("accept failed: {0}")]
    Accept(#[source] std::io::Error),

    /// The client connected but the WebSocket upgrade failed.
    #[error("websocket upgrade failed: {0}")]
    Upgrade(String),

    #[error("receive failed: {0}")]
    Receive(String),
}
