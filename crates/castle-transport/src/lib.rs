//! Transport layer for Castle.
//!
//! - [`Transport`] / [`Connection`] abstract over how clients connect.
//!   A connection's read half is driven by its own task; its write half
//!   is an [`Outbound`] link that anyone holding a clone can push frames
//!   into.
//! - [`Hub`] is the reactor's view of all links: direct sends plus topic
//!   publish/subscribe for spectators.
//!
//! # Feature Flags
//!
//! - `websocket` (default): WebSocket transport via `tokio-tungstenite`

#![allow(async_fn_in_trait)]

mod error;
mod hub;
mod link;
#[cfg(feature = "websocket")]
mod websocket;

pub use error::TransportError;
pub use hub::Hub;
pub use link::{Frame, Outbound, OutboundReceiver};
#[cfg(feature = "websocket")]
pub use websocket::{WebSocketConnection, WebSocketTransport};

use std::fmt;

/// Identifies one client connection for its whole lifetime. Ids are
/// handed out by the transport and never reused within a process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// A listener that yields client connections to the accept loop.
pub trait Transport: Send + Sync + 'static {
    type Connection: Connection;
    type Error: std::error::Error + Send + Sync;

    /// Next upgraded connection. Failures are per-connection; the accept
    /// loop logs them and keeps going.
    async fn accept(&mut self) -> Result<Self::Connection, Self::Error>;

    /// Stops accepting. Connections already handed out are unaffected.
    async fn shutdown(&self) -> Result<(), Self::Error>;
}

/// A single accepted connection.
///
/// Reading happens through `&mut self` on the task that owns the
/// connection. Writing goes through [`Connection::outbound`], which can be
/// cloned and handed to other tasks or threads.
pub trait Connection: Send + 'static {
    type Error: std::error::Error + Send + Sync;

    /// Next data frame from the client, or `Ok(None)` once it has closed.
    async fn recv(&mut self) -> Result<Option<Vec<u8>>, Self::Error>;

    /// The write half of this connection.
    fn outbound(&self) -> Outbound;

    fn id(&self) -> ConnectionId;
}
