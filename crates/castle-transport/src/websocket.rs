//! WebSocket transport implementation using `tokio-tungstenite`.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;

use crate::{Connection, ConnectionId, Frame, Outbound, OutboundReceiver, Transport, TransportError};

/// Counter for generating unique connection IDs.
static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

type WsStream = WebSocketStream<TcpStream>;

/// A WebSocket-based [`Transport`] that listens for incoming connections.
pub struct WebSocketTransport {
    listener: TcpListener,
}

impl WebSocketTransport {
    /// Binds a new WebSocket transport to the given address.
    pub async fn bind(addr: &str) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| TransportError::Bind {
                addr: addr.to_string(),
                source,
            })?;
        tracing::info!(addr, "WebSocket transport listening");
        Ok(Self { listener })
    }

    /// The address actually bound (useful with port 0).
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }
}

impl Transport for WebSocketTransport {
    type Connection = WebSocketConnection;
    type Error = TransportError;

    async fn accept(&mut self) -> Result<Self::Connection, Self::Error> {
        let (stream, addr) = self
            .listener
            .accept()
            .await
            .map_err(TransportError::Accept)?;

        let ws = tokio_tungstenite::accept_async(stream)
            .await
            .map_err(|e| TransportError::Upgrade(e.to_string()))?;

        let id = ConnectionId::new(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed));
        tracing::debug!(%id, %addr, "accepted WebSocket connection");

        let (sink, stream) = ws.split();
        let (outbound, frames) = Outbound::channel(id);
        tokio::spawn(write_frames(id, sink, frames));

        Ok(WebSocketConnection {
            id,
            stream,
            outbound,
        })
    }

    async fn shutdown(&self) -> Result<(), Self::Error> {
        Ok(())
    }
}

/// A single WebSocket connection.
///
/// The read half lives here; the write half is a background task fed by
/// [`Connection::outbound`].
pub struct WebSocketConnection {
    id: ConnectionId,
    stream: SplitStream<WsStream>,
    outbound: Outbound,
}

impl Connection for WebSocketConnection {
    type Error = TransportError;

    async fn recv(&mut self) -> Result<Option<Vec<u8>>, Self::Error> {
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Binary(data))) => return Ok(Some(data.into())),
                Some(Ok(Message::Text(text))) => return Ok(Some(text.as_bytes().to_vec())),
                Some(Ok(Message::Close(_))) | None => return Ok(None),
                Some(Ok(_)) => continue, // ping/pong/frame
                Some(Err(e)) => return Err(TransportError::Receive(e.to_string())),
            }
        }
    }

    fn outbound(&self) -> Outbound {
        self.outbound.clone()
    }

    fn id(&self) -> ConnectionId {
        self.id
    }
}

/// Drains queued frames into the socket until closed or the peer is gone.
///
/// JSON payloads go out as text frames so browsers can read them directly.
async fn write_frames(id: ConnectionId, mut sink: SplitSink<WsStream, Message>, mut frames: OutboundReceiver) {
    while let Some(frame) = frames.recv().await {
        let msg = match frame {
            Frame::Data(data) => match String::from_utf8(data) {
                Ok(text) => Message::Text(text.into()),
                Err(e) => Message::Binary(e.into_bytes().into()),
            },
            Frame::Close => break,
        };
        if let Err(e) = sink.send(msg).await {
            tracing::debug!(%id, error = %e, "write failed, stopping writer");
            return;
        }
    }
    let _ = sink.close().await;
    tracing::trace!(%id, "writer finished");
}
