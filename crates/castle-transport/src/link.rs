//! Outbound links: the write half of a connection as a channel.

use tokio::sync::mpsc;

use crate::ConnectionId;

/// One item queued for a connection's writer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Data(Vec<u8>),
    /// Flush what is queued, then close the connection.
    Close,
}

/// Cloneable handle that queues frames for one connection.
///
/// Sending never blocks and never fails loudly: once the writer is gone
/// (the peer disconnected) frames are dropped and `send` returns `false`.
#[derive(Debug, Clone)]
pub struct Outbound {
    id: ConnectionId,
    tx: mpsc::UnboundedSender<Frame>,
}

impl Outbound {
    /// Creates a link and the receiving end its writer drains.
    pub fn channel(id: ConnectionId) -> (Self, OutboundReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { id, tx }, OutboundReceiver { rx })
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Queues `data`. Returns `false` if the writer has gone away.
    pub fn send(&self, data: Vec<u8>) -> bool {
        self.tx.send(Frame::Data(data)).is_ok()
    }

    /// Asks the writer to close the connection after queued frames.
    pub fn close(&self) {
        let _ = self.tx.send(Frame::Close);
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Receiving end of an [`Outbound`] link.
#[derive(Debug)]
pub struct OutboundReceiver {
    rx: mpsc::UnboundedReceiver<Frame>,
}

impl OutboundReceiver {
    /// Waits for the next frame; `None` once every sender is gone.
    pub async fn recv(&mut self) -> Option<Frame> {
        self.rx.recv().await
    }

    /// Returns the next frame if one is already queued.
    pub fn try_recv(&mut self) -> Option<Frame> {
        self.rx.try_recv().ok()
    }

    /// Drains every queued data frame, skipping close markers.
    pub fn drain(&mut self) -> Vec<Vec<u8>> {
        let mut out = Vec::new();
        while let Some(frame) = self.try_recv() {
            if let Frame::Data(data) = frame {
                out.push(data);
            }
        }
        out
    }
}
