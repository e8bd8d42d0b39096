//! Deferred execution on the reactor thread.
//!
//! The reactor owns a context value `C` (all session state) and nothing
//! else may touch it. Other threads send it closures instead:
//!
//! ```ignore
//! let (marshal, mut receiver) = castle_exec::marshaler::<Context>();
//!
//! // any thread
//! marshal.defer(move |ctx| ctx.on_game_created(white, black, result));
//!
//! // reactor loop
//! while let Some(callback) = receiver.recv().await {
//!     callback(&mut ctx);
//! }
//! ```
//!
//! Callbacks from one sender run in the order they were deferred. Each
//! one runs exactly once, unless the reactor has already stopped, in
//! which case [`LoopMarshaler::defer`] reports the loss.

use tokio::sync::mpsc;

/// A closure waiting to run against the reactor context.
pub type Deferred<C> = Box<dyn FnOnce(&mut C) + Send + 'static>;

/// Creates a connected marshaler/receiver pair.
pub fn marshaler<C: 'static>() -> (LoopMarshaler<C>, LoopReceiver<C>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (LoopMarshaler { tx }, LoopReceiver { rx })
}

/// Sending half. Cheap to clone, safe to use from any thread.
pub struct LoopMarshaler<C> {
    tx: mpsc::UnboundedSender<Deferred<C>>,
}

impl<C> Clone for LoopMarshaler<C> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<C: 'static> LoopMarshaler<C> {
    /// Schedules `callback` to run on the reactor thread.
    ///
    /// Returns `false` if the reactor is gone; the callback is dropped
    /// without running.
    pub fn defer<F>(&self, callback: F) -> bool
    where
        F: FnOnce(&mut C) + Send + 'static,
    {
        if self.tx.send(Box::new(callback)).is_err() {
            tracing::warn!("reactor stopped, deferred callback dropped");
            return false;
        }
        true
    }

    /// Whether the receiving reactor has gone away.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Receiving half, owned by the reactor loop.
pub struct LoopReceiver<C> {
    rx: mpsc::UnboundedReceiver<Deferred<C>>,
}

impl<C: 'static> LoopReceiver<C> {
    /// Waits for the next deferred callback.
    ///
    /// Returns `None` once every marshaler has been dropped.
    pub async fn recv(&mut self) -> Option<Deferred<C>> {
        self.rx.recv().await
    }

    /// Runs every callback that is already queued, without waiting.
    ///
    /// Returns how many ran. Callbacks deferred by the callbacks
    /// themselves are picked up in the same call.
    pub fn run_pending(&mut self, ctx: &mut C) -> usize {
        let mut ran = 0;
        while let Ok(callback) = self.rx.try_recv() {
            callback(ctx);
            ran += 1;
        }
        ran
    }
}
