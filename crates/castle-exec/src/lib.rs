//! Execution primitives for Castle.
//!
//! The server keeps every piece of session state on one reactor thread.
//! Anything that blocks (database work, mostly) runs elsewhere, and this
//! crate provides the pieces that make that split safe:
//!
//! - [`ResourcePool`]: a fixed set of reusable resources (database
//!   connections) with blocking acquire and release-on-drop.
//! - [`WorkerPool`]: fixed worker threads draining a task queue.
//! - [`LoopMarshaler`]: hands a closure back to the reactor thread,
//!   where it runs with exclusive access to the reactor's context.
//! - [`CancelFlag`]: a shared flag that lets a deferred completion know
//!   its requester went away.
//!
//! # How they fit together
//!
//! ```text
//!   reactor thread                    worker thread
//!   ──────────────                    ─────────────
//!   workers.submit(task) ───────────→ task runs
//!                                       pool.acquire()  (may block here)
//!                                       query ...
//!                                       marshal.defer(|ctx| ...)
//!   receiver.recv() ←──────────────────────┘
//!   callback(&mut ctx)
//! ```

mod cancel;
mod error;
mod marshal;
mod pool;
mod worker;

pub use cancel::CancelFlag;
pub use error::PoolError;
pub use marshal::{Deferred, LoopMarshaler, LoopReceiver, marshaler};
pub use pool::{Pooled, ResourcePool};
pub use worker::{Task, WorkerPool};
