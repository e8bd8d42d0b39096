//! Countdown clocks for Castle.
//!
//! Two things live here:
//!
//! - [`Clock`]: a one-shot, pausable countdown. Every player gets a
//!   *move clock* (time left for their own moves) and an *abandonment
//!   clock* (grace period after their connection drops).
//! - [`SyncTicker`]: a fixed-period tick the reactor uses to broadcast
//!   clock readings to clients.
//!
//! # Integration
//!
//! Both are meant to be driven from the reactor's `tokio::select!` loop.
//! A clock's expiry runs a caller-supplied closure on a Tokio timer task;
//! the server uses that closure to defer the real handling back onto the
//! reactor, where the epoch passed to the closure is checked with
//! [`Clock::expire`] before anything happens:
//!
//! ```ignore
//! let marshal = marshal.clone();
//! clock.start(move |epoch| {
//!     marshal.defer(move |ctx| ctx.on_clock_expired(key, epoch));
//! });
//! ```

mod clock;
mod ticker;

pub use clock::{Clock, ClockState};
pub use ticker::SyncTicker;
