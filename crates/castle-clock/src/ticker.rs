use std::time::Duration;

use tokio::time::{self, Instant};
use tracing::{debug, trace, warn};

/// Fixed-period tick source for the reactor's clock-sync broadcast.
///
/// With no period [`tick`](Self::tick) pends forever, so a
/// `tokio::select!` loop simply never takes that branch. A late tick
/// does not cause a burst of catch-up ticks: the next one is scheduled a
/// full period after the late one fired.
pub struct SyncTicker {
    period: Option<Duration>,
    next: Option<Instant>,
    count: u64,
}

impl SyncTicker {
    /// Creates a ticker. `None` or a zero period disables ticking.
    pub fn new(period: Option<Duration>) -> Self {
        let period = period.filter(|p| !p.is_zero());
        match period {
            Some(p) => debug!(period_ms = p.as_millis() as u64, "sync ticker created"),
            None => debug!("sync ticker disabled"),
        }
        Self {
            period,
            next: period.map(|p| Instant::now() + p),
            count: 0,
        }
    }

    /// Waits for the next tick and returns its number (starting at 1).
    ///
    /// Cancel-safe: dropping the future before it completes loses nothing.
    pub async fn tick(&mut self) -> u64 {
        let (next, period) = match (self.next, self.period) {
            (Some(next), Some(period)) => (next, period),
            _ => std::future::pending().await,
        };

        time::sleep_until(next).await;

        let now = Instant::now();
        let late_by = now.saturating_duration_since(next);
        if late_by > period {
            warn!(
                tick = self.count + 1,
                late_ms = late_by.as_millis() as u64,
                "sync tick late, skipping ahead"
            );
        }
        self.next = Some(now + period);
        self.count += 1;
        trace!(tick = self.count, "sync tick");
        self.count
    }

    pub fn is_enabled(&self) -> bool {
        self.period.is_some()
    }

    /// Ticks fired so far.
    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn period(&self) -> Option<Duration> {
        self.period
    }
}
