use std::fmt;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{self, Instant};
use tracing::{debug, error, warn};

// ---------------------------------------------------------------------------
// ClockState
// ---------------------------------------------------------------------------

/// Lifecycle of a [`Clock`].
///
/// ```text
///   Idle ──start──→ Running ──stop──→ Stopped ──start──→ Running
///                      │
///                      └──deadline──→ Expired ──reset──→ Idle
/// ```
///
/// `reset` is accepted from every state and always lands in `Idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockState {
    Idle,
    Running,
    Stopped,
    Expired,
}

impl ClockState {
    /// Whether `start` is allowed from this state.
    pub fn can_start(&self) -> bool {
        matches!(self, Self::Idle | Self::Stopped)
    }
}

impl fmt::Display for ClockState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::Running => write!(f, "Running"),
            Self::Stopped => write!(f, "Stopped"),
            Self::Expired => write!(f, "Expired"),
        }
    }
}

// ---------------------------------------------------------------------------
// Clock
// ---------------------------------------------------------------------------

/// A resettable one-shot countdown.
///
/// The countdown itself is a Tokio sleep task armed on `start` and
/// aborted on `stop`/`reset`/drop. Because abort and firing can race,
/// every arm gets a fresh *epoch*; the expiry closure receives it and the
/// owner passes it back to [`expire`](Self::expire), which refuses stale
/// ones.
///
/// All methods take `&mut self`: a clock belongs to exactly one owner,
/// the reactor.
pub struct Clock {
    initial: Duration,
    /// Time left as of the last stop/reset. Not updated while running.
    remaining: Duration,
    deadline: Option<Instant>,
    state: ClockState,
    epoch: u64,
    timer: Option<JoinHandle<()>>,
}

impl Clock {
    /// Creates an idle clock holding `initial`.
    pub fn new(initial: Duration) -> Self {
        Self {
            initial,
            remaining: initial,
            deadline: None,
            state: ClockState::Idle,
            epoch: 0,
            timer: None,
        }
    }

    /// Starts counting down from the remaining time.
    ///
    /// `on_expire` runs on a Tokio timer task with the arm epoch when the
    /// countdown reaches zero. Starting a clock that is already running is
    /// a no-op; starting an expired clock is refused until it is reset.
    ///
    /// If no Tokio runtime is available the clock still counts down (its
    /// `remaining` keeps decreasing) but never fires; the failure is logged.
    pub fn start<F>(&mut self, on_expire: F)
    where
        F: FnOnce(u64) + Send + 'static,
    {
        if !self.state.can_start() {
            if self.state == ClockState::Expired {
                warn!(epoch = self.epoch, "start on expired clock ignored");
            }
            return;
        }

        self.epoch += 1;
        let epoch = self.epoch;
        let deadline = Instant::now() + self.remaining;
        self.deadline = Some(deadline);
        self.state = ClockState::Running;

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                self.timer = Some(handle.spawn(async move {
                    time::sleep_until(deadline).await;
                    on_expire(epoch);
                }));
            }
            Err(e) => {
                error!(epoch, error = %e, "cannot arm clock timer; clock will not expire");
            }
        }

        debug!(epoch, remaining_ms = self.remaining.as_millis() as u64, "clock started");
    }

    /// Pauses the countdown and keeps the time left for a later `start`.
    ///
    /// No-op unless running.
    pub fn stop(&mut self) {
        if self.state != ClockState::Running {
            return;
        }
        self.remaining = self.running_remaining();
        self.disarm();
        self.state = ClockState::Stopped;
    }

    /// Disarms the countdown and restores the initial duration.
    pub fn reset(&mut self) {
        self.disarm();
        self.remaining = self.initial;
        self.state = ClockState::Idle;
    }

    /// Marks the clock as expired if `epoch` belongs to the current arm.
    ///
    /// Returns `false` for stale expiries (the clock was stopped, reset,
    /// or restarted after the timer task was scheduled), in which case
    /// nothing changes.
    pub fn expire(&mut self, epoch: u64) -> bool {
        if self.state != ClockState::Running || epoch != self.epoch {
            debug!(
                epoch,
                current = self.epoch,
                state = %self.state,
                "stale clock expiry ignored"
            );
            return false;
        }
        self.timer = None;
        self.deadline = None;
        self.remaining = Duration::ZERO;
        self.state = ClockState::Expired;
        true
    }

    /// Time left. Has no side effects.
    pub fn remaining(&self) -> Duration {
        match self.state {
            ClockState::Running => self.running_remaining(),
            _ => self.remaining,
        }
    }

    pub fn initial(&self) -> Duration {
        self.initial
    }

    pub fn state(&self) -> ClockState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == ClockState::Running
    }

    /// Epoch of the most recent arm. Zero for a clock never started.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    fn running_remaining(&self) -> Duration {
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
            .unwrap_or(self.remaining)
    }

    fn disarm(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
        self.deadline = None;
        // Anything already in flight for the old arm is now stale.
        self.epoch += 1;
    }
}

impl Drop for Clock {
    fn drop(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}

impl fmt::Debug for Clock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Clock")
            .field("state", &self.state)
            .field("remaining", &self.remaining())
            .field("initial", &self.initial)
            .field("epoch", &self.epoch)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_clock_is_idle_with_initial_remaining() {
        let clock = Clock::new(Duration::from_secs(300));
        assert_eq!(clock.state(), ClockState::Idle);
        assert_eq!(clock.remaining(), Duration::from_secs(300));
        assert_eq!(clock.epoch(), 0);
    }

    #[test]
    fn test_reset_twice_same_as_once() {
        let mut clock = Clock::new(Duration::from_secs(30));
        clock.reset();
        let once = clock.remaining();
        clock.reset();
        assert_eq!(clock.remaining(), once);
        assert_eq!(clock.state(), ClockState::Idle);
    }

    #[test]
    fn test_stop_on_idle_clock_is_noop() {
        let mut clock = Clock::new(Duration::from_secs(30));
        clock.stop();
        assert_eq!(clock.state(), ClockState::Idle);
        assert_eq!(clock.epoch(), 0);
    }

    #[test]
    fn test_start_without_runtime_still_counts_down() {
        // No Tokio runtime: arming fails, but the clock tracks time.
        let mut clock = Clock::new(Duration::from_secs(30));
        clock.start(|_| {});
        assert!(clock.is_running());
        assert!(clock.remaining() <= Duration::from_secs(30));
        clock.stop();
        assert_eq!(clock.state(), ClockState::Stopped);
    }

    #[test]
    fn test_expire_requires_running_state() {
        let mut clock = Clock::new(Duration::from_secs(1));
        assert!(!clock.expire(0));
        assert_eq!(clock.state(), ClockState::Idle);
    }

    #[test]
    fn test_can_start_only_from_idle_or_stopped() {
        assert!(ClockState::Idle.can_start());
        assert!(ClockState::Stopped.can_start());
        assert!(!ClockState::Running.can_start());
        assert!(!ClockState::Expired.can_start());
    }
}
