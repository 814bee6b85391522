//! Wall-clock sources
//!
//! Every time-aware component takes a [`SharedClock`] at construction
//! instead of reading the system clock directly, so tests can pin or
//! skew wall time without touching process-wide state.
//!
//! Readings are [`DateTime<FixedOffset>`]: the offset travels with the
//! instant, which is what boundary alignment and suffix formatting need.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, FixedOffset, Local, TimeDelta};
use parking_lot::Mutex;

/// Source of the current wall-clock time.
pub trait Clock: Send + Sync + fmt::Debug {
    /// Current wall-clock time, including the local UTC offset.
    fn now(&self) -> DateTime<FixedOffset>;
}

/// Shared handle to a clock.
pub type SharedClock = Arc<dyn Clock>;

/// The real system clock in the host's local time zone.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl SystemClock {
    /// Shared handle to the system clock.
    #[must_use]
    pub fn shared() -> SharedClock {
        Arc::new(Self)
    }
}

impl Clock for SystemClock {
    fn now(&self) -> DateTime<FixedOffset> {
        Local::now().fixed_offset()
    }
}

/// Clock frozen at a single instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock {
    instant: DateTime<FixedOffset>,
}

impl FixedClock {
    /// Create a clock that always reports `instant`.
    pub fn new(instant: DateTime<FixedOffset>) -> Self {
        Self { instant }
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<FixedOffset> {
        self.instant
    }
}

/// Clock that follows tokio time from a chosen origin and can be skewed.
///
/// Reads `origin + elapsed + skew`, where `elapsed` is measured with
/// [`tokio::time::Instant`]. Under a paused runtime the clock therefore
/// advances exactly as far as the runtime's virtual time does, and
/// [`jump`](Self::jump) simulates an operator or NTP changing the system
/// clock while timers keep running on the monotonic base.
#[derive(Debug)]
pub struct ManualClock {
    origin: DateTime<FixedOffset>,
    started: tokio::time::Instant,
    skew: Mutex<TimeDelta>,
}

impl ManualClock {
    /// Create a clock reading `origin` now.
    pub fn new(origin: DateTime<FixedOffset>) -> Self {
        Self {
            origin,
            started: tokio::time::Instant::now(),
            skew: Mutex::new(TimeDelta::zero()),
        }
    }

    /// Move wall time by `delta` (negative jumps backward).
    pub fn jump(&self, delta: TimeDelta) {
        *self.skew.lock() += delta;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<FixedOffset> {
        let elapsed = TimeDelta::from_std(self.started.elapsed()).unwrap_or_else(|_| TimeDelta::zero());
        self.origin + elapsed + *self.skew.lock()
    }
}
