//! Periodic value generator
//!
//! A [`Generator`] produces a value once at construction and again at
//! every local-time boundary that is a multiple of its period. Each new
//! value is stored (see [`Generator::get`]) and fanned out to listeners.
//!
//! Three pieces run for the lifetime of a generator with a non-zero
//! period:
//!
//! - the tick loop, sleeping until the next boundary;
//! - the drift check, sampling the wall clock on a short interval and
//!   re-arming the tick loop when successive samples disagree with the
//!   elapsed interval (system clock stepped, host suspended);
//! - one task per listener per tick.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::time::Duration;
//! use rollover_schedule::Generator;
//!
//! let minute = Generator::builder(Duration::from_secs(60))
//!     .build(|now| now.format("%H:%M").to_string())?;
//! minute.add_listener(|label| println!("new minute: {label}"));
//! ```

use std::convert::Infallible;
use std::fmt;
use std::future::Future;
use std::ops::RangeInclusive;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::{DateTime, FixedOffset};
use futures::FutureExt;
use futures::future::BoxFuture;
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::Notify;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::boundary::delay_to_next_boundary;
use crate::clock::{SharedClock, SystemClock};
use crate::error::{ScheduleError, ScheduleResult};

type Producer<T> = Box<dyn Fn(DateTime<FixedOffset>) -> Result<T, String> + Send + Sync>;
type PlainListener<T> = Arc<dyn Fn(T) + Send + Sync>;
type CancellableListener<T> = Arc<dyn Fn(CancellationToken, T) -> BoxFuture<'static, ()> + Send + Sync>;

#[derive(Clone)]
enum Listener<T> {
    /// Runs on the blocking pool; may do synchronous I/O.
    Plain(PlainListener<T>),
    /// Runs as an async task and observes the generator's token.
    Cancellable(CancellableListener<T>),
}

/// Wall-clock drift detection settings.
///
/// Every `interval` the wall clock is sampled and the whole-second gap to
/// the previous sample is compared against `tolerance`. A gap outside it
/// means the clock was stepped (or the process was suspended), and the
/// pending boundary timer is recomputed from the new wall time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriftCheck {
    /// How often the wall clock is sampled.
    pub interval: Duration,
    /// Accepted gap, in whole seconds, between consecutive samples.
    pub tolerance: RangeInclusive<i64>,
}

impl Default for DriftCheck {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            tolerance: 1..=2,
        }
    }
}

impl DriftCheck {
    /// Whether a sample gap counts as ordinary clock progress.
    pub fn accepts(&self, gap_secs: i64) -> bool {
        self.tolerance.contains(&gap_secs)
    }
}

/// Builder for [`Generator`].
#[derive(Debug)]
pub struct GeneratorBuilder {
    period: Duration,
    clock: SharedClock,
    drift: Option<DriftCheck>,
    runtime: Option<Handle>,
}

impl GeneratorBuilder {
    /// Use `clock` instead of the system clock.
    pub fn clock(mut self, clock: SharedClock) -> Self {
        self.clock = clock;
        self
    }

    /// Override the drift check settings.
    pub fn drift_check(mut self, drift: DriftCheck) -> Self {
        self.drift = Some(drift);
        self
    }

    /// Disable drift detection entirely.
    pub fn without_drift_check(mut self) -> Self {
        self.drift = None;
        self
    }

    /// Host background tasks on `handle` instead of the ambient runtime.
    pub fn runtime(mut self, handle: Handle) -> Self {
        self.runtime = Some(handle);
        self
    }

    /// Build with an infallible producer.
    pub fn build<T, F>(self, produce: F) -> ScheduleResult<Generator<T>>
    where
        T: Clone + Send + Sync + 'static,
        F: Fn(DateTime<FixedOffset>) -> T + Send + Sync + 'static,
    {
        self.try_build(move |now| Ok::<T, Infallible>(produce(now)))
    }

    /// Build with a fallible producer.
    ///
    /// A failure of the first, synchronous production is returned. Later
    /// failures are logged, the tick is skipped and the previous value
    /// stays current.
    pub fn try_build<T, E, F>(self, produce: F) -> ScheduleResult<Generator<T>>
    where
        T: Clone + Send + Sync + 'static,
        E: fmt::Display,
        F: Fn(DateTime<FixedOffset>) -> Result<T, E> + Send + Sync + 'static,
    {
        let runtime = if self.period.is_zero() {
            None
        } else {
            let handle = self
                .runtime
                .or_else(|| Handle::try_current().ok())
                .ok_or(ScheduleError::NoRuntime {
                    period_secs: self.period.as_secs(),
                })?;
            Some(handle)
        };

        let first = produce(self.clock.now()).map_err(|e| ScheduleError::Produce(e.to_string()))?;

        let shared = Arc::new(Shared {
            period: self.period,
            clock: self.clock,
            produce: Box::new(move |now| produce(now).map_err(|e| e.to_string())),
            state: Mutex::new(State {
                last: first,
                listeners: Vec::new(),
            }),
            rearm: Notify::new(),
            cancel: CancellationToken::new(),
            runtime,
        });

        if let Some(handle) = &shared.runtime {
            handle.spawn(run_ticks(Arc::clone(&shared)));
            if let Some(drift) = self.drift {
                handle.spawn(watch_drift(Arc::clone(&shared), drift));
            }
        }

        Ok(Generator {
            shared,
            stopped: AtomicBool::new(false),
        })
    }
}

/// Produces a value at startup and at every aligned period boundary.
///
/// Listeners are independent: each one runs on its own task for every
/// tick, with no ordering or mutual exclusion between them, and a slow or
/// panicking listener affects neither the tick loop nor its peers.
pub struct Generator<T> {
    shared: Arc<Shared<T>>,
    stopped: AtomicBool,
}

impl<T> fmt::Debug for Generator<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Generator")
            .field("period", &self.shared.period)
            .field("stopped", &self.stopped.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl Generator<()> {
    /// Start building a generator with the given period.
    ///
    /// A zero period produces once and never again.
    pub fn builder(period: Duration) -> GeneratorBuilder {
        GeneratorBuilder {
            period,
            clock: SystemClock::shared(),
            drift: Some(DriftCheck::default()),
            runtime: None,
        }
    }
}

impl<T> Generator<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Most recently produced value.
    pub fn get(&self) -> T {
        self.shared.state.lock().last.clone()
    }

    /// Register a listener called with every new value.
    ///
    /// The listener runs on tokio's blocking pool, so it may perform
    /// synchronous I/O.
    pub fn add_listener<F>(&self, listener: F)
    where
        F: Fn(T) + Send + Sync + 'static,
    {
        self.shared
            .state
            .lock()
            .listeners
            .push(Listener::Plain(Arc::new(listener)));
    }

    /// Register an async listener that also receives the generator's
    /// cancellation token, cancelled by [`stop`](Self::stop).
    pub fn add_listener_with_cancellation<F, Fut>(&self, listener: F)
    where
        F: Fn(CancellationToken, T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let boxed: CancellableListener<T> =
            Arc::new(move |token: CancellationToken, value: T| -> BoxFuture<'static, ()> {
                listener(token, value).boxed()
            });
        self.shared
            .state
            .lock()
            .listeners
            .push(Listener::Cancellable(boxed));
    }

    /// Stop producing and cancel the shared token.
    ///
    /// Safe to call more than once and on a generator that never armed a
    /// timer.
    pub fn stop(&self) {
        if self.stopped.swap(true, Ordering::AcqRel) {
            return;
        }
        self.shared.cancel.cancel();
        tracing::debug!(period = ?self.shared.period, "generator stopped");
    }
}

impl<T> Generator<T> {
    /// The configured period.
    pub fn period(&self) -> Duration {
        self.shared.period
    }

    /// Whether [`stop`](Generator::stop) has been called.
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    /// Token cancelled when the generator stops.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.shared.cancel.clone()
    }
}

impl<T> Drop for Generator<T> {
    fn drop(&mut self) {
        if !self.stopped.swap(true, Ordering::AcqRel) {
            self.shared.cancel.cancel();
        }
    }
}

struct Shared<T> {
    period: Duration,
    clock: SharedClock,
    produce: Producer<T>,
    state: Mutex<State<T>>,
    rearm: Notify,
    cancel: CancellationToken,
    runtime: Option<Handle>,
}

struct State<T> {
    last: T,
    listeners: Vec<Listener<T>>,
}

impl<T> Shared<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn produce_at(&self, now: DateTime<FixedOffset>) -> Option<T> {
        match (self.produce)(now) {
            Ok(value) => {
                self.state.lock().last = value.clone();
                Some(value)
            }
            Err(error) => {
                tracing::warn!(%error, at = %now, "periodic production failed, keeping previous value");
                None
            }
        }
    }

    fn notify(&self, value: &T) {
        let Some(handle) = &self.runtime else {
            return;
        };
        let listeners = self.state.lock().listeners.clone();
        for listener in listeners {
            let value = value.clone();
            match listener {
                Listener::Plain(f) => {
                    handle.spawn_blocking(move || f(value));
                }
                Listener::Cancellable(f) => {
                    let token = self.cancel.clone();
                    handle.spawn(async move { f(token, value).await });
                }
            }
        }
    }
}

async fn run_ticks<T>(shared: Arc<Shared<T>>)
where
    T: Clone + Send + Sync + 'static,
{
    loop {
        let delay = delay_to_next_boundary(&shared.clock.now(), shared.period);
        tokio::select! {
            () = shared.cancel.cancelled() => break,
            () = shared.rearm.notified() => {
                tracing::debug!(next_in = ?delay_to_next_boundary(&shared.clock.now(), shared.period), "boundary timer re-armed");
                continue;
            }
            () = tokio::time::sleep(delay) => {}
        }
        let now = shared.clock.now();
        if let Some(value) = shared.produce_at(now) {
            shared.notify(&value);
        }
    }
}

async fn watch_drift<T>(shared: Arc<Shared<T>>, drift: DriftCheck) {
    let mut ticker = tokio::time::interval_at(Instant::now() + drift.interval, drift.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut last = shared.clock.now().timestamp();
    loop {
        tokio::select! {
            () = shared.cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }
        let now = shared.clock.now().timestamp();
        let gap = now - last;
        last = now;
        if !drift.accepts(gap) {
            tracing::debug!(gap_secs = gap, "wall clock jumped");
            shared.rearm.notify_one();
        }
    }
}
