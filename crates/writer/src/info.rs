//! Rotation target generation
//!
//! [`RotationInfoGenerator`] specializes the periodic
//! [`Generator`] to recompute the rotated path of a base path at every
//! boundary of a named [`RotationRule`].

use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, FixedOffset};
use rollover_schedule::{CancellationToken, DriftCheck, Generator, SharedClock, SystemClock};
use tokio::runtime::Handle;

use crate::error::Result;
use crate::rule::{RotationRule, RuleRegistry};

/// The configured base path and the file it currently rotates to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RotationInfo {
    /// The caller's configured base path.
    pub raw_path: PathBuf,
    /// `raw_path` plus the current rule suffix.
    pub rotated_path: PathBuf,
}

impl RotationInfo {
    /// Rotation info for `base` under `rule` at `now`.
    pub fn at(base: &Path, rule: &RotationRule, now: &DateTime<FixedOffset>) -> Self {
        Self {
            raw_path: base.to_path_buf(),
            rotated_path: rotated_path(base, &rule.suffix_at(now)),
        }
    }
}

/// Join `suffix` onto `base` as `<base>.<suffix>`.
///
/// An empty suffix leaves the base path unchanged.
pub fn rotated_path(base: &Path, suffix: &str) -> PathBuf {
    if suffix.is_empty() {
        return base.to_path_buf();
    }
    let mut joined = base.as_os_str().to_owned();
    joined.push(".");
    joined.push(suffix);
    PathBuf::from(joined)
}

/// Time source, drift detection and runtime used by a schedule.
#[derive(Debug, Clone)]
pub struct ScheduleOptions {
    /// Wall-clock source.
    pub clock: SharedClock,
    /// Drift detection, or `None` to disable it.
    pub drift: Option<DriftCheck>,
    /// Runtime hosting background tasks; the ambient one when `None`.
    pub runtime: Option<Handle>,
}

impl Default for ScheduleOptions {
    fn default() -> Self {
        Self {
            clock: SystemClock::shared(),
            drift: Some(DriftCheck::default()),
            runtime: None,
        }
    }
}

/// Periodic producer of [`RotationInfo`] for one base path and rule.
#[derive(Debug)]
pub struct RotationInfoGenerator {
    rule_name: String,
    inner: Generator<RotationInfo>,
}

impl RotationInfoGenerator {
    /// Look up `rule_name` in `registry` and start producing rotation info
    /// for `base_path`.
    ///
    /// Fails with [`Error::InvalidRule`](crate::Error::InvalidRule) when
    /// the rule does not exist; no fallback rule is substituted.
    pub fn new(
        registry: &RuleRegistry,
        rule_name: &str,
        base_path: impl Into<PathBuf>,
        options: ScheduleOptions,
    ) -> Result<Self> {
        let rule = registry.get(rule_name)?;
        let base = base_path.into();

        let mut builder = Generator::builder(rule.period()).clock(options.clock);
        builder = match options.drift {
            Some(drift) => builder.drift_check(drift),
            None => builder.without_drift_check(),
        };
        if let Some(handle) = options.runtime {
            builder = builder.runtime(handle);
        }
        let inner = builder.build(move |now| RotationInfo::at(&base, &rule, &now))?;

        Ok(Self {
            rule_name: rule_name.to_owned(),
            inner,
        })
    }

    /// Rotation info for the current window.
    pub fn get(&self) -> RotationInfo {
        self.inner.get()
    }

    /// Register a listener called with each new [`RotationInfo`].
    pub fn add_listener<F>(&self, listener: F)
    where
        F: Fn(RotationInfo) + Send + Sync + 'static,
    {
        self.inner.add_listener(listener);
    }

    /// Register an async listener that observes the generator's token.
    pub fn add_listener_with_cancellation<F, Fut>(&self, listener: F)
    where
        F: Fn(CancellationToken, RotationInfo) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.inner.add_listener_with_cancellation(listener);
    }

    /// Stop the schedule and cancel listeners' token.
    pub fn stop(&self) {
        self.inner.stop();
    }

    /// Name of the rule driving this generator.
    pub fn rule_name(&self) -> &str {
        &self.rule_name
    }

    /// Rotation period of the rule.
    pub fn period(&self) -> Duration {
        self.inner.period()
    }

    /// Token cancelled when the generator stops.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.inner.cancellation_token()
    }
}
