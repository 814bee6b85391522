//! Named rotation rules
//!
//! A [`RotationRule`] pairs a period with a suffix function. The suffix is
//! derived from a clock reading, so it is a pure function of wall time and
//! stays constant for every instant inside one aligned period window.
//!
//! Suffixes carry no leading dot; see [`rotated_path`](crate::rotated_path)
//! for how they are joined onto the base path.
//!
//! Built-in rules:
//!
//! | name    | period | suffix example     |
//! |---------|--------|--------------------|
//! | `no`    | never  | *(empty)*          |
//! | `1min`  | 1 min  | `2024-03-01_1504`  |
//! | `5min`  | 5 min  | `2024-03-01_1500`  |
//! | `10min` | 10 min | `2024-03-01_1500`  |
//! | `15min` | 15 min | `2024-03-01_1500`  |
//! | `30min` | 30 min | `2024-03-01_1500`  |
//! | `hour`  | 1 h    | `2024-03-01_15`    |
//! | `day`   | 24 h   | `2024-03-01`       |

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use chrono::{DateTime, FixedOffset, Timelike};
use parking_lot::RwLock;

use crate::error::{Error, Result};

/// Name of the rule that never rotates.
pub const NO_ROTATION: &str = "no";

/// Suffix derivation for a rule.
pub type SuffixFn = Arc<dyn Fn(&DateTime<FixedOffset>) -> String + Send + Sync>;

/// A rotation period and the file-name suffix for each window.
#[derive(Clone)]
pub struct RotationRule {
    period: Duration,
    suffix: SuffixFn,
}

impl fmt::Debug for RotationRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RotationRule")
            .field("period", &self.period)
            .finish_non_exhaustive()
    }
}

impl RotationRule {
    /// Create a rule. A zero period never rotates.
    pub fn new<F>(period: Duration, suffix: F) -> Self
    where
        F: Fn(&DateTime<FixedOffset>) -> String + Send + Sync + 'static,
    {
        Self {
            period,
            suffix: Arc::new(suffix),
        }
    }

    /// Rotation period.
    pub fn period(&self) -> Duration {
        self.period
    }

    /// Suffix for the window containing `now`.
    pub fn suffix_at(&self, now: &DateTime<FixedOffset>) -> String {
        (self.suffix)(now)
    }
}

/// Registry of named rotation rules.
///
/// Registration is additive only. It is meant to happen at startup,
/// before writers are built: a writer copies its rule at construction and
/// never observes later registrations.
#[derive(Debug)]
pub struct RuleRegistry {
    rules: RwLock<HashMap<String, RotationRule>>,
}

impl Default for RuleRegistry {
    fn default() -> Self {
        Self::with_builtin_rules()
    }
}

impl RuleRegistry {
    /// A registry with no rules at all.
    pub fn empty() -> Self {
        Self {
            rules: RwLock::new(HashMap::new()),
        }
    }

    /// A registry holding the built-in rules.
    pub fn with_builtin_rules() -> Self {
        let registry = Self::empty();
        {
            let mut rules = registry.rules.write();
            for (name, rule) in builtin_rules() {
                rules.insert(name.to_owned(), rule);
            }
        }
        registry
    }

    /// The process-wide registry used when a writer is not given one.
    pub fn shared() -> Arc<Self> {
        static SHARED: OnceLock<Arc<RuleRegistry>> = OnceLock::new();
        Arc::clone(SHARED.get_or_init(|| Arc::new(Self::with_builtin_rules())))
    }

    /// Register a custom rule.
    ///
    /// Fails with [`Error::DuplicateRule`] if `name` is taken; the existing
    /// rule is left untouched.
    pub fn register<F>(&self, name: impl Into<String>, period: Duration, suffix: F) -> Result<()>
    where
        F: Fn(&DateTime<FixedOffset>) -> String + Send + Sync + 'static,
    {
        let name = name.into();
        let mut rules = self.rules.write();
        if rules.contains_key(&name) {
            return Err(Error::DuplicateRule { name });
        }
        tracing::debug!(rule = %name, ?period, "rotation rule registered");
        rules.insert(name, RotationRule::new(period, suffix));
        Ok(())
    }

    /// Copy of the rule registered under `name`.
    pub fn get(&self, name: &str) -> Result<RotationRule> {
        self.rules
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| Error::InvalidRule { name: name.to_owned() })
    }

    /// Whether a rule named `name` exists.
    pub fn contains(&self, name: &str) -> bool {
        self.rules.read().contains_key(name)
    }

    /// Registered rule names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.rules.read().keys().cloned().collect();
        names.sort();
        names
    }
}

fn builtin_rules() -> [(&'static str, RotationRule); 8] {
    const MINUTE: u64 = 60;
    [
        (NO_ROTATION, RotationRule::new(Duration::ZERO, |_| String::new())),
        (
            "1min",
            RotationRule::new(Duration::from_secs(MINUTE), |now| now.format("%Y-%m-%d_%H%M").to_string()),
        ),
        ("5min", minute_bucket_rule(5)),
        ("10min", minute_bucket_rule(10)),
        ("15min", minute_bucket_rule(15)),
        ("30min", minute_bucket_rule(30)),
        (
            "hour",
            RotationRule::new(Duration::from_secs(60 * MINUTE), |now| now.format("%Y-%m-%d_%H").to_string()),
        ),
        (
            "day",
            RotationRule::new(Duration::from_secs(24 * 60 * MINUTE), |now| {
                now.format("%Y-%m-%d").to_string()
            }),
        ),
    ]
}

/// `%Y-%m-%d_%H` followed by the minute floored to a multiple of `step`.
fn minute_bucket_rule(step: u32) -> RotationRule {
    RotationRule::new(Duration::from_secs(u64::from(step) * 60), move |now| {
        format!("{}{:02}", now.format("%Y-%m-%d_%H"), now.minute() / step * step)
    })
}
