//! Calendar boundary arithmetic

use std::time::Duration;

use chrono::{DateTime, FixedOffset};

/// Time left until the next local-time multiple of `period`.
///
/// Epoch arithmetic is zone-naive, so the reading's UTC offset is folded
/// in first: a one-hour period in UTC+05:30 fires at `hh:00` local time,
/// not at `hh:30`. At an exact boundary the full period is returned.
/// A zero period never fires and yields [`Duration::ZERO`].
pub fn delay_to_next_boundary(now: &DateTime<FixedOffset>, period: Duration) -> Duration {
    let period_ms = period.as_millis() as i64;
    if period_ms == 0 {
        return Duration::ZERO;
    }
    let offset_ms = i64::from(now.offset().local_minus_utc()) * 1000;
    let local_ms = now.timestamp_millis() + offset_ms;
    let remaining = period_ms - local_ms.rem_euclid(period_ms);
    Duration::from_millis(remaining as u64)
}
