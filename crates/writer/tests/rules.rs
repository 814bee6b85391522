//! Suffix behaviour of the built-in rotation rules.

use chrono::{DateTime, FixedOffset, TimeDelta, TimeZone};
use proptest::prelude::*;
use rollover::RuleRegistry;
use rollover_schedule::delay_to_next_boundary;

const ROTATING_RULES: &[&str] = &["1min", "5min", "10min", "15min", "30min", "hour", "day"];

fn instant(secs: i64, offset_minutes: i32) -> DateTime<FixedOffset> {
    FixedOffset::east_opt(offset_minutes * 60)
        .unwrap()
        .timestamp_opt(secs, 0)
        .unwrap()
}

proptest! {
    #[test]
    fn suffix_is_constant_within_a_window(
        rule_idx in 0..ROTATING_RULES.len(),
        secs in 946_684_800i64..4_102_444_800,
        offset_quarters in -48i32..=56,
    ) {
        let registry = RuleRegistry::with_builtin_rules();
        let rule = registry.get(ROTATING_RULES[rule_idx]).unwrap();
        let now = instant(secs, offset_quarters * 15);

        let next = now + TimeDelta::from_std(delay_to_next_boundary(&now, rule.period())).unwrap();
        let last_in_window = next - TimeDelta::milliseconds(1);

        prop_assert_eq!(rule.suffix_at(&now), rule.suffix_at(&last_in_window));
        prop_assert_ne!(rule.suffix_at(&now), rule.suffix_at(&next));
    }

    #[test]
    fn suffixes_only_use_rotated_name_characters(
        rule_idx in 0..ROTATING_RULES.len(),
        secs in 946_684_800i64..4_102_444_800,
    ) {
        let registry = RuleRegistry::with_builtin_rules();
        let rule = registry.get(ROTATING_RULES[rule_idx]).unwrap();
        let suffix = rule.suffix_at(&instant(secs, 0));
        let name = format!("app.log.{suffix}");
        prop_assert!(rollover::expiry::is_rotated_name("app.log", &name));
    }
}

#[test]
fn no_rule_has_empty_suffix() {
    let rule = RuleRegistry::with_builtin_rules().get("no").unwrap();
    assert!(rule.period().is_zero());
    assert_eq!(rule.suffix_at(&instant(1_700_000_000, 0)), "");
}
