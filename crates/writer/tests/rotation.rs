//! End-to-end rotation and retention.

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, FixedOffset, TimeZone};
use pretty_assertions::assert_eq;
use rollover::{ManualClock, RotatingWriter, RuleRegistry, SwapOutcome, expired_files};

fn at(h: u32, m: u32, s: u32) -> DateTime<FixedOffset> {
    FixedOffset::east_opt(0)
        .unwrap()
        .with_ymd_and_hms(2024, 3, 1, h, m, s)
        .unwrap()
}

fn rotated_names(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .filter(|name| name.starts_with("app.log."))
        .collect();
    names.sort();
    names
}

fn touch_in_order(dir: &Path, names: &[&str]) {
    for name in names {
        fs::write(dir.join(name), b"old\n").unwrap();
        std::thread::sleep(Duration::from_millis(20));
    }
}

#[tokio::test(start_paused = true)]
async fn writes_land_in_the_window_of_the_clock() {
    let tmp = tempfile::tempdir().unwrap();
    let base = tmp.path().join("app.log");
    let writer = RotatingWriter::builder(&base)
        .rule("1min")
        .check_interval(Duration::ZERO)
        .clock(Arc::new(ManualClock::new(at(10, 0, 30))))
        .build()
        .unwrap();

    writer.write(b"first\n").unwrap();
    assert_eq!(writer.current_path(), Some(tmp.path().join("app.log.2024-03-01_1000")));

    tokio::time::sleep(Duration::from_secs(31)).await;
    assert_eq!(writer.rotation_info().rotated_path, tmp.path().join("app.log.2024-03-01_1001"));
    // The tick listener may already have swapped on a blocking thread.
    let _ = writer.check_now().unwrap();
    assert_eq!(writer.check_now().unwrap(), SwapOutcome::Unchanged);
    writer.write(b"second\n").unwrap();
    writer.close().unwrap();

    assert_eq!(
        fs::read_to_string(tmp.path().join("app.log.2024-03-01_1000")).unwrap(),
        "first\n"
    );
    assert_eq!(
        fs::read_to_string(tmp.path().join("app.log.2024-03-01_1001")).unwrap(),
        "second\n"
    );
    assert!(!base.exists(), "base path itself is never written under a rotating rule");
}

#[tokio::test(start_paused = true)]
async fn rotation_keeps_only_the_newest_files() {
    let tmp = tempfile::tempdir().unwrap();
    let writer = RotatingWriter::builder(tmp.path().join("app.log"))
        .rule("1min")
        .keep_files(2)
        .delete_pace(Duration::from_millis(1))
        .check_interval(Duration::ZERO)
        .clock(Arc::new(ManualClock::new(at(10, 0, 30))))
        .build()
        .unwrap();

    writer.write(b"10:00\n").unwrap();
    for minute in 1..=3 {
        tokio::time::sleep(Duration::from_secs(60)).await;
        let _ = writer.check_now().unwrap();
        writer.write(format!("10:0{minute}\n").as_bytes()).unwrap();
    }
    tokio::time::sleep(Duration::from_secs(5)).await;
    writer.close().unwrap();

    assert_eq!(
        rotated_names(tmp.path()),
        vec!["app.log.2024-03-01_1002", "app.log.2024-03-01_1003"]
    );
    assert_eq!(
        fs::read_to_string(tmp.path().join("app.log.2024-03-01_1003")).unwrap(),
        "10:03\n"
    );
}

#[tokio::test]
async fn startup_cleanup_keeps_newest_files() {
    let tmp = tempfile::tempdir().unwrap();
    touch_in_order(
        tmp.path(),
        &["app.log.1", "app.log.2", "app.log.3", "app.log.4", "app.log.5"],
    );
    let writer = RotatingWriter::builder(tmp.path().join("app.log"))
        .keep_files(2)
        .delete_pace(Duration::from_millis(1))
        .check_interval(Duration::ZERO)
        .build()
        .unwrap();

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(rotated_names(tmp.path()), vec!["app.log.4", "app.log.5"]);
    assert!(expired_files(&tmp.path().join("app.log"), 2).unwrap().is_empty());
    writer.close().unwrap();
}

#[tokio::test]
async fn zero_keep_never_deletes() {
    let tmp = tempfile::tempdir().unwrap();
    touch_in_order(tmp.path(), &["app.log.1", "app.log.2", "app.log.3"]);
    let writer = RotatingWriter::builder(tmp.path().join("app.log"))
        .keep_files(0)
        .delete_pace(Duration::from_millis(1))
        .check_interval(Duration::from_millis(20))
        .build()
        .unwrap();

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(rotated_names(tmp.path()), vec!["app.log.1", "app.log.2", "app.log.3"]);
    writer.close().unwrap();
}

#[tokio::test]
async fn close_cancels_paced_cleanup() {
    let tmp = tempfile::tempdir().unwrap();
    touch_in_order(tmp.path(), &["app.log.1", "app.log.2", "app.log.3", "app.log.4"]);
    let writer = RotatingWriter::builder(tmp.path().join("app.log"))
        .keep_files(1)
        .delete_pace(Duration::from_secs(60))
        .check_interval(Duration::ZERO)
        .build()
        .unwrap();

    writer.close().unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(rotated_names(tmp.path()).len(), 4);
}

#[test]
fn no_rule_always_targets_base_path() {
    let tmp = tempfile::tempdir().unwrap();
    let base = tmp.path().join("app.log");
    let writer = RotatingWriter::builder(&base)
        .check_interval(Duration::ZERO)
        .build()
        .unwrap();

    for _ in 0..3 {
        writer.write(b"x").unwrap();
        assert_eq!(writer.rotation_info().rotated_path, base);
        assert_eq!(writer.check_now().unwrap(), SwapOutcome::Unchanged);
    }
    drop(writer);
    assert_eq!(fs::read(&base).unwrap(), b"xxx");
}

#[test]
fn custom_rule_name_cannot_be_registered_twice() {
    let registry = RuleRegistry::with_builtin_rules();
    let suffix = |now: &DateTime<FixedOffset>| now.format("%Y").to_string();
    registry.register("yearly", Duration::from_secs(365 * 86_400), suffix).unwrap();
    let err = registry.register("yearly", Duration::from_secs(1), suffix).unwrap_err();
    assert!(matches!(err, rollover::Error::DuplicateRule { .. }));
    let err = registry.register("day", Duration::from_secs(1), suffix).unwrap_err();
    assert!(matches!(err, rollover::Error::DuplicateRule { .. }));
}
