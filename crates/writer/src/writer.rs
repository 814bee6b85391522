//! The rotating writer
//!
//! [`RotatingWriter`] owns the live file handle for a base path and swaps
//! it whenever the rotation target changes or the file at the target path
//! is no longer the one it has open.
//!
//! ## Lifecycle
//!
//! - **Construction**: the configuration is validated, the rotation
//!   schedule is started and check-and-swap runs once synchronously. Any
//!   failure stops the schedule and is returned; no handle is kept.
//! - **Active**: `write` appends to the open handle under a mutex that is
//!   also held while swapping, so a write never interleaves with a swap.
//! - **Rotation / self-heal**: check-and-swap runs on every rotation tick
//!   and every `check_interval`. It stats the target path and is a no-op
//!   when the file there is the open one; otherwise it prepares the parent
//!   directory, opens the target for append and replaces the handle.
//! - **Cleanup**: with `keep_files > 0`, expired rotated files are removed
//!   once at startup and after every tick, one deletion per `delete_pace`.
//! - **Closed**: `close` cancels background work, stops the schedule and
//!   closes the handle. Later writes fail with `BrokenPipe`.

use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use rollover_schedule::{CancellationToken, DriftCheck, SharedClock};
use tokio::runtime::Handle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::config::WriterConfig;
use crate::error::{Error, Result};
use crate::expiry::expired_files;
use crate::fs::{FileIdentity, ensure_dir, open_append};
use crate::info::{RotationInfo, RotationInfoGenerator, ScheduleOptions};
use crate::rule::RuleRegistry;

/// Result of a check-and-swap pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwapOutcome {
    /// The open handle already refers to the file at the target path.
    Unchanged,
    /// A new handle was opened and installed.
    Swapped,
}

/// Builder for [`RotatingWriter`].
#[derive(Debug)]
pub struct RotatingWriterBuilder {
    config: WriterConfig,
    registry: Option<Arc<RuleRegistry>>,
    schedule: ScheduleOptions,
}

impl RotatingWriterBuilder {
    /// Start from an existing configuration.
    pub fn from_config(config: WriterConfig) -> Self {
        Self {
            config,
            registry: None,
            schedule: ScheduleOptions::default(),
        }
    }

    /// Rotation rule name.
    pub fn rule(mut self, rule: impl Into<String>) -> Self {
        self.config.rule = rule.into();
        self
    }

    /// Number of rotated files to keep; `0` keeps everything.
    pub fn keep_files(mut self, keep_files: usize) -> Self {
        self.config.keep_files = keep_files;
        self
    }

    /// Interval of the live-file re-check; zero disables it.
    pub fn check_interval(mut self, check_interval: Duration) -> Self {
        self.config.check_interval = check_interval;
        self
    }

    /// Delay before each expired-file deletion.
    pub fn delete_pace(mut self, delete_pace: Duration) -> Self {
        self.config.delete_pace = delete_pace;
        self
    }

    /// Look rules up in `registry` instead of [`RuleRegistry::shared`].
    pub fn registry(mut self, registry: Arc<RuleRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Wall-clock source for rotation and directory housekeeping.
    pub fn clock(mut self, clock: SharedClock) -> Self {
        self.schedule.clock = clock;
        self
    }

    /// Drift detection settings of the rotation schedule.
    pub fn drift_check(mut self, drift: DriftCheck) -> Self {
        self.schedule.drift = Some(drift);
        self
    }

    /// Disable drift detection of the rotation schedule.
    pub fn without_drift_check(mut self) -> Self {
        self.schedule.drift = None;
        self
    }

    /// Runtime hosting background tasks instead of the ambient one.
    pub fn runtime(mut self, handle: Handle) -> Self {
        self.schedule.runtime = Some(handle);
        self
    }

    /// Validate, open the first file and start background work.
    pub fn build(self) -> Result<RotatingWriter> {
        let config = self.config;
        config.validate()?;

        let runtime = self.schedule.runtime.or_else(|| Handle::try_current().ok());
        if runtime.is_none() && (config.keep_files > 0 || config.recheck_enabled()) {
            return Err(Error::config(
                "keep_files and check_interval need a tokio runtime; set both to zero to run without one",
            ));
        }

        let registry = self.registry.unwrap_or_else(RuleRegistry::shared);
        let clock = self.schedule.clock.clone();
        let generator = RotationInfoGenerator::new(
            &registry,
            &config.rule,
            config.base_path.clone(),
            ScheduleOptions {
                runtime: runtime.clone(),
                ..self.schedule
            },
        )?;

        let inner = Arc::new(Inner {
            config,
            clock,
            generator,
            active: Mutex::new(ActiveFile::default()),
            shutdown: CancellationToken::new(),
            closed: AtomicBool::new(false),
        });

        if let Err(e) = inner.check_and_swap(&inner.generator.get()) {
            inner.generator.stop();
            return Err(e);
        }
        inner.start(runtime.as_ref());

        Ok(RotatingWriter { inner })
    }
}

/// Append-only sink that rotates files on calendar boundaries.
///
/// ```rust,ignore
/// use std::io::Write;
/// use rollover::RotatingWriter;
///
/// let mut log = RotatingWriter::builder("log/app.log")
///     .rule("hour")
///     .keep_files(24)
///     .build()?;
/// writeln!(log, "service started")?;
/// log.close()?;
/// ```
#[derive(Debug)]
pub struct RotatingWriter {
    inner: Arc<Inner>,
}

impl RotatingWriter {
    /// Builder with default settings for `base_path`.
    pub fn builder(base_path: impl Into<PathBuf>) -> RotatingWriterBuilder {
        RotatingWriterBuilder::from_config(WriterConfig::new(base_path))
    }

    /// Build a writer from `config` using the shared rule registry, the
    /// system clock and the ambient tokio runtime.
    pub fn new(config: WriterConfig) -> Result<Self> {
        RotatingWriterBuilder::from_config(config).build()
    }

    /// Append `buf` to the active file.
    ///
    /// Errors from the file are returned as-is, without retry or rotation.
    pub fn write(&self, buf: &[u8]) -> io::Result<usize> {
        let mut active = self.inner.active.lock();
        match active.file.as_mut() {
            Some(file) => file.write(buf),
            None => Err(closed_error()),
        }
    }

    /// Flush the active file.
    pub fn flush(&self) -> io::Result<()> {
        let mut active = self.inner.active.lock();
        match active.file.as_mut() {
            Some(file) => file.flush(),
            None => Err(closed_error()),
        }
    }

    /// Stop background work and close the active file.
    ///
    /// Only the first call does anything; later calls return `Ok(())`.
    pub fn close(&self) -> Result<()> {
        self.inner.close()
    }

    /// Whether [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }

    /// Path of the file currently open, if any.
    pub fn current_path(&self) -> Option<PathBuf> {
        self.inner.active.lock().path.clone()
    }

    /// Rotation target for the current window.
    pub fn rotation_info(&self) -> RotationInfo {
        self.inner.generator.get()
    }

    /// Run check-and-swap against the current rotation target now.
    pub fn check_now(&self) -> Result<SwapOutcome> {
        self.inner.check_and_swap(&self.inner.generator.get())
    }

    /// The configuration this writer was built with.
    pub fn config(&self) -> &WriterConfig {
        &self.inner.config
    }
}

impl Write for RotatingWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        RotatingWriter::write(self, buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        RotatingWriter::flush(self)
    }
}

impl Write for &RotatingWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        RotatingWriter::write(self, buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        RotatingWriter::flush(self)
    }
}

#[cfg(feature = "subscriber")]
impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for RotatingWriter {
    type Writer = &'a RotatingWriter;

    fn make_writer(&'a self) -> Self::Writer {
        self
    }
}

impl Drop for RotatingWriter {
    fn drop(&mut self) {
        if let Err(e) = self.inner.close() {
            tracing::warn!(error = %e, "closing rotating writer on drop failed");
        }
    }
}

#[derive(Debug)]
struct Inner {
    config: WriterConfig,
    clock: SharedClock,
    generator: RotationInfoGenerator,
    active: Mutex<ActiveFile>,
    shutdown: CancellationToken,
    closed: AtomicBool,
}

#[derive(Debug, Default)]
struct ActiveFile {
    file: Option<File>,
    identity: Option<FileIdentity>,
    path: Option<PathBuf>,
}

impl ActiveFile {
    fn is_current(&self, identity: FileIdentity) -> bool {
        self.file.is_some() && self.identity == Some(identity)
    }
}

impl Inner {
    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn start(self: &Arc<Self>, runtime: Option<&Handle>) {
        let retention = (self.config.keep_files > 0).then(|| Retention {
            base: self.config.base_path.clone(),
            keep: self.config.keep_files,
            pace: self.config.delete_pace,
        });

        // Cleanup follows the swap so each scan sees the new window's file.
        let weak = Arc::downgrade(self);
        let on_tick = retention.clone();
        self.generator.add_listener_with_cancellation(move |token, info| {
            let inner = weak.upgrade();
            let retention = on_tick.clone();
            async move {
                let Some(inner) = inner else { return };
                swap_off_thread(inner, info, "rotation").await;
                if let Some(retention) = retention {
                    retention.remove_expired(token).await;
                }
            }
        });

        let Some(handle) = runtime else { return };
        if let Some(retention) = retention {
            handle.spawn(retention.remove_expired(self.shutdown.clone()));
        }
        if self.config.recheck_enabled() {
            handle.spawn(recheck_loop(
                Arc::downgrade(self),
                self.config.check_interval,
                self.shutdown.clone(),
            ));
        }
    }

    /// Make the active handle refer to the file at `info.rotated_path`.
    ///
    /// No tracing event is emitted while `active` is locked: the writer may
    /// itself be the sink of the subscriber receiving it.
    fn check_and_swap(&self, info: &RotationInfo) -> Result<SwapOutcome> {
        let target = info.rotated_path.as_path();

        let current = {
            let active = self.active.lock();
            if self.is_closed() {
                return Ok(SwapOutcome::Unchanged);
            }
            active.file.as_ref().and(active.identity)
        };
        let on_disk = stat_identity(target);
        if on_disk.is_some() && on_disk == current {
            return Ok(SwapOutcome::Unchanged);
        }

        if on_disk.is_none() {
            if let Some(dir) = target.parent() {
                ensure_dir(dir, &self.clock.now()).map_err(|e| Error::io("create directory", dir, e))?;
            }
        }

        let mut active = self.active.lock();
        // Another check may have swapped while the lock was released.
        if self.is_closed() || FileIdentity::of_path(target).is_ok_and(|id| active.is_current(id)) {
            return Ok(SwapOutcome::Unchanged);
        }
        let file = open_append(target).map_err(|e| Error::io("open", target, e))?;
        let metadata = file.metadata().map_err(|e| Error::io("stat", target, e))?;

        let previous = active.path.replace(target.to_path_buf());
        active.identity = Some(FileIdentity::of(&metadata));
        drop(active.file.replace(file));
        drop(active);

        tracing::debug!(
            path = %target.display(),
            previous = ?previous.as_deref().map(Path::display),
            "active file swapped"
        );
        Ok(SwapOutcome::Swapped)
    }

    fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.shutdown.cancel();
        self.generator.stop();

        let (file, path) = {
            let mut active = self.active.lock();
            active.identity = None;
            (active.file.take(), active.path.take())
        };
        let Some(file) = file else { return Ok(()) };
        let path = path.unwrap_or_else(|| self.config.base_path.clone());
        file.sync_all().map_err(|e| Error::io("close", path, e))
    }
}

fn closed_error() -> io::Error {
    io::Error::new(io::ErrorKind::BrokenPipe, "rotating writer is closed")
}

fn stat_identity(path: &Path) -> Option<FileIdentity> {
    match FileIdentity::of_path(path) {
        Ok(identity) => Some(identity),
        Err(e) if e.kind() == io::ErrorKind::NotFound => None,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "stat of rotation target failed");
            None
        }
    }
}

/// Run check-and-swap on a blocking thread and log failures.
async fn swap_off_thread(inner: Arc<Inner>, info: RotationInfo, trigger: &'static str) {
    let checked = tokio::task::spawn_blocking(move || {
        inner
            .check_and_swap(&info)
            .map_err(|e| (info.rotated_path, e))
    })
    .await;
    match checked {
        Ok(Ok(_)) => {}
        Ok(Err((path, e))) => {
            tracing::warn!(path = %path.display(), error = %e, trigger, "file check failed");
        }
        Err(e) => tracing::warn!(error = %e, trigger, "file check task failed"),
    }
}

async fn recheck_loop(inner: Weak<Inner>, every: Duration, shutdown: CancellationToken) {
    let mut ticker = tokio::time::interval_at(Instant::now() + every, every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            () = shutdown.cancelled() => break,
            _ = ticker.tick() => {}
        }
        let Some(inner) = inner.upgrade() else { break };
        let info = inner.generator.get();
        swap_off_thread(inner, info, "recheck").await;
    }
}

/// Retention settings of one writer.
#[derive(Debug, Clone)]
struct Retention {
    base: PathBuf,
    keep: usize,
    pace: Duration,
}

impl Retention {
    /// Delete rotated files beyond the newest `keep`, one per `pace`.
    async fn remove_expired(self, cancel: CancellationToken) {
        let Self { base, keep, pace } = self;
        let scan_base = base.clone();
        let expired = match tokio::task::spawn_blocking(move || expired_files(&scan_base, keep)).await {
            Ok(Ok(expired)) => expired,
            Ok(Err(e)) => {
                tracing::warn!(path = %base.display(), error = %e, "listing rotated files failed");
                return;
            }
            Err(e) => {
                tracing::warn!(path = %base.display(), error = %e, "expiry scan task failed");
                return;
            }
        };

        for path in expired {
            tokio::select! {
                () = cancel.cancelled() => return,
                () = tokio::time::sleep(pace) => {}
            }
            match tokio::fs::remove_file(&path).await {
                Ok(()) => tracing::info!(path = %path.display(), "expired file removed"),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => tracing::warn!(path = %path.display(), error = %e, "removing expired file failed"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, FixedOffset, TimeZone};
    use rollover_schedule::FixedClock;
    use std::fs;

    fn clock() -> SharedClock {
        let at: DateTime<FixedOffset> = FixedOffset::east_opt(0)
            .unwrap()
            .with_ymd_and_hms(2024, 3, 1, 10, 0, 0)
            .unwrap();
        Arc::new(FixedClock::new(at))
    }

    /// Writer with no background work, usable without a runtime.
    fn quiet_writer(base: &Path, rule: &str) -> RotatingWriter {
        RotatingWriter::builder(base)
            .rule(rule)
            .check_interval(Duration::ZERO)
            .clock(clock())
            .registry(Arc::new(RuleRegistry::with_builtin_rules()))
            .build()
            .unwrap()
    }

    #[test]
    fn opens_base_path_for_no_rule() {
        let tmp = tempfile::tempdir().unwrap();
        let base = tmp.path().join("app.log");
        let writer = quiet_writer(&base, "no");

        writer.write(b"hello\n").unwrap();
        assert_eq!(writer.current_path(), Some(base.clone()));
        writer.close().unwrap();
        assert_eq!(fs::read_to_string(&base).unwrap(), "hello\n");
    }

    #[test]
    fn creates_missing_parent_directories() {
        let tmp = tempfile::tempdir().unwrap();
        let base = tmp.path().join("nested/dir/app.log");
        let writer = quiet_writer(&base, "no");
        assert!(base.exists());
        writer.close().unwrap();
    }

    #[test]
    fn check_is_idempotent_while_file_is_in_place() {
        let tmp = tempfile::tempdir().unwrap();
        let writer = quiet_writer(&tmp.path().join("app.log"), "no");
        assert_eq!(writer.check_now().unwrap(), SwapOutcome::Unchanged);
        assert_eq!(writer.check_now().unwrap(), SwapOutcome::Unchanged);
    }

    #[test]
    fn deleted_file_is_recreated_on_check() {
        let tmp = tempfile::tempdir().unwrap();
        let base = tmp.path().join("app.log");
        let writer = quiet_writer(&base, "no");

        fs::remove_file(&base).unwrap();
        assert_eq!(writer.check_now().unwrap(), SwapOutcome::Swapped);
        writer.write(b"after\n").unwrap();
        assert_eq!(fs::read_to_string(&base).unwrap(), "after\n");
    }

    #[test]
    fn writes_after_close_fail() {
        let tmp = tempfile::tempdir().unwrap();
        let writer = quiet_writer(&tmp.path().join("app.log"), "no");
        writer.close().unwrap();
        writer.close().unwrap();
        assert!(writer.is_closed());

        let err = writer.write(b"late").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
        assert_eq!(writer.check_now().unwrap(), SwapOutcome::Unchanged);
        assert_eq!(writer.current_path(), None);
    }

    #[test]
    fn close_races_in_flight_writes() {
        let tmp = tempfile::tempdir().unwrap();
        let base = tmp.path().join("app.log");
        let writer = Arc::new(quiet_writer(&base, "no"));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let writer = Arc::clone(&writer);
                std::thread::spawn(move || {
                    let mut written = 0usize;
                    loop {
                        match writer.write(b"line\n") {
                            Ok(n) => {
                                assert_eq!(n, 5);
                                written += 1;
                            }
                            Err(e) => {
                                assert_eq!(e.kind(), io::ErrorKind::BrokenPipe);
                                return written;
                            }
                        }
                    }
                })
            })
            .collect();

        std::thread::sleep(Duration::from_millis(20));
        writer.close().unwrap();
        let written: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();

        let contents = fs::read_to_string(&base).unwrap();
        assert_eq!(contents.len(), written * 5);
        assert!(contents.lines().all(|line| line == "line"));
    }

    #[test]
    fn invalid_rule_fails_construction() {
        let tmp = tempfile::tempdir().unwrap();
        let err = RotatingWriter::builder(tmp.path().join("app.log"))
            .rule("fortnightly")
            .check_interval(Duration::ZERO)
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::InvalidRule { .. }));
        assert!(err.is_config());
    }

    #[test]
    fn background_work_without_runtime_is_a_config_error() {
        let tmp = tempfile::tempdir().unwrap();
        let err = RotatingWriter::builder(tmp.path().join("app.log"))
            .keep_files(3)
            .build()
            .unwrap_err();
        assert!(err.is_config());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn unopenable_target_fails_construction() {
        let tmp = tempfile::tempdir().unwrap();
        let base = tmp.path().join("app.log");
        // A directory at the rotated path cannot be opened for append.
        fs::create_dir(tmp.path().join("app.log.2024-03-01")).unwrap();
        let err = RotatingWriter::builder(&base)
            .rule("day")
            .check_interval(Duration::ZERO)
            .clock(clock())
            .build();
        let err = match err {
            Ok(_) => panic!("expected open failure"),
            Err(e) => e,
        };
        assert!(matches!(err, Error::Io { op: "open", .. }));
    }
}
