//! # Rollover
//!
//! Append-only file writer that rotates on wall-clock boundaries.
//!
//! Each rotation window writes to `<base_path>.<suffix>`, where the
//! suffix comes from a named [`RotationRule`] (`"1min"`, `"hour"`,
//! `"day"`, ...). The writer also:
//!
//! - re-opens the target if it is deleted or replaced underneath it
//! - moves a non-directory entry out of the way of the log directory
//! - keeps at most `keep_files` rotated siblings, deleting the oldest at
//!   a bounded pace
//!
//! ```rust,ignore
//! use std::io::Write;
//! use rollover::{RotatingWriter, WriterConfig};
//!
//! let config = WriterConfig::new("log/app.log")
//!     .with_rule("day")
//!     .with_keep_files(7);
//! let mut log = RotatingWriter::new(config)?;
//! writeln!(log, "ready")?;
//! ```
//!
//! With the `subscriber` feature (on by default) the writer plugs into
//! `tracing_subscriber::fmt` as a `MakeWriter`.

pub mod config;
pub mod error;
pub mod expiry;
pub mod fs;
pub mod info;
pub mod rule;
pub mod writer;

pub use config::WriterConfig;
pub use error::{Error, Result};
pub use expiry::{RotatedFile, expired_files, rotated_files};
pub use info::{RotationInfo, RotationInfoGenerator, ScheduleOptions, rotated_path};
pub use rule::{NO_ROTATION, RotationRule, RuleRegistry, SuffixFn};
pub use writer::{RotatingWriter, RotatingWriterBuilder, SwapOutcome};

pub use rollover_schedule::{Clock, DriftCheck, FixedClock, ManualClock, SharedClock, SystemClock};
