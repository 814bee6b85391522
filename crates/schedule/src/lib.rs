//! # Rollover Schedule
//!
//! Wall-clock aligned periodic value production.
//!
//! - [`Clock`]: injectable "current time" capability ([`SystemClock`],
//!   [`FixedClock`], [`ManualClock`])
//! - [`delay_to_next_boundary`]: local-time boundary arithmetic
//! - [`Generator`]: produces a value at startup and at every aligned
//!   boundary, notifies listeners, and re-arms itself when the system
//!   clock jumps

pub mod boundary;
pub mod clock;
pub mod error;
pub mod generator;

pub use boundary::delay_to_next_boundary;
pub use clock::{Clock, FixedClock, ManualClock, SharedClock, SystemClock};
pub use error::{ScheduleError, ScheduleResult};
pub use generator::{DriftCheck, Generator, GeneratorBuilder};

pub use tokio_util::sync::CancellationToken;
