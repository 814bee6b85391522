//! Error types for the schedule crate

use thiserror::Error;

/// Result type for generator construction
pub type ScheduleResult<T> = Result<T, ScheduleError>;

/// Errors raised while building a [`Generator`](crate::Generator)
#[derive(Debug, Error)]
pub enum ScheduleError {
    /// A recurring schedule needs a tokio runtime to host its tasks
    #[error("no tokio runtime available to drive a {period_secs}s schedule")]
    NoRuntime {
        /// The requested period in seconds
        period_secs: u64,
    },

    /// The initial synchronous production failed
    #[error("initial value production failed: {0}")]
    Produce(String),
}
