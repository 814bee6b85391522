//! Error types for the rotating writer

use std::path::PathBuf;

use rollover_schedule::ScheduleError;
use thiserror::Error;

/// Result type for writer construction and lifecycle operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by rule lookup, writer construction and `close`
///
/// The write path itself returns [`std::io::Error`] unchanged.
#[derive(Debug, Error)]
pub enum Error {
    /// Writer configuration is invalid
    #[error("Configuration error: {message}")]
    Config {
        /// What is wrong with the configuration
        message: String,
    },

    /// No rotation rule is registered under this name
    #[error("invalid rotation rule '{name}'")]
    InvalidRule {
        /// The requested rule name
        name: String,
    },

    /// A rotation rule with this name already exists
    #[error("rotation rule '{name}' already exists")]
    DuplicateRule {
        /// The rule name that was registered twice
        name: String,
    },

    /// Filesystem operation failed
    #[error("{op} failed for '{}': {source}", path.display())]
    Io {
        /// The operation that failed
        op: &'static str,
        /// The path it was applied to
        path: PathBuf,
        /// The underlying error
        #[source]
        source: std::io::Error,
    },

    /// The rotation schedule could not be started
    #[error(transparent)]
    Schedule(#[from] ScheduleError),
}

impl Error {
    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create an I/O error bound to an operation and path
    pub fn io(op: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            op,
            path: path.into(),
            source,
        }
    }

    /// Whether the error was caused by the caller's configuration.
    ///
    /// Unknown rule names and a missing runtime for a recurring rule are
    /// construction-time configuration problems too.
    pub fn is_config(&self) -> bool {
        matches!(
            self,
            Self::Config { .. } | Self::InvalidRule { .. } | Self::Schedule(ScheduleError::NoRuntime { .. })
        )
    }
}
