//! Error types for the scheduler crate.

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors that can occur while parsing or evaluating a schedule.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScheduleError {
    /// A cron field is malformed or out of range.
    #[error("invalid cron expression: {0}")]
    InvalidCron(String),

    /// The expression is neither a cron expression nor a timestamp.
    #[error("could not parse schedule '{expression}': {reason}")]
    Unparseable {
        /// The rejected expression.
        expression: String,
        /// Why the cron interpretation failed.
        reason: String,
    },

    /// A one-off timestamp is not strictly in the future.
    #[error("scheduled time {at} is not in the future")]
    NotInFuture {
        /// The rejected instant.
        at: DateTime<Utc>,
    },

    /// A cron expression that never matches any date (e.g. February 30th).
    #[error("cron expression '{0}' never fires")]
    NeverFires(String),
}

/// A specialized Result type for schedule operations.
pub type Result<T> = std::result::Result<T, ScheduleError>;
