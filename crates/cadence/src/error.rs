//! Error types for the scheduler.

use std::time::Duration;

use thiserror::Error;

use crate::task::TaskId;

/// Errors produced while parsing a trigger spec or cron expression.
///
/// These are local to registration and surfaced to the caller immediately;
/// nothing that parses successfully can later fail with a `ParseError`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// The trigger spec was empty.
    #[error("empty trigger spec")]
    Empty,

    /// The trigger spec did not start with a known kind.
    #[error("unknown trigger kind: {0:?} (expected fixedRate, fixedDelay, or cron)")]
    UnknownKind(String),

    /// A fixed-rate or fixed-delay interval was missing, non-numeric, or zero.
    #[error("invalid interval {0:?}: expected a positive number of milliseconds")]
    InvalidInterval(String),

    /// A cron expression did not have exactly six fields.
    #[error("cron expression must have 6 fields (sec min hour dom month dow), got {0}")]
    FieldCount(usize),

    /// A cron field could not be parsed.
    #[error("invalid cron {field} field {text:?}: {reason}")]
    InvalidField {
        field: &'static str,
        text: String,
        reason: String,
    },
}

/// Errors that can occur in scheduler operations.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Malformed trigger spec or cron expression.
    #[error(transparent)]
    Parse(#[from] ParseError),

    /// A cron expression that parses but never matches (e.g. Feb 30).
    #[error("cron expression {0:?} has no fire time within the search horizon")]
    UnsatisfiableSchedule(String),

    /// A task with the same name is already registered and not cancelled.
    #[error("task already exists: {0}")]
    TaskExists(String),

    /// No task with the given id is registered.
    #[error("task not found: {0}")]
    TaskNotFound(TaskId),

    /// The worker pool rejected a submission because all slots and the
    /// overflow queue were full.
    #[error("worker pool exhausted")]
    PoolExhausted,

    /// The drain phase of shutdown exceeded its timeout; remaining runs were
    /// force-cancelled. The scheduler still stopped.
    #[error("drain timed out after {timeout:?}; {remaining} run(s) force-cancelled")]
    ShutdownTimeout { timeout: Duration, remaining: usize },

    /// The scheduler loop has already stopped.
    #[error("scheduler is not running")]
    NotRunning,
}
