//! Error types for task invocation, retry specs and schedules

use crate::models::workflow::StateName;
use thiserror::Error;

/// Error class raised when an external operation call fails
pub const TASK_FAILED: &str = "States.TaskFailed";
/// Error class for payload or contract violations detected by the engine
pub const RUNTIME: &str = "States.Runtime";
/// Error class for a conflicting write to an existing transaction id
pub const DUPLICATE_ID: &str = "Store.DuplicateId";
/// Wildcard class matching every error
pub const ALL: &str = "States.ALL";

/// Error returned by a task operation or the transaction recorder
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TaskError {
    #[error("task failed: {0}")]
    TaskFailed(String),

    #[error("runtime error: {0}")]
    Runtime(String),

    #[error("transaction '{0}' already recorded with different content")]
    DuplicateId(String),

    #[error("{class}: {message}")]
    Other { class: String, message: String },
}

impl TaskError {
    /// Error class used to match retry specs
    pub fn class(&self) -> &str {
        match self {
            TaskError::TaskFailed(_) => TASK_FAILED,
            TaskError::Runtime(_) => RUNTIME,
            TaskError::DuplicateId(_) => DUPLICATE_ID,
            TaskError::Other { class, .. } => class,
        }
    }

    pub fn task_failed(message: impl Into<String>) -> Self {
        TaskError::TaskFailed(message.into())
    }

    pub fn runtime(message: impl Into<String>) -> Self {
        TaskError::Runtime(message.into())
    }
}

/// Fatal outcome of a step: retries exhausted or a non-retryable error
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("step '{state}' failed after {attempts} attempt(s): {error}")]
pub struct StepFailure {
    /// Step that failed
    pub state: StateName,
    /// Invocations made, including the first
    pub attempts: u32,
    /// Last error observed
    pub error: TaskError,
}

/// Retry spec invariant violations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RetrySpecError {
    #[error("max_attempts must be at least 1")]
    ZeroAttempts,

    #[error("backoff_rate must be a finite number >= 1.0, got {0}")]
    InvalidBackoffRate(f64),

    #[error("retry spec must name at least one error class")]
    NoErrorClasses,
}

/// Errors raised while parsing a cron-like cadence
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CadenceError {
    #[error("expected 5 cron fields (minute hour day month weekday), got {0}")]
    FieldCount(usize),

    #[error("invalid {field} field '{value}'")]
    InvalidField { field: &'static str, value: String },

    #[error("{field} field '{value}' is not supported; only '*' or '?' is allowed")]
    Unsupported { field: &'static str, value: String },
}
