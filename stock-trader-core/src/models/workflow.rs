//! Workflow orchestration data models

use crate::error::{RetrySpecError, ALL, TASK_FAILED};
use crate::models::payload::ExecutionPayload;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, Serializer};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

/// Execution status for workflow instances
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    /// Workflow is actively executing
    Running,
    /// Reached the end of the graph after recording the transaction
    Succeeded,
    /// A step failed fatally
    Failed,
}

impl ExecutionStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ExecutionStatus::Running)
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ExecutionStatus::Running => "Running",
            ExecutionStatus::Succeeded => "Succeeded",
            ExecutionStatus::Failed => "Failed",
        };
        f.pad(name)
    }
}

/// The five states of the trading graph
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StateName {
    CheckStockValue,
    BuyOrSell,
    BuyStock,
    SellStock,
    RecordTransaction,
}

impl StateName {
    /// All states in graph order
    pub const ALL: [StateName; 5] = [
        StateName::CheckStockValue,
        StateName::BuyOrSell,
        StateName::BuyStock,
        StateName::SellStock,
        StateName::RecordTransaction,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StateName::CheckStockValue => "CheckStockValue",
            StateName::BuyOrSell => "BuyOrSell",
            StateName::BuyStock => "BuyStock",
            StateName::SellStock => "SellStock",
            StateName::RecordTransaction => "RecordTransaction",
        }
    }
}

impl fmt::Display for StateName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Bounded retry policy for one step.
///
/// `max_attempts` counts every invocation including the first, so a step
/// waits at most `max_attempts - 1` times.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrySpec {
    /// Error classes that may be retried
    pub error_classes: BTreeSet<String>,
    /// Delay before the first retry
    #[serde(rename = "interval_seconds", serialize_with = "serialize_secs")]
    pub initial_interval: Duration,
    /// Maximum number of invocations
    pub max_attempts: u32,
    /// Multiplier applied to the delay after each retry
    pub backoff_rate: f64,
}

impl RetrySpec {
    /// Create a retry spec, checking its invariants
    pub fn new<I, S>(
        error_classes: I,
        initial_interval: Duration,
        max_attempts: u32,
        backoff_rate: f64,
    ) -> Result<Self, RetrySpecError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let error_classes: BTreeSet<String> = error_classes.into_iter().map(Into::into).collect();
        if error_classes.is_empty() {
            return Err(RetrySpecError::NoErrorClasses);
        }
        if max_attempts == 0 {
            return Err(RetrySpecError::ZeroAttempts);
        }
        if !backoff_rate.is_finite() || backoff_rate < 1.0 {
            return Err(RetrySpecError::InvalidBackoffRate(backoff_rate));
        }

        Ok(Self {
            error_classes,
            initial_interval,
            max_attempts,
            backoff_rate,
        })
    }

    /// Retry spec covering only task failures
    pub fn task_failed(
        initial_interval: Duration,
        max_attempts: u32,
        backoff_rate: f64,
    ) -> Result<Self, RetrySpecError> {
        Self::new([TASK_FAILED], initial_interval, max_attempts, backoff_rate)
    }

    /// Spec for steps without a retry policy: one attempt, no waits
    pub fn single_attempt() -> Self {
        Self {
            error_classes: BTreeSet::from([TASK_FAILED.to_string()]),
            initial_interval: Duration::ZERO,
            max_attempts: 1,
            backoff_rate: 1.0,
        }
    }

    /// Whether errors of `class` may be retried under this spec
    pub fn covers(&self, class: &str) -> bool {
        self.error_classes.contains(class) || self.error_classes.contains(ALL)
    }

    /// Delay before retry number `retry_index` (0 for the first retry):
    /// `initial_interval * backoff_rate ^ retry_index`, saturating at
    /// `Duration::MAX` when the product does not fit.
    pub fn delay_for_retry(&self, retry_index: u32) -> Duration {
        let exponent = i32::try_from(retry_index).unwrap_or(i32::MAX);
        let secs = self.initial_interval.as_secs_f64() * self.backoff_rate.powi(exponent);
        Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
    }
}

fn serialize_secs<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(duration.as_secs_f64())
}

/// Why an execution ended in `Failed`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExecutionFailure {
    /// State that failed
    pub state: StateName,
    /// Invocations made before giving up
    pub attempts: u32,
    /// Class of the last error
    pub error_class: String,
    /// Message of the last error
    pub message: String,
}

/// Runtime state of one execution, owned by the engine while it runs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowExecution {
    /// Unique execution identifier
    pub id: Uuid,
    /// Name of the workflow definition
    pub workflow_name: String,
    /// Current/last state in execution
    pub current_state: StateName,
    /// Data threaded between states
    pub payload: ExecutionPayload,
    /// Invocations used per state
    pub attempts: BTreeMap<StateName, u32>,
    /// Overall execution status
    pub status: ExecutionStatus,
    /// States entered, in order
    pub path: Vec<StateName>,
    /// When execution began
    pub started_at: DateTime<Utc>,
    /// When execution reached a terminal status
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// Set when status is `Failed`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<ExecutionFailure>,
}

impl WorkflowExecution {
    pub fn new(
        id: Uuid,
        workflow_name: impl Into<String>,
        initial_state: StateName,
        payload: ExecutionPayload,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            workflow_name: workflow_name.into(),
            current_state: initial_state,
            payload,
            attempts: BTreeMap::new(),
            status: ExecutionStatus::Running,
            path: vec![initial_state],
            started_at,
            completed_at: None,
            failure: None,
        }
    }

    /// Whether the execution ever entered `state`
    pub fn visited(&self, state: StateName) -> bool {
        self.path.contains(&state)
    }

    /// Invocations used by `state` (0 if it never ran)
    pub fn attempts_for(&self, state: StateName) -> u32 {
        self.attempts.get(&state).copied().unwrap_or(0)
    }
}

/// Journaled summary of an execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRecord {
    /// Unique execution identifier
    pub id: Uuid,
    /// Name of the workflow definition
    pub workflow_name: String,
    /// Current/last state in execution
    pub current_state: StateName,
    /// Overall execution status
    pub status: ExecutionStatus,
    /// When workflow execution began
    pub started_at: DateTime<Utc>,
    /// When workflow execution finished
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// What started the execution (scheduler, cli)
    pub initiator: String,
    /// Failure details for failed executions
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<ExecutionFailure>,
}

impl ExecutionRecord {
    pub fn from_execution(execution: &WorkflowExecution, initiator: impl Into<String>) -> Self {
        Self {
            id: execution.id,
            workflow_name: execution.workflow_name.clone(),
            current_state: execution.current_state,
            status: execution.status,
            started_at: execution.started_at,
            completed_at: execution.completed_at,
            initiator: initiator.into(),
            failure: execution.failure.clone(),
        }
    }
}

/// State transition record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateTransition {
    /// Unique transition ID
    pub id: Uuid,
    /// Foreign key to workflow execution
    pub execution_id: Uuid,
    /// Previous state name (None for initial state)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_state: Option<String>,
    /// New state name, or the terminal status
    pub to_state: String,
    /// Reason for transition
    pub transition_type: TransitionType,
    /// When transition occurred
    pub timestamp: DateTime<Utc>,
    /// Time spent in from_state (milliseconds)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    /// Invocations used by from_state
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attempts: Option<u32>,
}

/// Reason for state transition
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TransitionType {
    /// Starting the workflow
    Initial,
    /// Task step completed
    Success,
    /// Choice node picked a branch
    Choice,
    /// Step failed fatally
    Failure,
}
