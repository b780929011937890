//! State machine execution engine

use crate::error::{StepFailure, TaskError};
use crate::models::payload::ExecutionPayload;
use crate::models::transaction::TransactionRecord;
use crate::models::workflow::{
    ExecutionFailure, ExecutionRecord, ExecutionStatus, RetrySpec, StateName, StateTransition,
    TransitionType, WorkflowExecution,
};
use crate::workflow::clock::Clock;
use crate::workflow::definition::{choose_branch, Branch, StateKind, WorkflowDefinition};
use crate::workflow::persistence::ExecutionJournal;
use crate::workflow::retry::RetryPolicyEngine;
use crate::workflow::tasks::{TaskInvoker, TransactionRecorder};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::Instrument;
use uuid::Uuid;

/// Where a completed step sends the execution
struct StepOutcome {
    /// None when the step ends the execution
    next: Option<StateName>,
    transition_type: TransitionType,
    /// Invocations used, 0 for steps that call nothing
    attempts: u32,
}

/// Drives one execution through the workflow definition
pub struct WorkflowEngine {
    /// Workflow definition
    definition: WorkflowDefinition,
    /// CheckPrice, BuyStock and SellStock
    invoker: Arc<dyn TaskInvoker>,
    /// Transaction store
    recorder: Arc<dyn TransactionRecorder>,
    clock: Arc<dyn Clock>,
    retry: RetryPolicyEngine,
    /// Execution journal
    journal: Arc<ExecutionJournal>,
}

impl WorkflowEngine {
    /// Create new workflow engine
    pub fn new(
        definition: WorkflowDefinition,
        invoker: Arc<dyn TaskInvoker>,
        recorder: Arc<dyn TransactionRecorder>,
        clock: Arc<dyn Clock>,
        journal: Arc<ExecutionJournal>,
    ) -> Self {
        Self {
            definition,
            invoker,
            recorder,
            retry: RetryPolicyEngine::new(clock.clone()),
            clock,
            journal,
        }
    }

    pub fn definition(&self) -> &WorkflowDefinition {
        &self.definition
    }

    pub fn journal(&self) -> &Arc<ExecutionJournal> {
        &self.journal
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Execute workflow from the initial state to Succeeded or Failed.
    ///
    /// Step failures never escape as errors: they end the execution in
    /// `Failed` with the failing state and last error attached.
    pub async fn execute(
        &self,
        execution_id: Uuid,
        payload: ExecutionPayload,
        initiator: &str,
    ) -> WorkflowExecution {
        let span = tracing::info_span!("execution", execution_id = %execution_id);
        self.run(execution_id, payload, initiator)
            .instrument(span)
            .await
    }

    async fn run(
        &self,
        execution_id: Uuid,
        payload: ExecutionPayload,
        initiator: &str,
    ) -> WorkflowExecution {
        let initial_state = self.definition.initial_state();
        let mut execution = WorkflowExecution::new(
            execution_id,
            self.definition.name(),
            initial_state,
            payload,
            self.clock.now(),
        );

        let record = ExecutionRecord::from_execution(&execution, initiator);
        self.write_journal("execution", move |journal| journal.create_execution(record))
            .await;
        self.record_transition(StateTransition {
            id: Uuid::new_v4(),
            execution_id,
            from_state: None,
            to_state: initial_state.to_string(),
            transition_type: TransitionType::Initial,
            timestamp: execution.started_at,
            duration_ms: None,
            attempts: None,
        })
        .await;

        tracing::info!(
            workflow = %execution.workflow_name,
            initiator,
            "Execution started"
        );

        loop {
            let state = execution.current_state;
            let entered_at = self.clock.now();

            match self.step(state, &mut execution.payload).await {
                Ok(outcome) => {
                    if outcome.attempts > 0 {
                        execution.attempts.insert(state, outcome.attempts);
                    }

                    let to_state = match outcome.next {
                        Some(next) => next.to_string(),
                        None => ExecutionStatus::Succeeded.to_string(),
                    };
                    self.record_transition(self.transition(
                        execution_id,
                        state,
                        to_state,
                        outcome.transition_type,
                        entered_at,
                        outcome.attempts,
                    ))
                    .await;

                    match outcome.next {
                        Some(next) => {
                            tracing::debug!(from = %state, to = %next, "State transition");
                            execution.current_state = next;
                            execution.path.push(next);
                        }
                        None => {
                            execution.status = ExecutionStatus::Succeeded;
                            break;
                        }
                    }
                }
                Err(failure) => {
                    if failure.attempts > 0 {
                        execution.attempts.insert(state, failure.attempts);
                    }
                    self.record_transition(self.transition(
                        execution_id,
                        state,
                        ExecutionStatus::Failed.to_string(),
                        TransitionType::Failure,
                        entered_at,
                        failure.attempts,
                    ))
                    .await;

                    execution.status = ExecutionStatus::Failed;
                    execution.failure = Some(ExecutionFailure {
                        state: failure.state,
                        attempts: failure.attempts,
                        error_class: failure.error.class().to_string(),
                        message: failure.error.to_string(),
                    });
                    break;
                }
            }
        }

        execution.completed_at = Some(self.clock.now());
        let finished = execution.clone();
        self.write_journal("final status", move |journal| {
            journal.update_execution(&finished)
        })
        .await;

        match &execution.failure {
            None => tracing::info!(path = ?execution.path, "Execution succeeded"),
            Some(failure) => tracing::error!(
                state = %failure.state,
                attempts = failure.attempts,
                error_class = %failure.error_class,
                error = %failure.message,
                "Execution failed"
            ),
        }

        execution
    }

    /// Run the current state once, retries included
    async fn step(
        &self,
        state: StateName,
        payload: &mut ExecutionPayload,
    ) -> Result<StepOutcome, StepFailure> {
        let state_def = self.definition.state(state).ok_or_else(|| StepFailure {
            state,
            attempts: 0,
            error: TaskError::runtime(format!(
                "state '{}' not found in workflow definition",
                state
            )),
        })?;
        let spec = state_def
            .retry
            .clone()
            .unwrap_or_else(RetrySpec::single_attempt);

        match &state_def.kind {
            StateKind::Task { operation, next } => {
                let operation = *operation;
                let invoker = &self.invoker;
                let input = &*payload;

                let attempted = self
                    .retry
                    .execute_with_retry(state, &spec, move || async move {
                        let result = invoker.invoke(operation, input).await?;
                        operation.check_output(&result)?;
                        Ok(result)
                    })
                    .await?;

                payload.merge(attempted.value).map_err(|error| StepFailure {
                    state,
                    attempts: attempted.attempts,
                    error,
                })?;

                Ok(StepOutcome {
                    next: Some(*next),
                    transition_type: TransitionType::Success,
                    attempts: attempted.attempts,
                })
            }
            StateKind::Choice {
                variable,
                less_than,
                then,
                otherwise,
            } => {
                let branch =
                    choose_branch(payload, variable, *less_than).map_err(|error| StepFailure {
                        state,
                        attempts: 0,
                        error,
                    })?;
                let next = match branch {
                    Branch::Buy => *then,
                    Branch::Sell => *otherwise,
                };
                tracing::info!(
                    variable = *variable,
                    value = ?payload.number_field(variable),
                    branch = ?branch,
                    "Branch chosen"
                );

                Ok(StepOutcome {
                    next: Some(next),
                    transition_type: TransitionType::Choice,
                    attempts: 0,
                })
            }
            StateKind::Record => {
                // the recorder is never called with an incomplete record
                let record = TransactionRecord::from_payload(payload).map_err(|error| {
                    StepFailure {
                        state,
                        attempts: 0,
                        error,
                    }
                })?;
                let recorder = &self.recorder;
                let record = &record;

                let attempted = self
                    .retry
                    .execute_with_retry(state, &spec, move || async move {
                        recorder.put(record).await
                    })
                    .await?;

                Ok(StepOutcome {
                    next: None,
                    transition_type: TransitionType::Success,
                    attempts: attempted.attempts,
                })
            }
        }
    }

    fn transition(
        &self,
        execution_id: Uuid,
        from_state: StateName,
        to_state: String,
        transition_type: TransitionType,
        entered_at: DateTime<Utc>,
        attempts: u32,
    ) -> StateTransition {
        let timestamp = self.clock.now();
        StateTransition {
            id: Uuid::new_v4(),
            execution_id,
            from_state: Some(from_state.to_string()),
            to_state,
            transition_type,
            timestamp,
            duration_ms: Some((timestamp - entered_at).num_milliseconds().max(0) as u64),
            attempts: (attempts > 0).then_some(attempts),
        }
    }

    async fn record_transition(&self, transition: StateTransition) {
        self.write_journal("state transition", move |journal| {
            journal.persist_state_transition(transition)
        })
        .await;
    }

    /// Apply one journal write. File-backed journals lock and rewrite a file,
    /// so those writes run on the blocking pool. Failures are logged only.
    async fn write_journal<F>(&self, entry: &'static str, write: F)
    where
        F: FnOnce(&ExecutionJournal) -> anyhow::Result<()> + Send + 'static,
    {
        let result = if self.journal.is_persistent() {
            let journal = Arc::clone(&self.journal);
            match tokio::task::spawn_blocking(move || write(&*journal)).await {
                Ok(result) => result,
                Err(e) => Err(anyhow::anyhow!("journal write task failed: {}", e)),
            }
        } else {
            write(&*self.journal)
        };

        if let Err(e) = result {
            tracing::warn!(entry, error = %e, "Failed to journal entry");
        }
    }
}
