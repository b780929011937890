//! Workflow orchestration and lifecycle management

use crate::models::payload::ExecutionPayload;
use crate::models::workflow::{ExecutionRecord, WorkflowExecution};
use crate::workflow::engine::WorkflowEngine;
use anyhow::{anyhow, Result};
use dashmap::DashMap;
use std::sync::Arc;
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Spawns executions as independent tasks and tracks the ones in flight.
///
/// Starting an execution never waits on earlier ones; there is no limit on
/// how many run at once.
pub struct WorkflowOrchestrator {
    /// Active workflow execution handles
    active_executions: Arc<DashMap<Uuid, JoinHandle<WorkflowExecution>>>,
    /// Shared engine used by every execution
    engine: Arc<WorkflowEngine>,
}

impl WorkflowOrchestrator {
    /// Create new workflow orchestrator
    pub fn new(engine: Arc<WorkflowEngine>) -> Self {
        Self {
            active_executions: Arc::new(DashMap::new()),
            engine,
        }
    }

    pub fn engine(&self) -> &Arc<WorkflowEngine> {
        &self.engine
    }

    /// Start a workflow execution
    pub fn start_execution(&self, payload: ExecutionPayload, initiator: impl Into<String>) -> Uuid {
        let execution_id = Uuid::new_v4();
        let initiator = initiator.into();
        let engine = self.engine.clone();

        let handle =
            tokio::spawn(async move { engine.execute(execution_id, payload, &initiator).await });
        self.active_executions.insert(execution_id, handle);

        tracing::info!(
            execution_id = %execution_id,
            workflow = self.engine.definition().name(),
            "Started workflow execution"
        );

        execution_id
    }

    /// Journaled view of an execution
    pub fn get_execution_status(&self, execution_id: Uuid) -> Option<ExecutionRecord> {
        self.engine.journal().get_execution(execution_id)
    }

    /// Check if execution is still running
    pub fn is_running(&self, execution_id: Uuid) -> bool {
        self.active_executions
            .get(&execution_id)
            .map(|handle| !handle.is_finished())
            .unwrap_or(false)
    }

    /// Get count of executions still running
    pub fn active_count(&self) -> usize {
        self.active_executions
            .iter()
            .filter(|entry| !entry.value().is_finished())
            .count()
    }

    /// Drop handles of finished executions, returning how many were removed.
    ///
    /// Their outcomes remain available through the journal.
    pub fn reap_finished(&self) -> usize {
        let before = self.active_executions.len();
        self.active_executions
            .retain(|_, handle| !handle.is_finished());
        let reaped = before.saturating_sub(self.active_executions.len());
        if reaped > 0 {
            tracing::debug!(reaped, "Reaped finished executions");
        }
        reaped
    }

    /// Wait for an execution to reach Succeeded or Failed
    pub async fn wait_for_completion(&self, execution_id: Uuid) -> Result<WorkflowExecution> {
        let (_key, handle) = self
            .active_executions
            .remove(&execution_id)
            .ok_or_else(|| anyhow!("Execution {} is not tracked", execution_id))?;

        handle
            .await
            .map_err(|e| anyhow!("Workflow execution task panicked: {}", e))
    }

    /// Wait for every tracked execution, in no particular order
    pub async fn wait_all(&self) -> Vec<WorkflowExecution> {
        let ids: Vec<Uuid> = self
            .active_executions
            .iter()
            .map(|entry| *entry.key())
            .collect();

        let mut finished = Vec::with_capacity(ids.len());
        for execution_id in ids {
            match self.wait_for_completion(execution_id).await {
                Ok(execution) => finished.push(execution),
                Err(e) => tracing::warn!(execution_id = %execution_id, error = %e, "Execution lost"),
            }
        }
        finished
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::workflow::ExecutionStatus;
    use crate::workflow::clock::ManualClock;
    use crate::workflow::definition::WorkflowDefinition;
    use crate::workflow::market::SimulatedMarket;
    use crate::workflow::persistence::ExecutionJournal;
    use crate::workflow::store::TransactionStore;
    use chrono::Utc;

    fn orchestrator() -> (WorkflowOrchestrator, Arc<TransactionStore>) {
        let store = Arc::new(TransactionStore::in_memory());
        let engine = WorkflowEngine::new(
            WorkflowDefinition::stock_trading(),
            Arc::new(SimulatedMarket::default()),
            store.clone(),
            Arc::new(ManualClock::new(Utc::now())),
            Arc::new(ExecutionJournal::in_memory()),
        );
        (WorkflowOrchestrator::new(Arc::new(engine)), store)
    }

    #[tokio::test]
    async fn test_orchestrator_start_execution() {
        let (orchestrator, store) = orchestrator();

        let execution_id = orchestrator.start_execution(ExecutionPayload::new(), "test-user");

        let execution = orchestrator
            .wait_for_completion(execution_id)
            .await
            .unwrap();
        assert_eq!(execution.id, execution_id);
        assert_eq!(execution.status, ExecutionStatus::Succeeded);
        assert_eq!(store.len(), 1);

        // Verify no longer tracked
        assert!(!orchestrator.is_running(execution_id));
        assert!(orchestrator.wait_for_completion(execution_id).await.is_err());

        let record = orchestrator.get_execution_status(execution_id).unwrap();
        assert_eq!(record.initiator, "test-user");
    }

    #[tokio::test]
    async fn test_reap_finished() {
        let (orchestrator, store) = orchestrator();

        for _ in 0..3 {
            orchestrator.start_execution(ExecutionPayload::new(), "test");
        }
        while orchestrator.active_count() > 0 {
            tokio::task::yield_now().await;
        }

        assert_eq!(orchestrator.reap_finished(), 3);
        assert_eq!(orchestrator.reap_finished(), 0);
        assert!(orchestrator.wait_all().await.is_empty());
        assert_eq!(store.len(), 3);
    }

    #[tokio::test]
    async fn test_wait_all() {
        let (orchestrator, _store) = orchestrator();
        let ids: Vec<Uuid> = (0..4)
            .map(|_| orchestrator.start_execution(ExecutionPayload::new(), "test"))
            .collect();

        let finished = orchestrator.wait_all().await;

        assert_eq!(finished.len(), 4);
        for execution in finished {
            assert!(ids.contains(&execution.id));
            assert!(execution.status.is_terminal());
        }
    }
}
