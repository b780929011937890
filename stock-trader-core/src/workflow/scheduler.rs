//! Cadence-driven trigger that starts one execution per tick

use crate::models::payload::ExecutionPayload;
use crate::workflow::cadence::Cadence;
use crate::workflow::clock::Clock;
use crate::workflow::orchestrator::WorkflowOrchestrator;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::broadcast;
use uuid::Uuid;

/// Initiator recorded for executions started by the scheduler
pub const SCHEDULER_INITIATOR: &str = "scheduler";

/// One fired tick
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScheduledRun {
    pub tick_at: DateTime<Utc>,
    pub execution_id: Uuid,
}

/// Fires a new execution on every cadence boundary.
///
/// Ticks never wait for earlier executions; overlapping runs are allowed.
pub struct Scheduler {
    cadence: Cadence,
    orchestrator: Arc<WorkflowOrchestrator>,
    clock: Arc<dyn Clock>,
}

impl Scheduler {
    pub fn new(
        cadence: Cadence,
        orchestrator: Arc<WorkflowOrchestrator>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            cadence,
            orchestrator,
            clock,
        }
    }

    pub fn cadence(&self) -> &Cadence {
        &self.cadence
    }

    pub fn orchestrator(&self) -> &Arc<WorkflowOrchestrator> {
        &self.orchestrator
    }

    /// Next time the scheduler will fire
    pub fn next_fire_time(&self) -> DateTime<Utc> {
        self.cadence.next_after(self.clock.now())
    }

    /// Start one execution with an empty payload, right now
    pub fn tick(&self) -> ScheduledRun {
        self.orchestrator.reap_finished();

        let tick_at = self.clock.now();
        let execution_id = self
            .orchestrator
            .start_execution(ExecutionPayload::new(), SCHEDULER_INITIATOR);

        tracing::info!(
            tick_at = %tick_at,
            execution_id = %execution_id,
            in_flight = self.orchestrator.active_count(),
            "Scheduler tick"
        );

        ScheduledRun {
            tick_at,
            execution_id,
        }
    }

    /// Tick on every cadence boundary until `shutdown` fires
    pub async fn run(&self, shutdown: broadcast::Receiver<()>) -> Vec<ScheduledRun> {
        self.run_until(Some(shutdown), None).await
    }

    /// Tick on the next `ticks` cadence boundaries
    pub async fn run_ticks(&self, ticks: usize) -> Vec<ScheduledRun> {
        self.run_until(None, Some(ticks)).await
    }

    /// Tick until `shutdown` fires or `max_ticks` ticks have fired
    pub async fn run_until(
        &self,
        mut shutdown: Option<broadcast::Receiver<()>>,
        max_ticks: Option<usize>,
    ) -> Vec<ScheduledRun> {
        let mut runs = Vec::new();
        tracing::info!(cadence = %self.cadence, max_ticks = ?max_ticks, "Scheduler starting");

        while max_ticks.map_or(true, |max| runs.len() < max) {
            let shutdown_signal = async {
                match shutdown.as_mut() {
                    // a closed channel counts as shutdown too
                    Some(rx) => {
                        let _ = rx.recv().await;
                    }
                    None => std::future::pending::<()>().await,
                }
            };

            tokio::select! {
                _ = shutdown_signal => {
                    tracing::info!("Scheduler received shutdown signal");
                    break;
                }
                _ = self.sleep_until_next_fire() => {
                    runs.push(self.tick());
                }
            }
        }

        tracing::info!(ticks = runs.len(), "Scheduler stopped");
        runs
    }

    async fn sleep_until_next_fire(&self) {
        let now = self.clock.now();
        let next = self.cadence.next_after(now);
        let wait = (next - now).to_std().unwrap_or_default();
        tracing::debug!(next = %next, wait_ms = wait.as_millis() as u64, "Waiting for next tick");
        self.clock.sleep(wait).await;
    }
}
