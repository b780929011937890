//! Execution journal using JSON file storage

use crate::models::workflow::{
    ExecutionRecord, ExecutionStatus, StateTransition, WorkflowExecution,
};
use anyhow::{Context, Result};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

/// Finished executions a journal keeps unless told otherwise
pub const DEFAULT_JOURNAL_RETENTION: usize = 500;

/// Root JSON store containing all journal data
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct JsonStore {
    /// All workflow executions
    pub executions: Vec<ExecutionRecord>,
    /// All state transitions
    pub transitions: Vec<StateTransition>,
}

impl JsonStore {
    /// Drop the oldest finished executions, and their transitions, until at
    /// most `retention` executions remain. Running executions are never
    /// dropped. Returns how many executions were removed.
    fn prune(&mut self, retention: usize) -> usize {
        let excess = self.executions.len().saturating_sub(retention);
        if excess == 0 {
            return 0;
        }

        let mut finished: Vec<_> = self
            .executions
            .iter()
            .filter(|e| e.status.is_terminal())
            .map(|e| (e.started_at, e.id))
            .collect();
        finished.sort();
        let dropped: HashSet<Uuid> = finished
            .into_iter()
            .take(excess)
            .map(|(_, id)| id)
            .collect();

        self.executions.retain(|e| !dropped.contains(&e.id));
        self.transitions.retain(|t| !dropped.contains(&t.execution_id));
        dropped.len()
    }
}

/// Records executions and their state transitions.
///
/// Only the newest `retention` executions are kept, so the file a scheduler
/// rewrites on every transition stays bounded.
pub struct ExecutionJournal {
    /// Path to JSON store file, None when kept in memory only
    store_path: Option<PathBuf>,
    /// In-memory data store
    store: Mutex<JsonStore>,
    retention: usize,
}

impl ExecutionJournal {
    /// Journal that is never written to disk
    pub fn in_memory() -> Self {
        Self {
            store_path: None,
            store: Mutex::new(JsonStore::default()),
            retention: DEFAULT_JOURNAL_RETENTION,
        }
    }

    /// Create journal backed by a JSON file
    pub fn new<P: AsRef<Path>>(store_path: P) -> Result<Self> {
        let store_path = store_path.as_ref().to_path_buf();

        // Create parent directory if it doesn't exist
        if let Some(parent) = store_path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create journal directory")?;
        }

        let store = if store_path.exists() {
            Self::load_store(&store_path)?
        } else {
            JsonStore::default()
        };

        Ok(Self {
            store_path: Some(store_path),
            store: Mutex::new(store),
            retention: DEFAULT_JOURNAL_RETENTION,
        })
    }

    /// Keep at most `retention` executions (minimum 1)
    pub fn with_retention(mut self, retention: usize) -> Self {
        self.retention = retention.max(1);
        self
    }

    pub fn retention(&self) -> usize {
        self.retention
    }

    /// Whether writes go to a file
    pub fn is_persistent(&self) -> bool {
        self.store_path.is_some()
    }

    fn lock(&self) -> MutexGuard<'_, JsonStore> {
        self.store
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Load JSON store from file with file locking
    fn load_store(path: &Path) -> Result<JsonStore> {
        let file = File::open(path).context("Failed to open journal file")?;

        // Acquire shared lock for reading
        file.lock_shared()
            .context("Failed to acquire read lock on journal")?;

        let mut contents = String::new();
        let mut reader = std::io::BufReader::new(file);
        reader
            .read_to_string(&mut contents)
            .context("Failed to read journal")?;

        // Release lock automatically when file goes out of scope
        drop(reader);

        if contents.trim().is_empty() {
            return Ok(JsonStore::default());
        }

        serde_json::from_str(&contents).context("Failed to parse journal JSON")
    }

    /// Save JSON store to file with file locking; caller holds the store lock
    fn save_store(&self, store: &JsonStore) -> Result<()> {
        let Some(path) = &self.store_path else {
            return Ok(());
        };

        let json = serde_json::to_string_pretty(store).context("Failed to serialize journal")?;

        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .context("Failed to open journal file for writing")?;

        // Acquire exclusive lock before truncating
        file.lock_exclusive()
            .context("Failed to acquire write lock on journal")?;
        file.set_len(0).context("Failed to truncate journal")?;

        let mut writer = std::io::BufWriter::new(file);
        writer
            .write_all(json.as_bytes())
            .context("Failed to write journal")?;
        writer
            .flush()
            .context("Failed to flush journal to disk")?;

        Ok(())
    }

    /// Record a new execution
    pub fn create_execution(&self, record: ExecutionRecord) -> Result<()> {
        let mut store = self.lock();
        store.executions.push(record);
        self.prune(&mut store);
        self.save_store(&store)
    }

    /// Copy status, current state and failure from a live execution
    pub fn update_execution(&self, execution: &WorkflowExecution) -> Result<()> {
        let mut store = self.lock();
        if let Some(record) = store.executions.iter_mut().find(|e| e.id == execution.id) {
            record.status = execution.status;
            record.current_state = execution.current_state;
            record.completed_at = execution.completed_at;
            record.failure = execution.failure.clone();
        }
        self.prune(&mut store);
        self.save_store(&store)
    }

    fn prune(&self, store: &mut JsonStore) {
        let pruned = store.prune(self.retention);
        if pruned > 0 {
            tracing::debug!(pruned, retention = self.retention, "Pruned journaled executions");
        }
    }

    /// Get execution by ID
    pub fn get_execution(&self, execution_id: Uuid) -> Option<ExecutionRecord> {
        self.lock()
            .executions
            .iter()
            .find(|e| e.id == execution_id)
            .cloned()
    }

    /// Executions ordered by start time, optionally filtered by workflow
    pub fn list_executions(&self, workflow_name: Option<&str>) -> Vec<ExecutionRecord> {
        let mut executions: Vec<_> = self
            .lock()
            .executions
            .iter()
            .filter(|e| workflow_name.map_or(true, |w| e.workflow_name == w))
            .cloned()
            .collect();
        executions.sort_by_key(|e| e.started_at);
        executions
    }

    /// Persist state transition
    pub fn persist_state_transition(&self, transition: StateTransition) -> Result<()> {
        let mut store = self.lock();
        store.transitions.push(transition);
        self.save_store(&store)
    }

    /// Get transitions for execution
    pub fn get_transitions(&self, execution_id: Uuid) -> Vec<StateTransition> {
        self.lock()
            .transitions
            .iter()
            .filter(|t| t.execution_id == execution_id)
            .cloned()
            .collect()
    }

    /// Query metrics for workflow
    pub fn query_metrics(&self, workflow_name: Option<&str>) -> WorkflowMetrics {
        let executions = self.list_executions(workflow_name);

        let success = executions
            .iter()
            .filter(|e| e.status == ExecutionStatus::Succeeded)
            .count();
        let failed = executions
            .iter()
            .filter(|e| e.status == ExecutionStatus::Failed)
            .count();

        let durations: Vec<u64> = executions
            .iter()
            .filter_map(|e| {
                e.completed_at
                    .map(|completed| (completed - e.started_at).num_milliseconds().max(0) as u64)
            })
            .collect();

        let avg_duration_ms = if !durations.is_empty() {
            durations.iter().sum::<u64>() / durations.len() as u64
        } else {
            0
        };

        WorkflowMetrics {
            execution_count: executions.len(),
            success_count: success,
            failure_count: failed,
            avg_duration_ms,
        }
    }
}

/// Workflow execution metrics
#[derive(Debug, Clone, Serialize)]
pub struct WorkflowMetrics {
    pub execution_count: usize,
    pub success_count: usize,
    pub failure_count: usize,
    pub avg_duration_ms: u64,
}

impl WorkflowMetrics {
    /// Percentage of failed executions (0.0 to 100.0)
    pub fn failure_rate(&self) -> f64 {
        if self.execution_count == 0 {
            return 0.0;
        }
        (self.failure_count as f64 / self.execution_count as f64) * 100.0
    }

    /// Percentage of successful executions (0.0 to 100.0)
    pub fn success_rate(&self) -> f64 {
        if self.execution_count == 0 {
            return 0.0;
        }
        (self.success_count as f64 / self.execution_count as f64) * 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::payload::ExecutionPayload;
    use crate::models::workflow::{ExecutionFailure, StateName, TransitionType};
    use chrono::{Duration, Utc};
    use tempfile::tempdir;

    fn execution() -> WorkflowExecution {
        WorkflowExecution::new(
            Uuid::new_v4(),
            "test-workflow",
            StateName::CheckStockValue,
            ExecutionPayload::new(),
            Utc::now(),
        )
    }

    #[test]
    fn test_persistence_initialization() {
        let dir = tempdir().unwrap();
        let store_path = dir.path().join("nested").join("journal.json");

        let journal = ExecutionJournal::new(&store_path).unwrap();

        // File may not exist until first save, but parent directory should exist
        assert!(store_path.parent().unwrap().exists());
        assert!(journal.list_executions(None).is_empty());
    }

    #[test]
    fn test_create_update_and_reload() {
        let dir = tempdir().unwrap();
        let store_path = dir.path().join("journal.json");

        let mut exec = execution();
        {
            let journal = ExecutionJournal::new(&store_path).unwrap();
            journal
                .create_execution(ExecutionRecord::from_execution(&exec, "test"))
                .unwrap();

            exec.status = ExecutionStatus::Failed;
            exec.completed_at = Some(exec.started_at + Duration::seconds(3));
            exec.failure = Some(ExecutionFailure {
                state: StateName::CheckStockValue,
                attempts: 5,
                error_class: "States.TaskFailed".to_string(),
                message: "down".to_string(),
            });
            journal.update_execution(&exec).unwrap();
            journal
                .persist_state_transition(StateTransition {
                    id: Uuid::new_v4(),
                    execution_id: exec.id,
                    from_state: Some("CheckStockValue".to_string()),
                    to_state: "Failed".to_string(),
                    transition_type: TransitionType::Failure,
                    timestamp: Utc::now(),
                    duration_ms: Some(3000),
                    attempts: Some(5),
                })
                .unwrap();
        }

        let reopened = ExecutionJournal::new(&store_path).unwrap();
        let record = reopened.get_execution(exec.id).unwrap();
        assert_eq!(record.status, ExecutionStatus::Failed);
        assert_eq!(record.initiator, "test");
        assert_eq!(record.failure.unwrap().attempts, 5);
        assert_eq!(reopened.get_transitions(exec.id).len(), 1);
    }

    #[test]
    fn test_retention_prunes_oldest_finished_executions() {
        let dir = tempdir().unwrap();
        let store_path = dir.path().join("journal.json");
        let journal = ExecutionJournal::new(&store_path).unwrap().with_retention(3);
        let start = Utc::now();

        let mut running = execution();
        running.started_at = start;
        journal
            .create_execution(ExecutionRecord::from_execution(&running, "test"))
            .unwrap();

        let mut ids = Vec::new();
        for n in 1..=5 {
            let mut exec = execution();
            exec.started_at = start + Duration::minutes(n);
            exec.status = ExecutionStatus::Succeeded;
            exec.completed_at = Some(exec.started_at);
            journal
                .create_execution(ExecutionRecord::from_execution(&exec, "test"))
                .unwrap();
            journal
                .persist_state_transition(StateTransition {
                    id: Uuid::new_v4(),
                    execution_id: exec.id,
                    from_state: None,
                    to_state: "CheckStockValue".to_string(),
                    transition_type: TransitionType::Initial,
                    timestamp: exec.started_at,
                    duration_ms: None,
                    attempts: None,
                })
                .unwrap();
            ids.push(exec.id);
        }

        let kept: Vec<Uuid> = journal
            .list_executions(None)
            .iter()
            .map(|e| e.id)
            .collect();
        assert_eq!(kept, vec![running.id, ids[3], ids[4]]);
        assert!(journal.get_transitions(ids[0]).is_empty());
        assert_eq!(journal.get_transitions(ids[4]).len(), 1);

        let reopened = ExecutionJournal::new(&store_path).unwrap();
        assert_eq!(reopened.list_executions(None).len(), 3);
    }

    #[test]
    fn test_query_metrics() {
        let journal = ExecutionJournal::in_memory();

        for status in [
            ExecutionStatus::Succeeded,
            ExecutionStatus::Succeeded,
            ExecutionStatus::Failed,
            ExecutionStatus::Running,
        ] {
            let mut exec = execution();
            exec.status = status;
            if status.is_terminal() {
                exec.completed_at = Some(exec.started_at + Duration::milliseconds(400));
            }
            journal
                .create_execution(ExecutionRecord::from_execution(&exec, "test"))
                .unwrap();
        }

        let metrics = journal.query_metrics(Some("test-workflow"));
        assert_eq!(metrics.execution_count, 4);
        assert_eq!(metrics.success_count, 2);
        assert_eq!(metrics.failure_count, 1);
        assert_eq!(metrics.avg_duration_ms, 400);
        assert_eq!(metrics.success_rate(), 50.0);
        assert_eq!(metrics.failure_rate(), 25.0);

        assert_eq!(journal.query_metrics(Some("other")).execution_count, 0);
        assert_eq!(journal.query_metrics(Some("other")).failure_rate(), 0.0);
    }
}
