//! Command handlers

use anyhow::{anyhow, Context, Result};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use stock_trader_core::models::{Configuration, ExecutionPayload, ExecutionStatus, WorkflowExecution};
use stock_trader_core::workflow::{
    Cadence, ExecutionJournal, Scheduler, SimulatedMarket, TokioClock, TransactionStore,
    WorkflowDefinition, WorkflowEngine, WorkflowOrchestrator, WorkflowOutputs,
};
use tokio::sync::broadcast;

/// Initiator recorded for `run`
const CLI_INITIATOR: &str = "cli";

/// Everything needed to execute the workflow, built from configuration
struct Runtime {
    store: Arc<TransactionStore>,
    orchestrator: Arc<WorkflowOrchestrator>,
    clock: Arc<TokioClock>,
}

fn create_runtime(config: &Configuration) -> Result<Runtime> {
    if let Err(errors) = config.validate() {
        return Err(anyhow!("Invalid configuration:\n  {}", errors.join("\n  ")));
    }

    let store = Arc::new(
        TransactionStore::open(&config.transaction_store_path)
            .context("Failed to open transaction store")?,
    );
    let journal = Arc::new(open_journal(config)?);
    let clock = Arc::new(TokioClock::new());

    let engine = WorkflowEngine::new(
        WorkflowDefinition::stock_trading(),
        Arc::new(SimulatedMarket::new(config.min_price, config.max_price)),
        store.clone(),
        clock.clone(),
        journal,
    );

    Ok(Runtime {
        store,
        orchestrator: Arc::new(WorkflowOrchestrator::new(Arc::new(engine))),
        clock,
    })
}

fn open_journal(config: &Configuration) -> Result<ExecutionJournal> {
    let journal = ExecutionJournal::new(&config.journal_path)
        .context("Failed to initialize execution journal")?;
    Ok(journal.with_retention(config.journal_retention))
}

fn execution_json(execution: &WorkflowExecution) -> serde_json::Value {
    json!({
        "execution_id": execution.id.to_string(),
        "workflow_name": execution.workflow_name,
        "status": execution.status,
        "path": execution.path,
        "attempts": execution.attempts,
        "payload": execution.payload,
        "started_at": execution.started_at.to_rfc3339(),
        "completed_at": execution.completed_at.map(|t| t.to_rfc3339()),
        "failure": execution.failure,
    })
}

fn print_execution(execution: &WorkflowExecution) {
    let path: Vec<&str> = execution.path.iter().map(|s| s.as_str()).collect();
    println!("Execution ID:   {}", execution.id);
    println!("Status:         {}", execution.status);
    println!("Path:           {}", path.join(" -> "));
    if let Some(price) = execution.payload.stock_price() {
        println!("Stock Price:    {}", price);
    }
    if let Ok(id) = execution.payload.string_field("id") {
        println!(
            "Transaction:    {} {} x{} @ {}",
            id,
            execution.payload.string_field("type").unwrap_or("?"),
            execution.payload.string_field("qty").unwrap_or("?"),
            execution.payload.string_field("price").unwrap_or("?"),
        );
    }
    if let Some(failure) = &execution.failure {
        println!(
            "Failure:        {} after {} attempt(s): {}",
            failure.state, failure.attempts, failure.message
        );
    }
}

/// Handle run command
pub async fn handle_run(config: &Configuration, json: bool) -> Result<()> {
    let runtime = create_runtime(config)?;

    let execution_id = runtime
        .orchestrator
        .start_execution(ExecutionPayload::new(), CLI_INITIATOR);
    let execution = runtime
        .orchestrator
        .wait_for_completion(execution_id)
        .await
        .context("Failed to wait for execution")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&execution_json(&execution))?);
    } else {
        print_execution(&execution);
    }

    if execution.status == ExecutionStatus::Failed {
        return Err(anyhow!("Execution {} failed", execution.id));
    }
    Ok(())
}

/// Handle schedule command
pub async fn handle_schedule(
    config: &Configuration,
    cron: Option<String>,
    ticks: Option<usize>,
) -> Result<()> {
    let expression = cron.unwrap_or_else(|| config.schedule.clone());
    let cadence: Cadence = expression
        .parse()
        .with_context(|| format!("Invalid schedule '{}'", expression))?;
    let runtime = create_runtime(config)?;

    let scheduler = Scheduler::new(cadence, runtime.orchestrator.clone(), runtime.clock.clone());
    println!("Scheduler started with cadence '{}'", scheduler.cadence());
    println!("Next tick at {}", scheduler.next_fire_time().to_rfc3339());
    println!("Press Ctrl-C to stop");

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = shutdown_tx.send(());
        }
    });

    let runs = scheduler.run_until(Some(shutdown_rx), ticks).await;

    let in_flight = runtime.orchestrator.active_count();
    if in_flight > 0 {
        println!("Waiting for {} in-flight execution(s)...", in_flight);
    }
    let finished = runtime.orchestrator.wait_all().await;

    let failed = finished
        .iter()
        .filter(|e| e.status == ExecutionStatus::Failed)
        .count();
    println!(
        "Scheduler stopped after {} tick(s); {} transaction(s) recorded",
        runs.len(),
        runtime.store.len()
    );
    if failed > 0 {
        println!("{} of the last {} execution(s) failed", failed, finished.len());
    }

    Ok(())
}

/// Handle describe command
pub async fn handle_describe(config: &Configuration, json: bool) -> Result<()> {
    let store = TransactionStore::open(&config.transaction_store_path)
        .context("Failed to open transaction store")?;
    let outputs = WorkflowOutputs::new(&WorkflowDefinition::stock_trading(), &store);

    if json {
        println!("{}", serde_json::to_string_pretty(&outputs)?);
    } else {
        println!("Stock Trader Outputs");
        println!("====================");
        for (label, value) in outputs.entries() {
            println!("{:<24}{}", label, value);
        }
        println!("Schedule:               {}", config.schedule);
        println!();
        println!("Workflow Definition:");
        println!("{}", serde_json::to_string_pretty(&outputs.workflow_definition)?);
    }

    Ok(())
}

/// Handle transactions command
pub async fn handle_transactions(config: &Configuration, json: bool) -> Result<()> {
    let store = TransactionStore::open(&config.transaction_store_path)
        .context("Failed to open transaction store")?;
    let records = store.list();

    if json {
        println!("{}", serde_json::to_string_pretty(&records)?);
    } else if records.is_empty() {
        println!("No transactions recorded");
    } else {
        println!(
            "{:<38} {:<5} {:>8} {:>8}  {}",
            "ID", "TYPE", "PRICE", "QTY", "TIMESTAMP"
        );
        for record in &records {
            println!(
                "{:<38} {:<5} {:>8} {:>8}  {}",
                record.id, record.kind, record.price, record.quantity, record.timestamp
            );
        }
        println!();
        println!("{} transaction(s)", records.len());
    }

    Ok(())
}

/// Handle history command
pub async fn handle_history(
    config: &Configuration,
    workflow: Option<String>,
    json: bool,
) -> Result<()> {
    let journal = open_journal(config)?;
    let metrics = journal.query_metrics(workflow.as_deref());
    let executions = journal.list_executions(workflow.as_deref());

    if json {
        let output = json!({
            "workflow": workflow.as_deref().unwrap_or("all"),
            "execution_count": metrics.execution_count,
            "success_count": metrics.success_count,
            "failure_count": metrics.failure_count,
            "success_rate": format!("{:.2}%", metrics.success_rate()),
            "failure_rate": format!("{:.2}%", metrics.failure_rate()),
            "avg_duration_ms": metrics.avg_duration_ms,
            "executions": executions,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        let workflow_name = workflow.as_deref().unwrap_or("All Workflows");
        println!("Workflow History: {}", workflow_name);
        println!("==================");
        println!("Total Executions:   {}", metrics.execution_count);
        println!(
            "Successful:         {} ({:.1}%)",
            metrics.success_count,
            metrics.success_rate()
        );
        println!(
            "Failed:             {} ({:.1}%)",
            metrics.failure_count,
            metrics.failure_rate()
        );
        if metrics.execution_count > 0 {
            println!(
                "Avg Duration:       {:.2}s",
                metrics.avg_duration_ms as f64 / 1000.0
            );
            println!();
            for execution in &executions {
                println!(
                    "  {}  {:<9} {:<18} {}  ({})",
                    execution.started_at.format("%Y-%m-%d %H:%M:%S"),
                    execution.status,
                    execution.current_state,
                    execution.id,
                    execution.initiator
                );
            }
        }
    }

    Ok(())
}

/// Handle status command
pub async fn handle_status(config: &Configuration, execution_id: String, json: bool) -> Result<()> {
    let journal = open_journal(config)?;

    // Parse execution ID
    let exec_uuid = uuid::Uuid::parse_str(&execution_id)
        .context("Invalid execution ID format (expected UUID)")?;

    let execution = journal
        .get_execution(exec_uuid)
        .ok_or_else(|| anyhow!("Execution '{}' not found", execution_id))?;
    let transitions = journal.get_transitions(exec_uuid);

    if json {
        let output = json!({
            "execution": execution,
            "transitions": transitions,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        println!("Workflow Execution Status");
        println!("========================");
        println!("Execution ID:   {}", execution.id);
        println!("Workflow:       {}", execution.workflow_name);
        println!("Current State:  {}", execution.current_state);
        println!("Status:         {}", execution.status);
        println!(
            "Started At:     {}",
            execution.started_at.format("%Y-%m-%d %H:%M:%S")
        );
        if let Some(completed_at) = execution.completed_at {
            println!(
                "Completed At:   {}",
                completed_at.format("%Y-%m-%d %H:%M:%S")
            );
            let duration = (completed_at - execution.started_at).num_milliseconds();
            println!("Duration:       {} ms", duration);
        }
        println!("Initiator:      {}", execution.initiator);
        if let Some(failure) = &execution.failure {
            println!(
                "Failure:        {} [{}] after {} attempt(s): {}",
                failure.state, failure.error_class, failure.attempts, failure.message
            );
        }

        if !transitions.is_empty() {
            println!();
            println!("State Transitions:");
            println!("------------------");
            for transition in transitions {
                let from = transition.from_state.as_deref().unwrap_or("<initial>");
                let attempts = transition
                    .attempts
                    .map(|n| format!(", {} attempt(s)", n))
                    .unwrap_or_default();
                println!(
                    "  {} -> {} ({:?}{}) at {}",
                    from,
                    transition.to_state,
                    transition.transition_type,
                    attempts,
                    transition.timestamp.format("%H:%M:%S")
                );
            }
        }
    }

    Ok(())
}

/// Handle config --init command
pub async fn handle_config_init(config_path: PathBuf) -> Result<()> {
    println!("Initializing stock-trader configuration");
    println!("Config file: {}", config_path.display());

    let config = if config_path.exists() {
        println!("Configuration file already exists. Keeping existing values...");
        Configuration::load_from_file(&config_path)
            .map_err(|e| anyhow!("Failed to load existing config: {}", e))?
    } else {
        println!("Creating new configuration with defaults...");
        Configuration::default()
    };

    if let Err(errors) = config.validate() {
        for error in &errors {
            println!("  - {}", error);
        }
        return Err(anyhow!("Configuration is invalid"));
    }

    config
        .save_to_file(&config_path)
        .map_err(|e| anyhow!("Failed to save configuration: {}", e))?;

    println!("Configuration saved");
    println!("  schedule:               {}", config.schedule);
    println!(
        "  transaction_store_path: {}",
        config.transaction_store_path.display()
    );
    println!("  journal_path:           {}", config.journal_path.display());

    Ok(())
}
