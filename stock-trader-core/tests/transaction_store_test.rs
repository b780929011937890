//! File-backed stores shared by concurrent executions

use fs2::FileExt;
use std::sync::Arc;
use std::time::Duration;
use stock_trader_core::error::DUPLICATE_ID;
use stock_trader_core::models::{ExecutionPayload, ExecutionStatus, TransactionRecord};
use stock_trader_core::workflow::{
    ExecutionJournal, SimulatedMarket, TokioClock, TransactionRecorder, TransactionStore,
    WorkflowDefinition, WorkflowEngine, WorkflowOrchestrator,
};
use tempfile::tempdir;

fn record(n: usize) -> TransactionRecord {
    TransactionRecord {
        id: format!("trade-{:03}", n),
        kind: if n % 2 == 0 { "buy" } else { "sell" }.to_string(),
        price: n.to_string(),
        quantity: "1".to_string(),
        timestamp: format!("2024-01-01T00:{:02}:00Z", n % 60),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_puts_are_all_persisted() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("transactions.json");
    let store = Arc::new(TransactionStore::open(&path).unwrap());

    let handles: Vec<_> = (0..32)
        .map(|n| {
            let store = store.clone();
            tokio::spawn(async move { store.put(&record(n)).await })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    assert_eq!(store.len(), 32);
    let reopened = TransactionStore::open(&path).unwrap();
    assert_eq!(reopened.len(), 32);
    assert_eq!(reopened.get("trade-007"), Some(record(7)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_separate_handles_on_one_file_lose_nothing() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("transactions.json");
    let scheduled = Arc::new(TransactionStore::open(&path).unwrap());
    let manual = Arc::new(TransactionStore::open(&path).unwrap());

    let handles: Vec<_> = (0..20)
        .map(|n| {
            let store = if n % 2 == 0 {
                scheduled.clone()
            } else {
                manual.clone()
            };
            tokio::spawn(async move { store.put(&record(n)).await })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let reopened = TransactionStore::open(&path).unwrap();
    assert_eq!(reopened.len(), 20);
    assert_eq!(reopened.get("trade-000"), Some(record(0)));
    assert_eq!(reopened.get("trade-019"), Some(record(19)));
}

#[tokio::test]
async fn test_put_waiting_on_file_lock_leaves_runtime_free() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("transactions.json");
    let store = Arc::new(TransactionStore::open(&path).unwrap());

    // another process holding the store
    let holder = std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(false)
        .open(&path)
        .unwrap();
    holder.lock_exclusive().unwrap();

    let pending = tokio::spawn({
        let store = store.clone();
        async move { store.put(&record(1)).await }
    });

    // this single-threaded runtime still drives timers while the put waits
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!pending.is_finished());
    assert!(store.get("trade-001").is_none());

    holder.unlock().unwrap();
    pending.await.unwrap().unwrap();
    assert_eq!(store.get("trade-001"), Some(record(1)));
}

#[tokio::test]
async fn test_replayed_put_is_idempotent_and_conflicts_are_rejected() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("transactions.json");
    let store = TransactionStore::open(&path).unwrap();

    store.put(&record(1)).await.unwrap();
    store.put(&record(1)).await.unwrap();

    let mut tampered = record(1);
    tampered.price = "999".to_string();
    let err = store.put(&tampered).await.unwrap_err();
    assert_eq!(err.class(), DUPLICATE_ID);

    let reopened = TransactionStore::open(&path).unwrap();
    assert_eq!(reopened.list(), vec![record(1)]);
}

#[tokio::test]
async fn test_simulated_market_end_to_end() {
    let dir = tempdir().unwrap();
    let store_path = dir.path().join("transactions.json");
    let journal_path = dir.path().join("journal.json");

    let store = Arc::new(TransactionStore::open(&store_path).unwrap());
    let journal = Arc::new(ExecutionJournal::new(&journal_path).unwrap());
    let engine = WorkflowEngine::new(
        WorkflowDefinition::stock_trading(),
        Arc::new(SimulatedMarket::new(0, 100)),
        store.clone(),
        Arc::new(TokioClock::new()),
        journal,
    );
    let orchestrator = WorkflowOrchestrator::new(Arc::new(engine));

    for _ in 0..5 {
        orchestrator.start_execution(ExecutionPayload::new(), "test");
    }
    let finished = orchestrator.wait_all().await;

    assert_eq!(finished.len(), 5);
    for execution in &finished {
        assert_eq!(execution.status, ExecutionStatus::Succeeded);
        let price = execution.payload.stock_price().unwrap();
        let kind = execution.payload.string_field("type").unwrap();
        assert_eq!(kind == "buy", price < 50.0);
        let recorded = store.get(execution.payload.string_field("id").unwrap()).unwrap();
        assert_eq!(recorded.kind, kind);
    }

    let reopened = TransactionStore::open(&store_path).unwrap();
    assert_eq!(reopened.len(), 5);
    let journal = ExecutionJournal::new(&journal_path).unwrap();
    assert_eq!(journal.query_metrics(None).success_count, 5);
}
