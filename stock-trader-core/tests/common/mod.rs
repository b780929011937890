//! Scripted collaborators shared by the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use stock_trader_core::error::TaskError;
use stock_trader_core::models::{ExecutionPayload, TransactionRecord, WorkflowExecution};
use stock_trader_core::workflow::{
    ExecutionJournal, ManualClock, Operation, TaskInvoker, TransactionRecorder, TransactionStore,
    WorkflowDefinition, WorkflowEngine,
};
use tokio::sync::Barrier;
use uuid::Uuid;

/// Decrement `counter` if it is positive; true when it was
fn take(counter: &AtomicU32) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

/// Market with a fixed price and scripted failures
pub struct ScriptedMarket {
    price: Value,
    check_failures: AtomicU32,
    trade_failures: AtomicU32,
    drop_qty: bool,
    gate: Option<Arc<Barrier>>,
    calls: Mutex<Vec<Operation>>,
    trades: AtomicU32,
}

impl ScriptedMarket {
    pub fn priced(price: impl Into<Value>) -> Self {
        Self {
            price: price.into(),
            check_failures: AtomicU32::new(0),
            trade_failures: AtomicU32::new(0),
            drop_qty: false,
            gate: None,
            calls: Mutex::new(Vec::new()),
            trades: AtomicU32::new(0),
        }
    }

    /// First `n` CheckPrice calls fail with TaskFailed
    pub fn failing_checks(self, n: u32) -> Self {
        self.check_failures.store(n, Ordering::SeqCst);
        self
    }

    /// First `n` BuyStock/SellStock calls fail with TaskFailed
    pub fn failing_trades(self, n: u32) -> Self {
        self.trade_failures.store(n, Ordering::SeqCst);
        self
    }

    /// Trade results omit `qty`
    pub fn without_qty(mut self) -> Self {
        self.drop_qty = true;
        self
    }

    /// CheckPrice waits on `gate` before answering
    pub fn gated(mut self, gate: Arc<Barrier>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn calls(&self) -> Vec<Operation> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, operation: Operation) -> usize {
        self.calls().into_iter().filter(|op| *op == operation).count()
    }
}

#[async_trait]
impl TaskInvoker for ScriptedMarket {
    async fn invoke(
        &self,
        operation: Operation,
        payload: &ExecutionPayload,
    ) -> Result<Value, TaskError> {
        self.calls.lock().unwrap().push(operation);

        match operation {
            Operation::CheckPrice => {
                if let Some(gate) = &self.gate {
                    gate.wait().await;
                }
                if take(&self.check_failures) {
                    return Err(TaskError::task_failed("price feed unavailable"));
                }
                Ok(json!({ "stock_price": self.price }))
            }
            Operation::BuyStock | Operation::SellStock => {
                if take(&self.trade_failures) {
                    return Err(TaskError::task_failed("broker rejected order"));
                }
                let n = self.trades.fetch_add(1, Ordering::SeqCst) + 1;
                let kind = if operation == Operation::BuyStock {
                    "buy"
                } else {
                    "sell"
                };
                let price = payload
                    .get("stock_price")
                    .map(|v| v.to_string())
                    .unwrap_or_default();

                let mut result = json!({
                    "id": format!("trade-{}", n),
                    "type": kind,
                    "price": price,
                    "qty": "10",
                    "timestamp": format!("2024-01-01T00:00:{:02}.000Z", n % 60),
                });
                if self.drop_qty {
                    result.as_object_mut().unwrap().remove("qty");
                }
                Ok(result)
            }
        }
    }
}

/// Transaction store wrapper with scripted failures
pub struct RecordingStore {
    pub store: TransactionStore,
    put_calls: AtomicU32,
    failures: AtomicU32,
    lost_acks: AtomicU32,
}

impl RecordingStore {
    pub fn new() -> Self {
        Self {
            store: TransactionStore::in_memory(),
            put_calls: AtomicU32::new(0),
            failures: AtomicU32::new(0),
            lost_acks: AtomicU32::new(0),
        }
    }

    /// First `n` puts fail before writing
    pub fn failing(self, n: u32) -> Self {
        self.failures.store(n, Ordering::SeqCst);
        self
    }

    /// First `n` successful writes report TaskFailed anyway
    pub fn losing_acks(self, n: u32) -> Self {
        self.lost_acks.store(n, Ordering::SeqCst);
        self
    }

    pub fn put_calls(&self) -> u32 {
        self.put_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TransactionRecorder for RecordingStore {
    async fn put(&self, record: &TransactionRecord) -> Result<(), TaskError> {
        self.put_calls.fetch_add(1, Ordering::SeqCst);
        if take(&self.failures) {
            return Err(TaskError::task_failed("transaction table unavailable"));
        }
        self.store.put_record(record)?;
        if take(&self.lost_acks) {
            return Err(TaskError::task_failed("write acknowledgement lost"));
        }
        Ok(())
    }

    fn store_name(&self) -> String {
        "recording".to_string()
    }
}

pub fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 30).unwrap()
}

/// Engine wired to scripted collaborators and a virtual clock
pub struct Harness {
    pub engine: Arc<WorkflowEngine>,
    pub market: Arc<ScriptedMarket>,
    pub store: Arc<RecordingStore>,
    pub clock: ManualClock,
    pub journal: Arc<ExecutionJournal>,
}

impl Harness {
    pub fn new(market: ScriptedMarket, store: RecordingStore) -> Self {
        let market = Arc::new(market);
        let store = Arc::new(store);
        let clock = ManualClock::new(start_time());
        let journal = Arc::new(ExecutionJournal::in_memory());
        let engine = Arc::new(WorkflowEngine::new(
            WorkflowDefinition::stock_trading(),
            market.clone(),
            store.clone(),
            Arc::new(clock.clone()),
            journal.clone(),
        ));

        Self {
            engine,
            market,
            store,
            clock,
            journal,
        }
    }

    pub fn priced(price: impl Into<Value>) -> Self {
        Self::new(ScriptedMarket::priced(price), RecordingStore::new())
    }

    /// Run one execution with an empty payload
    pub async fn run(&self) -> WorkflowExecution {
        self.engine
            .execute(Uuid::new_v4(), ExecutionPayload::new(), "test")
            .await
    }
}
