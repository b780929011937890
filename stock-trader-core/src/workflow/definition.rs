//! The stock trading state graph

use crate::error::{TaskError, TASK_FAILED};
use crate::models::payload::{ExecutionPayload, STOCK_PRICE};
use crate::models::workflow::{RetrySpec, StateName};
use crate::workflow::tasks::Operation;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

pub const WORKFLOW_NAME: &str = "StockTradingStateMachine";

/// Prices strictly below this buy; everything else sells
pub const BUY_THRESHOLD: f64 = 50.0;

/// Outcome of the BuyOrSell choice
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Branch {
    Buy,
    Sell,
}

/// Pure choice rule: `payload[variable] < less_than` buys, anything else
/// sells. The stock graph routes on `stock_price < 50`.
///
/// A missing or non-numeric variable is a runtime error, never retried.
pub fn choose_branch(
    payload: &ExecutionPayload,
    variable: &str,
    less_than: f64,
) -> Result<Branch, TaskError> {
    let value = payload.number_field(variable).ok_or_else(|| {
        TaskError::runtime(format!("choice requires a numeric '{}' field", variable))
    })?;

    if value < less_than {
        Ok(Branch::Buy)
    } else {
        Ok(Branch::Sell)
    }
}

/// What a state does when entered
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum StateKind {
    /// Invoke an external operation, merge its result, move on
    Task {
        operation: Operation,
        next: StateName,
    },
    /// Route on `variable < less_than`
    Choice {
        variable: &'static str,
        less_than: f64,
        then: StateName,
        otherwise: StateName,
    },
    /// Write the transaction record and end the execution
    Record,
}

#[derive(Debug, Clone, Serialize)]
pub struct StateDefinition {
    #[serde(flatten)]
    pub kind: StateKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry: Option<RetrySpec>,
}

/// Fixed five-state workflow with per-state retry specs
#[derive(Debug, Clone, Serialize)]
pub struct WorkflowDefinition {
    name: String,
    initial_state: StateName,
    states: BTreeMap<StateName, StateDefinition>,
}

impl WorkflowDefinition {
    /// CheckStockValue → BuyOrSell → {BuyStock | SellStock} → RecordTransaction
    pub fn stock_trading() -> Self {
        let mut states = BTreeMap::new();
        states.insert(
            StateName::CheckStockValue,
            StateDefinition {
                kind: StateKind::Task {
                    operation: Operation::CheckPrice,
                    next: StateName::BuyOrSell,
                },
                retry: Some(task_failed_spec(Duration::from_secs(15), 5, 1.5)),
            },
        );
        states.insert(
            StateName::BuyOrSell,
            StateDefinition {
                kind: StateKind::Choice {
                    variable: STOCK_PRICE,
                    less_than: BUY_THRESHOLD,
                    then: StateName::BuyStock,
                    otherwise: StateName::SellStock,
                },
                retry: None,
            },
        );
        states.insert(
            StateName::BuyStock,
            StateDefinition {
                kind: StateKind::Task {
                    operation: Operation::BuyStock,
                    next: StateName::RecordTransaction,
                },
                retry: Some(task_failed_spec(Duration::from_secs(2), 3, 1.0)),
            },
        );
        states.insert(
            StateName::SellStock,
            StateDefinition {
                kind: StateKind::Task {
                    operation: Operation::SellStock,
                    next: StateName::RecordTransaction,
                },
                retry: Some(task_failed_spec(Duration::from_secs(2), 3, 1.0)),
            },
        );
        states.insert(
            StateName::RecordTransaction,
            StateDefinition {
                kind: StateKind::Record,
                retry: Some(task_failed_spec(Duration::from_secs(20), 5, 10.0)),
            },
        );

        Self {
            name: WORKFLOW_NAME.to_string(),
            initial_state: StateName::CheckStockValue,
            states,
        }
    }

    /// Replace the retry spec of a task state. Choice states never retry, so
    /// the call is ignored for BuyOrSell.
    pub fn with_retry(mut self, state: StateName, spec: RetrySpec) -> Self {
        if let Some(def) = self.states.get_mut(&state) {
            if !matches!(def.kind, StateKind::Choice { .. }) {
                def.retry = Some(spec);
            }
        }
        self
    }

    /// Move the BuyOrSell threshold
    pub fn with_buy_threshold(mut self, less_than: f64) -> Self {
        for def in self.states.values_mut() {
            if let StateKind::Choice {
                less_than: threshold,
                ..
            } = &mut def.kind
            {
                *threshold = less_than;
            }
        }
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn initial_state(&self) -> StateName {
        self.initial_state
    }

    pub fn state(&self, state: StateName) -> Option<&StateDefinition> {
        self.states.get(&state)
    }

    pub fn retry_spec(&self, state: StateName) -> Option<&RetrySpec> {
        self.states.get(&state).and_then(|def| def.retry.as_ref())
    }

    /// JSON rendering of the graph for operational output
    pub fn describe(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

fn task_failed_spec(initial_interval: Duration, max_attempts: u32, backoff_rate: f64) -> RetrySpec {
    RetrySpec {
        error_classes: BTreeSet::from([TASK_FAILED.to_string()]),
        initial_interval,
        max_attempts,
        backoff_rate,
    }
}
