//! Collaborator seams: task invocation and transaction recording

use crate::error::TaskError;
use crate::models::payload::{ExecutionPayload, STOCK_PRICE};
use crate::models::transaction::TransactionRecord;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// External operations the workflow invokes
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Operation {
    CheckPrice,
    BuyStock,
    SellStock,
}

impl Operation {
    pub const ALL: [Operation; 3] = [
        Operation::CheckPrice,
        Operation::BuyStock,
        Operation::SellStock,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Operation::CheckPrice => "CheckPrice",
            Operation::BuyStock => "BuyStock",
            Operation::SellStock => "SellStock",
        }
    }

    /// Fields a successful result must contain
    pub fn required_outputs(&self) -> &'static [&'static str] {
        match self {
            Operation::CheckPrice => &[STOCK_PRICE],
            Operation::BuyStock | Operation::SellStock => {
                &["id", "type", "price", "qty", "timestamp"]
            }
        }
    }

    /// Check a task result against the operation's output contract
    pub fn check_output(&self, result: &Value) -> Result<(), TaskError> {
        let fields = result.as_object().ok_or_else(|| {
            TaskError::runtime(format!("{} must return a JSON object", self.name()))
        })?;

        let missing: Vec<&str> = self
            .required_outputs()
            .iter()
            .copied()
            .filter(|key| !fields.contains_key(*key))
            .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(TaskError::runtime(format!(
                "{} result is missing field(s): {}",
                self.name(),
                missing.join(", ")
            )))
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Invokes one of the named external operations.
///
/// Implementations are stateless with respect to executions: everything an
/// operation needs arrives in the payload.
#[async_trait]
pub trait TaskInvoker: Send + Sync {
    async fn invoke(
        &self,
        operation: Operation,
        payload: &ExecutionPayload,
    ) -> Result<Value, TaskError>;
}

/// Appends transaction records to a durable store keyed by `Id`.
///
/// `put` must be idempotent per Id so a retried write never duplicates a
/// record.
#[async_trait]
pub trait TransactionRecorder: Send + Sync {
    async fn put(&self, record: &TransactionRecord) -> Result<(), TaskError>;

    /// Name of the backing store, for operational output
    fn store_name(&self) -> String;
}
