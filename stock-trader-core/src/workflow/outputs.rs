//! Observable identifiers of a deployed workflow

use crate::workflow::definition::WorkflowDefinition;
use crate::workflow::tasks::{Operation, TransactionRecorder};
use serde::Serialize;
use serde_json::Value;

/// Names an operator needs to find the moving parts. Informational only;
/// nothing in the engine reads them back.
#[derive(Debug, Clone, Serialize)]
pub struct WorkflowOutputs {
    pub check_price_operation: String,
    pub buy_stock_operation: String,
    pub sell_stock_operation: String,
    pub workflow_name: String,
    pub workflow_definition: Value,
    pub transaction_store: String,
}

impl WorkflowOutputs {
    pub fn new(definition: &WorkflowDefinition, recorder: &dyn TransactionRecorder) -> Self {
        Self {
            check_price_operation: Operation::CheckPrice.name().to_string(),
            buy_stock_operation: Operation::BuyStock.name().to_string(),
            sell_stock_operation: Operation::SellStock.name().to_string(),
            workflow_name: definition.name().to_string(),
            workflow_definition: definition.describe(),
            transaction_store: recorder.store_name(),
        }
    }

    /// Label/value pairs for plain-text output
    pub fn entries(&self) -> Vec<(&'static str, &str)> {
        vec![
            ("Check Stock Operation", self.check_price_operation.as_str()),
            ("Buy Stock Operation", self.buy_stock_operation.as_str()),
            ("Sell Stock Operation", self.sell_stock_operation.as_str()),
            ("Stock Trading Workflow", self.workflow_name.as_str()),
            ("Transaction Store", self.transaction_store.as_str()),
        ]
    }
}
