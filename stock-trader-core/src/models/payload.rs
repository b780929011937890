//! Execution payload threaded between workflow states

use crate::error::TaskError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Field written by CheckPrice and read by the BuyOrSell choice
pub const STOCK_PRICE: &str = "stock_price";

/// JSON object carried through one execution.
///
/// The engine enforces no schema; each step contract decides which keys it
/// reads and writes. Task results are merged in, so fields accumulate as the
/// execution advances.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExecutionPayload(Map<String, Value>);

impl ExecutionPayload {
    /// Create an empty payload (what every scheduled execution starts with)
    pub fn new() -> Self {
        Self(Map::new())
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Merge a task result into the payload, overwriting existing keys.
    ///
    /// Only JSON objects can be merged; anything else violates the task
    /// contract.
    pub fn merge(&mut self, result: Value) -> Result<(), TaskError> {
        match result {
            Value::Object(fields) => {
                for (key, value) in fields {
                    self.0.insert(key, value);
                }
                Ok(())
            }
            other => Err(TaskError::runtime(format!(
                "task result must be a JSON object, got {}",
                json_type_name(&other)
            ))),
        }
    }

    /// Numeric stock price, if present
    pub fn stock_price(&self) -> Option<f64> {
        self.number_field(STOCK_PRICE)
    }

    /// Numeric field, if present
    pub fn number_field(&self, key: &str) -> Option<f64> {
        self.0.get(key).and_then(Value::as_f64)
    }

    /// Read a required string field
    pub fn string_field(&self, key: &str) -> Result<&str, TaskError> {
        match self.0.get(key) {
            Some(Value::String(s)) => Ok(s),
            Some(other) => Err(TaskError::runtime(format!(
                "field '{}' must be a string, got {}",
                key,
                json_type_name(other)
            ))),
            None => Err(TaskError::runtime(format!("field '{}' is missing", key))),
        }
    }

    pub fn to_value(&self) -> Value {
        Value::Object(self.0.clone())
    }
}

impl From<Map<String, Value>> for ExecutionPayload {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
