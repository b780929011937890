//! Simulated market backing CheckPrice, BuyStock and SellStock.
//!
//! Prices are uniformly random integers; trades get a fresh UUID and a random
//! quantity. Nothing here talks to a real exchange.

use crate::error::TaskError;
use crate::models::payload::{ExecutionPayload, STOCK_PRICE};
use crate::workflow::tasks::{Operation, TaskInvoker};
use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use rand::Rng;
use serde_json::{json, Value};
use uuid::Uuid;

const MAX_QUANTITY: u32 = 100;

pub struct SimulatedMarket {
    min_price: u32,
    max_price: u32,
}

impl SimulatedMarket {
    /// Market quoting prices in `[min_price, max_price]`
    pub fn new(min_price: u32, max_price: u32) -> Self {
        let (min_price, max_price) = if min_price <= max_price {
            (min_price, max_price)
        } else {
            (max_price, min_price)
        };
        Self {
            min_price,
            max_price,
        }
    }

    fn check_price(&self) -> Value {
        let price = rand::thread_rng().gen_range(self.min_price..=self.max_price);
        json!({ STOCK_PRICE: price })
    }

    fn trade(&self, kind: &str, payload: &ExecutionPayload) -> Result<Value, TaskError> {
        let price = payload
            .get(STOCK_PRICE)
            .filter(|value| value.is_number())
            .ok_or_else(|| TaskError::task_failed("payload has no numeric stock_price"))?;
        let qty = rand::thread_rng().gen_range(1..=MAX_QUANTITY);

        Ok(json!({
            "id": Uuid::new_v4().to_string(),
            "type": kind,
            "price": price.to_string(),
            "qty": qty.to_string(),
            "timestamp": Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        }))
    }
}

impl Default for SimulatedMarket {
    fn default() -> Self {
        Self::new(0, 100)
    }
}

#[async_trait]
impl TaskInvoker for SimulatedMarket {
    async fn invoke(
        &self,
        operation: Operation,
        payload: &ExecutionPayload,
    ) -> Result<Value, TaskError> {
        let result = match operation {
            Operation::CheckPrice => Ok(self.check_price()),
            Operation::BuyStock => self.trade("buy", payload),
            Operation::SellStock => self.trade("sell", payload),
        };
        tracing::debug!(operation = %operation, ok = result.is_ok(), "Simulated market call");
        result
    }
}
