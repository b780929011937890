//! Transaction record persisted by RecordTransaction

use crate::error::TaskError;
use crate::models::payload::ExecutionPayload;
use serde::{Deserialize, Serialize};

/// One recorded trade, keyed by `Id`.
///
/// Attribute names match the transaction table layout, and every value is a
/// string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TransactionRecord {
    pub id: String,
    /// "buy" or "sell"
    #[serde(rename = "Type")]
    pub kind: String,
    pub price: String,
    pub quantity: String,
    pub timestamp: String,
}

impl TransactionRecord {
    /// Build a record from the payload fields written by BuyStock/SellStock.
    ///
    /// Payload keys: `id`, `type`, `price`, `qty`, `timestamp`.
    pub fn from_payload(payload: &ExecutionPayload) -> Result<Self, TaskError> {
        Ok(Self {
            id: payload.string_field("id")?.to_string(),
            kind: payload.string_field("type")?.to_string(),
            price: payload.string_field("price")?.to_string(),
            quantity: payload.string_field("qty")?.to_string(),
            timestamp: payload.string_field("timestamp")?.to_string(),
        })
    }
}
