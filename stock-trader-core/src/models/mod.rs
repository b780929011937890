//! Data models for the stock trader

pub mod configuration;
pub mod payload;
pub mod transaction;
pub mod workflow;

pub use configuration::*;
pub use payload::*;
pub use transaction::*;
pub use workflow::*;
