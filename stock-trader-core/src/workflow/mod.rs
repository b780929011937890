//! Workflow orchestration module

pub mod cadence;
pub mod clock;
pub mod definition;
pub mod engine;
pub mod market;
pub mod orchestrator;
pub mod outputs;
pub mod persistence;
pub mod retry;
pub mod scheduler;
pub mod store;
pub mod tasks;

pub use cadence::*;
pub use clock::*;
pub use definition::*;
pub use engine::*;
pub use market::*;
pub use orchestrator::*;
pub use outputs::*;
pub use persistence::*;
pub use retry::*;
pub use scheduler::*;
pub use store::*;
pub use tasks::*;
