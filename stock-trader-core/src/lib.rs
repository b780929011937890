//! # Stock Trader Core Library
//!
//! Workflow orchestration for the scheduled stock trader: a five-state
//! workflow with per-step retry, a cadence-driven scheduler, and the
//! collaborator seams for price checks, trades and transaction recording.

pub mod error;
pub mod models;
pub mod services;
pub mod workflow;
