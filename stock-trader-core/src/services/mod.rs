//! Process-level services

pub mod logging;

pub use logging::*;
