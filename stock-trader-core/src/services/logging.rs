//! Logging service

use crate::models::LogLevel;
use tracing_subscriber::EnvFilter;

/// Filter directive for `level` across the library and the binary
pub fn default_filter(level: LogLevel) -> String {
    let level = level.as_str();
    format!("stock_trader_core={level},stock_trader={level}")
}

/// Initialize logging with the specified level.
///
/// `RUST_LOG` wins when set. Output goes to stderr so `--json` output on
/// stdout stays machine readable.
pub fn init_logging(level: LogLevel) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_filter(level)))?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
}
