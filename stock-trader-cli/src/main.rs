mod cli;

use anyhow::Result;
use clap::{Parser, Subcommand};
use cli::handlers;
use std::path::PathBuf;
use stock_trader_core::models::Configuration;
use stock_trader_core::services::init_logging;

#[derive(Parser, Debug)]
#[command(name = "stock-trader")]
#[command(version)]
#[command(about = "Scheduled stock trading workflow with per-step retry")]
#[command(
    help_template = "{name} - {version}\n{about}\n\n{usage-heading}\n  {usage}\n\n{all-args}{options}\n"
)]
struct Cli {
    /// Path to configuration file (default: <config dir>/stock-trader/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run one workflow execution to completion
    ///
    /// Examples:
    ///   stock-trader run
    ///   stock-trader run --json
    Run {
        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Start one execution on every cadence tick until Ctrl-C
    ///
    /// Ticks never wait for earlier executions. On shutdown the scheduler
    /// stops ticking and waits for executions still in flight.
    ///
    /// Examples:
    ///   stock-trader schedule
    ///   stock-trader schedule --cron "*/5 * * * *" --ticks 3
    Schedule {
        /// Cron expression overriding the configured schedule
        #[arg(long)]
        cron: Option<String>,

        /// Stop after this many ticks
        #[arg(long)]
        ticks: Option<usize>,
    },

    /// Show operation names, workflow definition and transaction store
    Describe {
        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// List recorded transactions
    Transactions {
        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Show journaled executions and metrics
    History {
        /// Filter by workflow name
        #[arg(long)]
        workflow: Option<String>,

        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Show one execution and its state transitions
    Status {
        /// Execution ID
        execution_id: String,

        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Write a configuration file
    Config {
        /// Create the configuration file with defaults
        #[arg(long)]
        init: bool,

        /// Path to configuration file (defaults to --config)
        #[arg(long)]
        config_file: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_path = match cli.config {
        Some(path) => path,
        None => Configuration::default_config_path()?,
    };
    let config = Configuration::load_from_file(&config_path)?;

    if let Err(e) = init_logging(config.log_level) {
        eprintln!("Warning: failed to initialize logging: {}", e);
    }
    tracing::debug!(config = %config_path.display(), "Loaded configuration");

    match cli.command {
        Commands::Run { json } => {
            handlers::handle_run(&config, json).await?;
        }
        Commands::Schedule { cron, ticks } => {
            handlers::handle_schedule(&config, cron, ticks).await?;
        }
        Commands::Describe { json } => {
            handlers::handle_describe(&config, json).await?;
        }
        Commands::Transactions { json } => {
            handlers::handle_transactions(&config, json).await?;
        }
        Commands::History { workflow, json } => {
            handlers::handle_history(&config, workflow, json).await?;
        }
        Commands::Status { execution_id, json } => {
            handlers::handle_status(&config, execution_id, json).await?;
        }
        Commands::Config { init, config_file } => {
            if init {
                handlers::handle_config_init(config_file.unwrap_or(config_path)).await?;
            } else {
                println!("Config command requires --init flag");
                println!("Usage: stock-trader config --init [--config-file PATH]");
            }
        }
    }

    Ok(())
}
