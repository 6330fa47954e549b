//! CLI command definitions and dispatch.

pub mod enqueue;
pub mod migrate;
pub mod run;
pub mod status;

use clap::{Parser, Subcommand};

use stint_core::config::AppConfig;
use stint_core::error::AppError;
use stint_database::DatabasePool;

use crate::logging;
use crate::output::OutputFormat;

/// Stint: a durable job queue backed by PostgreSQL or SQLite
#[derive(Debug, Parser)]
#[command(name = "stint", version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/default.toml")]
    pub config: String,

    /// Output format
    #[arg(short, long, value_enum, default_value = "table")]
    pub format: OutputFormat,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level commands
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Start a worker and process jobs until SIGINT/SIGTERM
    Run(run::RunArgs),
    /// Apply pending database migrations
    Migrate,
    /// Enqueue a job
    Enqueue(enqueue::EnqueueArgs),
    /// Show per-queue job counts
    Status(status::StatusArgs),
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(&self) -> Result<(), AppError> {
        let mut config = AppConfig::load(&self.config)?;
        if let Commands::Run(args) = &self.command {
            args.apply(&mut config);
        }
        logging::init(&config.logging)?;

        match &self.command {
            Commands::Run(args) => run::execute(args, config).await,
            Commands::Migrate => migrate::execute(&config).await,
            Commands::Enqueue(args) => enqueue::execute(args, &config, self.format).await,
            Commands::Status(args) => status::execute(args, &config, self.format).await,
        }
    }
}

/// Helper: open the configured database
pub async fn connect(config: &AppConfig) -> Result<DatabasePool, AppError> {
    DatabasePool::connect(&config.database).await
}
