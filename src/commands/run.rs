//! Worker command.

use std::sync::Arc;

use async_trait::async_trait;
use clap::Args;
use tokio::sync::watch;

use stint_core::config::AppConfig;
use stint_core::error::AppError;
use stint_database::run_migrations;
use stint_entity::Job;
use stint_worker::{JobHandler, JobRegistry, WorkerRunner};

/// Arguments for the run command
#[derive(Debug, Args)]
pub struct RunArgs {
    /// Queue to watch; repeat for several. Overrides `worker.queues`.
    #[arg(short, long = "queue")]
    pub queues: Vec<String>,

    /// Number of jobs processed concurrently. Overrides `worker.concurrency`.
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Apply pending migrations before starting
    #[arg(long)]
    pub migrate: bool,

    /// Append logs to this file. Overrides `logging.file`.
    #[arg(short = 'L', long, value_name = "PATH")]
    pub logfile: Option<String>,
}

impl RunArgs {
    /// Fold command-line overrides into the loaded configuration.
    pub fn apply(&self, config: &mut AppConfig) {
        if !self.queues.is_empty() {
            config.worker.queues = self.queues.clone();
        }
        if let Some(concurrency) = self.concurrency {
            config.worker.concurrency = concurrency;
        }
        if let Some(path) = &self.logfile {
            config.logging.file = Some(path.clone());
        }
    }
}

/// Handler for jobs no application handler is registered for.
///
/// The standalone binary has no application code linked in, so it logs
/// each payload and reports success.
#[derive(Debug)]
struct LogHandler;

#[async_trait]
impl JobHandler for LogHandler {
    async fn execute(&self, job: &Job) -> anyhow::Result<()> {
        tracing::info!(
            job_id = %job.id,
            job_class = job.job_class().unwrap_or("-"),
            payload = %job.payload,
            "Received job"
        );
        Ok(())
    }
}

/// Run a worker until a shutdown signal arrives.
///
/// Expects `config` to carry the overrides from [`RunArgs::apply`].
pub async fn execute(args: &RunArgs, config: AppConfig) -> Result<(), AppError> {
    config.worker.validate()?;

    tracing::info!("Starting Stint worker v{}", env!("CARGO_PKG_VERSION"));
    let pool = super::connect(&config).await?;
    if args.migrate {
        run_migrations(&pool).await?;
    }

    let registry = JobRegistry::new().with_fallback(Arc::new(LogHandler));
    let runner = WorkerRunner::new(pool.job_store(), Arc::new(registry), config.worker.clone())?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        tracing::info!("Shutdown signal received, starting graceful shutdown...");
        let _ = shutdown_tx.send(true);
    });

    let result = runner.run(shutdown_rx).await;
    pool.close().await;
    result
}

/// Resolve on Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(queues: &[&str], concurrency: Option<usize>, logfile: Option<&str>) -> RunArgs {
        RunArgs {
            queues: queues.iter().map(|q| q.to_string()).collect(),
            concurrency,
            migrate: false,
            logfile: logfile.map(str::to_string),
        }
    }

    #[test]
    fn test_apply_overrides_config() {
        let mut config = AppConfig::for_database("sqlite::memory:");
        args(&["mailers"], Some(3), Some("/var/log/stint.log")).apply(&mut config);

        assert_eq!(config.worker.queues, vec!["mailers"]);
        assert_eq!(config.worker.concurrency, 3);
        assert_eq!(config.logging.file.as_deref(), Some("/var/log/stint.log"));
    }

    #[test]
    fn test_apply_keeps_config_without_flags() {
        let mut config = AppConfig::for_database("sqlite::memory:");
        config.logging.file = Some("from-config.log".to_string());
        args(&[], None, None).apply(&mut config);

        assert_eq!(config.worker.queues, vec!["default"]);
        assert_eq!(config.worker.concurrency, 10);
        assert_eq!(config.logging.file.as_deref(), Some("from-config.log"));
    }
}
