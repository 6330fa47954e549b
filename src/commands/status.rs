//! Queue status command.

use clap::Args;
use serde::Serialize;
use tabled::Tabled;

use stint_core::config::AppConfig;
use stint_core::error::AppError;
use stint_entity::QueueStats;
use stint_worker::JobQueue;

use crate::output::{self, OutputFormat};

/// Arguments for the status command
#[derive(Debug, Args)]
pub struct StatusArgs {
    /// Queue to report; repeat for several. All queues when omitted.
    #[arg(short, long = "queue")]
    pub queues: Vec<String>,
}

/// Queue display row for table output
#[derive(Debug, Serialize, Tabled)]
struct QueueRow {
    /// Queue name
    queue: String,
    /// Claimable now
    pending: i64,
    /// Waiting for their time
    scheduled: i64,
    /// Claimed under a valid lease
    running: i64,
    /// Completed
    finished: i64,
    /// Expired unrun
    expired: i64,
}

impl From<QueueStats> for QueueRow {
    fn from(s: QueueStats) -> Self {
        Self {
            queue: s.queue_name,
            pending: s.pending,
            scheduled: s.scheduled,
            running: s.running,
            finished: s.finished,
            expired: s.expired,
        }
    }
}

/// Print per-queue job counts
pub async fn execute(
    args: &StatusArgs,
    config: &AppConfig,
    format: OutputFormat,
) -> Result<(), AppError> {
    let pool = super::connect(config).await?;
    let result = JobQueue::new(pool.job_store()).stats(&args.queues).await;
    pool.close().await;

    let rows: Vec<QueueRow> = result?.into_iter().map(QueueRow::from).collect();
    output::print_list(&rows, format);
    Ok(())
}
