//! Per-queue job counts.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Job counts for one queue, bucketed by [`JobState`](super::JobState).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct QueueStats {
    /// Queue name.
    pub queue_name: String,
    /// Claimable now.
    pub pending: i64,
    /// Waiting for their scheduled time.
    pub scheduled: i64,
    /// Claimed under a valid lease.
    pub running: i64,
    /// Completed.
    pub finished: i64,
    /// Expired before running to completion.
    pub expired: i64,
}

impl QueueStats {
    /// Jobs that may still run.
    pub fn outstanding(&self) -> i64 {
        self.pending + self.scheduled + self.running
    }
}
