//! Execution events: one per job execution attempt.

use std::time::Duration;

use serde::Serialize;

use stint_core::types::{JobId, WorkerId};

/// Result of one execution attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum JobOutcome {
    /// The handler returned `Ok`.
    Succeeded,
    /// The handler returned an error. The job was still finished.
    Failed {
        /// Rendered error chain.
        error: String,
    },
    /// The worker was shutting down; the job was returned to pending.
    Released,
}

/// Notification emitted after a job execution attempt.
#[derive(Debug, Clone, Serialize)]
pub struct JobEvent {
    pub job_id: JobId,
    /// `payload["job_class"]`, when present.
    pub job_class: Option<String>,
    pub queue_name: String,
    pub worker_id: WorkerId,
    /// Task sub-identity within the worker.
    pub task_id: u64,
    pub outcome: JobOutcome,
    /// Time from claim to outcome.
    pub duration: Duration,
}

impl JobEvent {
    /// Log the event.
    pub fn trace(&self) {
        let duration_ms = self.duration.as_millis() as u64;
        let job_class = self.job_class.as_deref().unwrap_or("-");
        match &self.outcome {
            JobOutcome::Succeeded => tracing::info!(
                job_id = %self.job_id,
                job_class,
                queue = %self.queue_name,
                worker_id = %self.worker_id,
                task_id = self.task_id,
                duration_ms,
                "Job succeeded"
            ),
            JobOutcome::Failed { error } => tracing::warn!(
                job_id = %self.job_id,
                job_class,
                queue = %self.queue_name,
                worker_id = %self.worker_id,
                task_id = self.task_id,
                duration_ms,
                error = %error,
                "Job failed"
            ),
            JobOutcome::Released => tracing::info!(
                job_id = %self.job_id,
                job_class,
                queue = %self.queue_name,
                worker_id = %self.worker_id,
                task_id = self.task_id,
                "Job released on shutdown"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_serializes_with_status_tag() {
        let failed = JobOutcome::Failed {
            error: "boom".into(),
        };
        assert_eq!(
            serde_json::to_value(&failed).unwrap(),
            serde_json::json!({"status": "failed", "error": "boom"})
        );
        assert_eq!(
            serde_json::to_value(JobOutcome::Released).unwrap(),
            serde_json::json!({"status": "released"})
        );
    }
}
