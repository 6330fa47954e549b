//! Producer-side facade for enqueuing jobs.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};

use stint_core::result::AppResult;
use stint_core::types::JobId;
use stint_database::JobStore;
use stint_entity::{Job, NewJob, QueueStats};

/// Job queue for enqueuing work and inspecting queue depth.
#[derive(Debug, Clone)]
pub struct JobQueue {
    store: Arc<dyn JobStore>,
}

impl JobQueue {
    /// Create a new job queue over `store`.
    pub fn new(store: Arc<dyn JobStore>) -> Self {
        Self { store }
    }

    /// Enqueue a new job.
    pub async fn enqueue(&self, job: NewJob) -> AppResult<Job> {
        let job = self.store.enqueue(&job).await?;

        tracing::debug!(
            job_id = %job.id,
            job_class = job.job_class().unwrap_or("-"),
            queue = %job.queue_name,
            priority = job.priority,
            scheduled_at = %job.scheduled_at,
            "Enqueued job"
        );

        Ok(job)
    }

    /// Enqueue `payload` and return the new record's id.
    ///
    /// `scheduled_at` defaults to now; with a `ttl` the job expires that
    /// long after its scheduled time.
    pub async fn push(
        &self,
        payload: serde_json::Value,
        queue_name: &str,
        priority: i16,
        scheduled_at: Option<DateTime<Utc>>,
        ttl: Option<Duration>,
    ) -> AppResult<JobId> {
        let mut job = NewJob::new(queue_name, payload).priority(priority);
        job.scheduled_at = scheduled_at;
        job.ttl = ttl;
        Ok(self.enqueue(job).await?.id)
    }

    /// Find a job by ID.
    pub async fn find(&self, id: JobId) -> AppResult<Option<Job>> {
        self.store.find(id).await
    }

    /// Per-queue counts right now. An empty slice means all queues.
    pub async fn stats(&self, queues: &[String]) -> AppResult<Vec<QueueStats>> {
        self.store.stats(queues, Utc::now()).await
    }
}
