//! Job entity model.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use stint_core::config::worker::MAX_QUEUE_NAME_LEN;
use stint_core::error::AppError;
use stint_core::types::JobId;

use super::state::JobState;

/// Queue used when the producer does not name one.
pub const DEFAULT_QUEUE: &str = "default";

/// Priority assigned when the producer does not set one.
pub const DEFAULT_PRIORITY: i16 = 0;

/// A persisted unit of work.
///
/// Rows are created by [`NewJob`] and afterwards only change through the
/// store's conditional claim, renew, finish and reschedule updates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Job {
    /// Unique job identifier.
    pub id: JobId,
    /// Logical queue a worker subscribes to.
    pub queue_name: String,
    /// Higher values are dequeued first.
    pub priority: i16,
    /// The job framework's serialized invocation.
    pub payload: serde_json::Value,
    /// Earliest time the job may run.
    pub scheduled_at: DateTime<Utc>,
    /// When the current claim was taken.
    pub started_at: Option<DateTime<Utc>>,
    /// When execution completed.
    pub finished_at: Option<DateTime<Utc>>,
    /// After this instant the job never runs.
    pub expires_at: Option<DateTime<Utc>>,
    /// Worker task holding the claim.
    pub owner: Option<String>,
    /// Lease expiry of the current claim.
    pub lock_expires_at: Option<DateTime<Utc>>,
}

impl Job {
    /// Framework-level job identifier carried in the payload, for logging.
    pub fn job_id(&self) -> Option<&str> {
        self.payload.get("job_id").and_then(|v| v.as_str())
    }

    /// Framework-level job class carried in the payload.
    pub fn job_class(&self) -> Option<&str> {
        self.payload.get("job_class").and_then(|v| v.as_str())
    }

    /// Lifecycle state of this row as of `now`.
    pub fn state(&self, now: DateTime<Utc>) -> JobState {
        JobState::of(self, now)
    }

    /// Whether the row is claimable at `now`.
    pub fn is_pending(&self, now: DateTime<Utc>) -> bool {
        self.state(now) == JobState::Pending
    }
}

/// Data required to create a new job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewJob {
    /// Queue name.
    pub queue_name: String,
    /// Priority, higher first.
    pub priority: i16,
    /// Serialized invocation.
    pub payload: serde_json::Value,
    /// Run no earlier than this; defaults to the enqueue time.
    pub scheduled_at: Option<DateTime<Utc>>,
    /// Time-to-live counted from `scheduled_at`.
    pub ttl: Option<Duration>,
}

impl NewJob {
    /// A job for `queue_name` with default priority, scheduled now.
    pub fn new(queue_name: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            queue_name: queue_name.into(),
            priority: DEFAULT_PRIORITY,
            payload,
            scheduled_at: None,
            ttl: None,
        }
    }

    /// Set the priority.
    pub fn priority(mut self, priority: i16) -> Self {
        self.priority = priority;
        self
    }

    /// Delay the job until `at`.
    pub fn scheduled_at(mut self, at: DateTime<Utc>) -> Self {
        self.scheduled_at = Some(at);
        self
    }

    /// Expire the job `ttl` after its scheduled time.
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    /// Check producer-supplied fields.
    pub fn validate(&self) -> Result<(), AppError> {
        if self.queue_name.is_empty() || self.queue_name.len() > MAX_QUEUE_NAME_LEN {
            return Err(AppError::validation(format!(
                "Invalid queue name '{}': must be 1-{MAX_QUEUE_NAME_LEN} characters",
                self.queue_name
            )));
        }
        if let Some(ttl) = self.ttl {
            if ttl <= Duration::zero() {
                return Err(AppError::validation("Job ttl must be positive"));
            }
        }
        Ok(())
    }

    /// Materialize the row inserted at `now`.
    ///
    /// `scheduled_at` defaults to `now`; `expires_at` is `scheduled_at + ttl`.
    pub fn into_job(self, now: DateTime<Utc>) -> Job {
        let scheduled_at = self.scheduled_at.unwrap_or(now);
        Job {
            id: JobId::new(),
            queue_name: self.queue_name,
            priority: self.priority,
            payload: self.payload,
            scheduled_at,
            started_at: None,
            finished_at: None,
            expires_at: self.ttl.map(|ttl| scheduled_at + ttl),
            owner: None,
            lock_expires_at: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_into_job_defaults() {
        let now = Utc::now();
        let job = NewJob::new("mailers", json!({"job_id": "abc"})).into_job(now);

        assert_eq!(job.queue_name, "mailers");
        assert_eq!(job.priority, DEFAULT_PRIORITY);
        assert_eq!(job.scheduled_at, now);
        assert!(job.expires_at.is_none());
        assert!(job.owner.is_none());
        assert_eq!(job.job_id(), Some("abc"));
    }

    #[test]
    fn test_expiry_counts_from_schedule() {
        let now = Utc::now();
        let at = now + Duration::hours(1);
        let job = NewJob::new(DEFAULT_QUEUE, json!({}))
            .scheduled_at(at)
            .ttl(Duration::minutes(5))
            .into_job(now);

        assert_eq!(job.scheduled_at, at);
        assert_eq!(job.expires_at, Some(at + Duration::minutes(5)));
    }

    #[test]
    fn test_validate() {
        assert!(NewJob::new("", json!({})).validate().is_err());
        assert!(NewJob::new("q".repeat(51), json!({})).validate().is_err());
        assert!(
            NewJob::new("ok", json!({}))
                .ttl(Duration::zero())
                .validate()
                .is_err()
        );
        NewJob::new("ok", json!({})).priority(8).validate().unwrap();
    }
}
