//! Claim guard tying a claimed job to its lease heartbeat.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use stint_core::error::AppError;
use stint_core::result::AppResult;
use stint_database::JobStore;
use stint_entity::Job;

use crate::heartbeat::{Heartbeat, HeartbeatError, HeartbeatRegistry, Lease};

/// Failure to take a claim.
#[derive(Debug, thiserror::Error)]
pub enum ClaimError {
    /// The store failed; the job is reconsidered on a later poll.
    #[error(transparent)]
    Store(#[from] AppError),

    /// The claim succeeded but its heartbeat could not be armed.
    #[error(transparent)]
    Heartbeat(#[from] HeartbeatError),
}

impl From<ClaimError> for AppError {
    fn from(err: ClaimError) -> Self {
        match err {
            ClaimError::Store(e) => e,
            ClaimError::Heartbeat(e) => e.into(),
        }
    }
}

/// A job claimed by one worker task.
///
/// Consumed by [`Claim::finish`] or [`Claim::release`], both of which stop
/// the heartbeat before touching the row. A claim dropped without either
/// aborts its heartbeat and leaves the row to lease expiry or the
/// worker's shutdown sweep.
#[derive(Debug)]
pub struct Claim {
    job: Job,
    owner: String,
    store: Arc<dyn JobStore>,
    heartbeat: Option<Heartbeat>,
}

impl Claim {
    /// Try to claim `job` for `owner`.
    ///
    /// Returns `Ok(None)` when the job is no longer pending (lost race,
    /// finished, expired, or a serialization conflict).
    pub async fn acquire(
        store: Arc<dyn JobStore>,
        heartbeats: &HeartbeatRegistry,
        mut job: Job,
        owner: String,
        lease: Option<Lease>,
    ) -> Result<Option<Self>, ClaimError> {
        let now = Utc::now();
        let lease_duration = lease.map(|l| l.duration());
        if !store.claim(job.id, &owner, now, lease_duration).await? {
            return Ok(None);
        }

        job.started_at = Some(now);
        job.owner = Some(owner.clone());
        job.lock_expires_at = lease_duration.map(|d| now + d);

        let heartbeat = match lease {
            Some(lease) => Some(heartbeats.arm(store.clone(), job.id, owner.clone(), lease)?),
            None => None,
        };

        Ok(Some(Self {
            job,
            owner,
            store,
            heartbeat,
        }))
    }

    /// The claimed job as of the claim.
    pub fn job(&self) -> &Job {
        &self.job
    }

    /// Owner identity holding the claim.
    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Whether a heartbeat is renewing this claim's lease.
    pub fn has_heartbeat(&self) -> bool {
        self.heartbeat.as_ref().is_some_and(Heartbeat::is_active)
    }

    /// Mark the job finished at `now`.
    ///
    /// `Ok(false)` means the claim had already been lost.
    pub async fn finish(mut self, now: DateTime<Utc>) -> AppResult<bool> {
        self.stop_heartbeat().await;
        self.store.finish(self.job.id, &self.owner, now).await
    }

    /// Return the job to pending, eligible again at `at`.
    pub async fn release(mut self, at: DateTime<Utc>) -> AppResult<bool> {
        self.stop_heartbeat().await;
        self.store.reschedule(self.job.id, &self.owner, at).await
    }

    async fn stop_heartbeat(&mut self) {
        if let Some(heartbeat) = self.heartbeat.take() {
            heartbeat.stop().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stint_core::error::ErrorKind;
    use stint_core::types::JobId;

    #[test]
    fn test_claim_error_into_app_error() {
        let err: AppError = ClaimError::Store(AppError::database("down")).into();
        assert_eq!(err.kind, ErrorKind::Database);

        let err: AppError = ClaimError::Heartbeat(HeartbeatError::AlreadyArmed(JobId::new())).into();
        assert_eq!(err.kind, ErrorKind::Internal);
    }
}
