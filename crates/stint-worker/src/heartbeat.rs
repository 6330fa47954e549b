//! Lease heartbeat: periodic renewal of a claimed job's lease.
//!
//! A heartbeat is armed when a claim with a lease succeeds and lives until
//! the owning [`Claim`](crate::claim::Claim) finishes or releases the job.
//! It also stops on its own once the store reports the job is no longer
//! owned. A [`HeartbeatRegistry`] tracks armed heartbeats per worker;
//! arming a second heartbeat for the same job is a protocol violation.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashSet;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

use stint_core::error::{AppError, ErrorKind};
use stint_core::result::AppResult;
use stint_core::types::JobId;
use stint_database::JobStore;

/// Heartbeat arming failure.
#[derive(Debug, Clone, thiserror::Error)]
pub enum HeartbeatError {
    /// A heartbeat is already running for this job in this worker.
    #[error("Heartbeat already armed for job {0}")]
    AlreadyArmed(JobId),
}

impl From<HeartbeatError> for AppError {
    fn from(err: HeartbeatError) -> Self {
        AppError::with_source(ErrorKind::Internal, err.to_string(), err)
    }
}

/// Lease length and the renewal cadence derived from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Lease {
    duration: chrono::Duration,
    tick: Duration,
}

impl Lease {
    /// A lease of `duration`, renewed every half lease.
    pub fn new(duration: Duration) -> AppResult<Self> {
        if duration.is_zero() {
            return Err(AppError::validation("Lease duration must be positive"));
        }
        let lease = chrono::Duration::from_std(duration).map_err(|e| {
            AppError::with_source(ErrorKind::Configuration, "Lease duration out of range", e)
        })?;
        Ok(Self {
            duration: lease,
            tick: duration / 2,
        })
    }

    /// Lease length applied at claim time.
    pub fn duration(&self) -> chrono::Duration {
        self.duration
    }

    /// Interval between renewals.
    pub fn tick(&self) -> Duration {
        self.tick
    }

    /// New lock expiry for a renewal at `now`: one and a half leases ahead.
    pub fn renewal(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now + self.duration * 3 / 2
    }
}

/// Set of jobs with an armed heartbeat in one worker.
#[derive(Debug, Clone, Default)]
pub struct HeartbeatRegistry {
    armed: Arc<DashSet<JobId>>,
}

impl HeartbeatRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Start renewing `job_id`'s lease on behalf of `owner`.
    ///
    /// The registry is keyed by job, not owner. If renewals fail for
    /// longer than the lease, this worker can reclaim the lapsed job while
    /// the first execution still runs, and the second `arm` fails with
    /// [`HeartbeatError::AlreadyArmed`], which stops the worker.
    pub fn arm(
        &self,
        store: Arc<dyn JobStore>,
        job_id: JobId,
        owner: String,
        lease: Lease,
    ) -> Result<Heartbeat, HeartbeatError> {
        if !self.armed.insert(job_id) {
            return Err(HeartbeatError::AlreadyArmed(job_id));
        }

        let (stop_tx, stop_rx) = oneshot::channel();
        let handle = tokio::spawn(beat(store, job_id, owner, lease, stop_rx));

        tracing::trace!(job_id = %job_id, tick_ms = lease.tick().as_millis() as u64, "Heartbeat armed");
        Ok(Heartbeat {
            job_id,
            registry: self.clone(),
            stop: Some(stop_tx),
            handle: Some(handle),
        })
    }

    /// Whether a heartbeat is armed for `job_id`.
    pub fn is_armed(&self, job_id: JobId) -> bool {
        self.armed.contains(&job_id)
    }

    /// Number of armed heartbeats.
    pub fn len(&self) -> usize {
        self.armed.len()
    }

    /// Whether no heartbeat is armed.
    pub fn is_empty(&self) -> bool {
        self.armed.is_empty()
    }

    fn disarm(&self, job_id: JobId) {
        self.armed.remove(&job_id);
    }
}

/// Handle to a running heartbeat task.
///
/// Dropping the handle aborts the task; [`Heartbeat::stop`] stops it and
/// waits for an in-flight renewal to complete.
#[derive(Debug)]
pub struct Heartbeat {
    job_id: JobId,
    registry: HeartbeatRegistry,
    stop: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl Heartbeat {
    /// Job whose lease this heartbeat renews.
    pub fn job_id(&self) -> JobId {
        self.job_id
    }

    /// Whether the renewal task is still running.
    pub fn is_active(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Stop renewing and wait for the task to exit.
    pub async fn stop(mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                tracing::warn!(job_id = %self.job_id, error = %e, "Heartbeat task ended abnormally");
            }
        }
    }
}

impl Drop for Heartbeat {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
        self.registry.disarm(self.job_id);
    }
}

async fn beat(
    store: Arc<dyn JobStore>,
    job_id: JobId,
    owner: String,
    lease: Lease,
    mut stop: oneshot::Receiver<()>,
) {
    let mut ticks = time::interval_at(Instant::now() + lease.tick(), lease.tick());
    ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = &mut stop => break,
            _ = ticks.tick() => {
                let till = lease.renewal(Utc::now());
                match store.renew(job_id, &owner, till).await {
                    Ok(true) => tracing::trace!(job_id = %job_id, %till, "Lease renewed"),
                    Ok(false) => {
                        tracing::debug!(job_id = %job_id, owner = %owner, "Job no longer owned, stopping heartbeat");
                        break;
                    }
                    Err(e) => {
                        tracing::warn!(job_id = %job_id, error = %e, "Failed to renew lease");
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lease_cadence() {
        let lease = Lease::new(Duration::from_secs(60)).unwrap();
        assert_eq!(lease.tick(), Duration::from_secs(30));
        assert_eq!(lease.duration(), chrono::Duration::seconds(60));

        let now = Utc::now();
        assert_eq!(lease.renewal(now), now + chrono::Duration::seconds(90));
    }

    #[test]
    fn test_zero_lease_rejected() {
        let err = Lease::new(Duration::ZERO).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Validation);
    }

    #[test]
    fn test_already_armed_is_internal() {
        let id = JobId::new();
        let err: AppError = HeartbeatError::AlreadyArmed(id).into();
        assert_eq!(err.kind, ErrorKind::Internal);
        assert!(err.message.contains(&id.to_string()));
    }
}
