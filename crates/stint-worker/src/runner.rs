//! Worker runner: the poll loop that claims and executes jobs.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Instant;

use chrono::Utc;
use tokio::sync::{broadcast, watch};
use tokio::time;
use tracing::Instrument;

use stint_core::config::WorkerConfig;
use stint_core::error::AppError;
use stint_core::result::AppResult;
use stint_core::types::WorkerId;
use stint_database::{JobStore, task_owner};
use stint_entity::Job;

use crate::claim::{Claim, ClaimError};
use crate::events::{JobEvent, JobOutcome};
use crate::executor::Executor;
use crate::handler::JobHandler;
use crate::heartbeat::{HeartbeatRegistry, Lease};

/// Buffered events per subscriber before the slowest one starts lagging.
const EVENT_CAPACITY: usize = 1024;

/// Requests a graceful stop of a [`WorkerRunner`].
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl ShutdownHandle {
    /// Ask the worker to stop. Idempotent.
    pub fn shutdown(&self) {
        self.tx.send_replace(true);
    }

    /// Whether a stop has been requested.
    pub fn is_shutdown(&self) -> bool {
        *self.tx.borrow()
    }
}

/// Main worker runner that polls queues and executes jobs.
#[derive(Debug)]
pub struct WorkerRunner {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    worker_id: WorkerId,
    store: Arc<dyn JobStore>,
    handler: Arc<dyn JobHandler>,
    config: WorkerConfig,
    lease: Option<Lease>,
    executor: Executor,
    heartbeats: HeartbeatRegistry,
    events: broadcast::Sender<JobEvent>,
    stopping: Arc<watch::Sender<bool>>,
    fatal: OnceLock<AppError>,
    next_task: AtomicU64,
}

impl WorkerRunner {
    /// Create a worker over `store`, executing jobs with `handler`.
    pub fn new(
        store: Arc<dyn JobStore>,
        handler: Arc<dyn JobHandler>,
        config: WorkerConfig,
    ) -> AppResult<Self> {
        config.validate()?;
        let lease = config.lease_duration().map(Lease::new).transpose()?;
        let executor = Executor::new(config.concurrency)?;
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let (stopping, _) = watch::channel(false);

        Ok(Self {
            inner: Arc::new(Inner {
                worker_id: WorkerId::new(),
                store,
                handler,
                executor,
                config,
                lease,
                heartbeats: HeartbeatRegistry::new(),
                events,
                stopping: Arc::new(stopping),
                fatal: OnceLock::new(),
                next_task: AtomicU64::new(1),
            }),
        })
    }

    /// Process-unique identity of this worker.
    pub fn worker_id(&self) -> WorkerId {
        self.inner.worker_id
    }

    /// Handle that stops this worker from any task.
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            tx: self.inner.stopping.clone(),
        }
    }

    /// Receive one [`JobEvent`] per execution attempt.
    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.inner.events.subscribe()
    }

    /// Run until `shutdown` turns `true` (or its sender is dropped), the
    /// shutdown handle fires, or a fatal protocol error occurs.
    ///
    /// On the way out the executor stops accepting work, in-flight jobs
    /// get a short drain window, and whatever this worker still holds is
    /// rescheduled after the configured grace delay.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> AppResult<()> {
        let inner = &self.inner;
        let mut stopping = inner.stopping.subscribe();
        let wait = inner.config.wait_time();

        tracing::info!(
            worker_id = %inner.worker_id,
            queues = ?inner.config.queues,
            concurrency = inner.config.concurrency,
            wait_ms = inner.config.wait_time_ms,
            lease_seconds = ?inner.config.lease_duration_seconds,
            backend = inner.store.backend(),
            "Worker started"
        );

        loop {
            if *shutdown.borrow() || *stopping.borrow() {
                break;
            }

            if let Err(e) = self.cycle().await {
                if e.is_transient() {
                    tracing::warn!(worker_id = %inner.worker_id, error = %e, "Poll cycle failed");
                } else {
                    tracing::error!(worker_id = %inner.worker_id, error = %e, "Poll cycle failed");
                }
            }

            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        tracing::debug!(worker_id = %inner.worker_id, "Shutdown sender dropped");
                        break;
                    }
                }
                _ = stopping.changed() => {}
                _ = time::sleep(wait) => {}
            }
        }

        tracing::info!(worker_id = %inner.worker_id, "Worker shutting down");
        inner.stopping.send_replace(true);
        self.drain().await;

        match inner.fatal.get() {
            Some(err) => {
                tracing::error!(worker_id = %inner.worker_id, error = %err, "Worker stopped on fatal error");
                Err(err.clone())
            }
            None => {
                tracing::info!(worker_id = %inner.worker_id, "Worker shut down complete");
                Ok(())
            }
        }
    }

    /// One poll cycle. Returns the number of tasks submitted.
    async fn cycle(&self) -> AppResult<usize> {
        let inner = &self.inner;
        let capacity = inner.executor.capacity();
        if capacity == 0 {
            tracing::trace!(worker_id = %inner.worker_id, "All worker slots occupied");
            return Ok(0);
        }

        let jobs = inner
            .store
            .pending(&inner.config.queues, Utc::now(), capacity)
            .await?;

        let mut submitted = 0;
        for job in jobs {
            let task_id = inner.next_task.fetch_add(1, Ordering::Relaxed);
            if inner.executor.submit(perform(inner.clone(), job, task_id)) {
                submitted += 1;
            }
        }

        if submitted > 0 {
            tracing::debug!(worker_id = %inner.worker_id, submitted, capacity, "Submitted jobs");
        }
        Ok(submitted)
    }

    async fn drain(&self) {
        let inner = &self.inner;
        inner.executor.shutdown();

        if !inner.executor.wait_idle(inner.config.drain_timeout()).await {
            tracing::info!(
                worker_id = %inner.worker_id,
                running = inner.executor.running(),
                "Waiting for in-flight jobs..."
            );
        }

        let delay = chrono::Duration::from_std(inner.config.reschedule_delay())
            .unwrap_or_else(|_| chrono::Duration::zero());
        let at = Utc::now() + delay;
        match inner
            .store
            .reschedule_all(&inner.config.queues, inner.worker_id, at)
            .await
        {
            Ok(0) => {}
            Ok(count) => tracing::info!(
                worker_id = %inner.worker_id,
                count,
                %at,
                "Rescheduled in-progress jobs"
            ),
            Err(e) => tracing::error!(
                worker_id = %inner.worker_id,
                error = %e,
                "Failed to reschedule in-progress jobs"
            ),
        }

        if !inner.executor.wait_idle(inner.config.shutdown_timeout()).await {
            tracing::warn!(
                worker_id = %inner.worker_id,
                running = inner.executor.running(),
                "Timed out waiting for in-flight jobs"
            );
        }
    }
}

impl Inner {
    fn is_stopping(&self) -> bool {
        *self.stopping.borrow()
    }

    /// Record a fatal error and stop the worker.
    fn abort(&self, err: AppError) {
        tracing::error!(worker_id = %self.worker_id, error = %err, "Fatal worker error");
        let _ = self.fatal.set(err);
        self.stopping.send_replace(true);
    }

    fn emit(&self, event: JobEvent) {
        event.trace();
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}

/// Claim `job` and run it to an outcome.
async fn perform(inner: Arc<Inner>, job: Job, task_id: u64) {
    let span = tracing::info_span!(
        "job",
        worker_id = %inner.worker_id,
        task_id,
        job_id = %job.id,
        queue = %job.queue_name,
    );

    async move {
        let owner = task_owner(inner.worker_id, task_id);
        let claim = match Claim::acquire(
            inner.store.clone(),
            &inner.heartbeats,
            job,
            owner,
            inner.lease,
        )
        .await
        {
            Ok(Some(claim)) => claim,
            Ok(None) => {
                tracing::trace!("Job no longer pending");
                return;
            }
            Err(ClaimError::Store(e)) => {
                tracing::warn!(error = %e, "Failed to claim job");
                return;
            }
            Err(ClaimError::Heartbeat(e)) => {
                inner.abort(e.into());
                return;
            }
        };

        let started = Instant::now();
        let job = claim.job().clone();

        let outcome = if inner.is_stopping() {
            match claim.release(Utc::now()).await {
                Ok(true) => {}
                Ok(false) => tracing::debug!("Claim lost before release"),
                Err(e) => tracing::error!(error = %e, "Failed to release job"),
            }
            JobOutcome::Released
        } else {
            tracing::debug!(job_class = job.job_class().unwrap_or("-"), "Executing job");
            let outcome = match inner.handler.execute(&job).await {
                Ok(()) => JobOutcome::Succeeded,
                Err(e) => JobOutcome::Failed {
                    error: format!("{e:#}"),
                },
            };
            match claim.finish(Utc::now()).await {
                Ok(true) => {}
                Ok(false) => tracing::warn!("Claim lost before finish"),
                Err(e) => tracing::error!(error = %e, "Failed to mark job finished"),
            }
            outcome
        };

        inner.emit(JobEvent {
            job_id: job.id,
            job_class: job.job_class().map(str::to_owned),
            queue_name: job.queue_name.clone(),
            worker_id: inner.worker_id,
            task_id,
            outcome,
            duration: started.elapsed(),
        });
    }
    .instrument(span)
    .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shutdown_handle_is_idempotent() {
        let (tx, _) = watch::channel(false);
        let handle = ShutdownHandle { tx: Arc::new(tx) };
        assert!(!handle.is_shutdown());
        handle.shutdown();
        handle.shutdown();
        assert!(handle.is_shutdown());
    }
}
