//! Shared helpers for worker integration tests.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use stint_core::config::{DatabaseConfig, WorkerConfig};
use stint_core::error::AppError;
use stint_core::result::AppResult;
use stint_core::types::{JobId, WorkerId};
use stint_database::{DatabasePool, JobStore, run_migrations};
use stint_entity::{Job, NewJob, QueueStats};
use stint_worker::{JobHandler, ShutdownHandle};

/// Fresh, migrated in-memory SQLite store.
pub async fn sqlite_store() -> Arc<dyn JobStore> {
    let pool = DatabasePool::connect(&DatabaseConfig::new("sqlite::memory:"))
        .await
        .expect("Failed to open in-memory database");
    run_migrations(&pool)
        .await
        .expect("Failed to run migrations");
    pool.job_store()
}

/// SQLite database file removed on drop, WAL files included.
pub struct ScratchFile {
    path: PathBuf,
}

impl ScratchFile {
    pub fn new() -> Self {
        let path = std::env::temp_dir().join(format!("stint-worker-{}.db", WorkerId::new()));
        Self { path }
    }

    pub fn url(&self) -> String {
        format!("sqlite://{}", self.path.display())
    }
}

impl Drop for ScratchFile {
    fn drop(&mut self) {
        for suffix in ["", "-wal", "-shm"] {
            let mut path = self.path.clone().into_os_string();
            path.push(suffix);
            let _ = std::fs::remove_file(path);
        }
    }
}

/// Migrated file-backed SQLite store that several workers can share.
pub async fn sqlite_file_store(file: &ScratchFile) -> (DatabasePool, Arc<dyn JobStore>) {
    let pool = DatabasePool::connect(&DatabaseConfig::new(file.url()))
        .await
        .expect("Failed to open database file");
    run_migrations(&pool)
        .await
        .expect("Failed to run migrations");
    let store = pool.job_store();
    (pool, store)
}

/// Worker configuration tuned for fast tests.
pub fn worker_config(concurrency: usize) -> WorkerConfig {
    WorkerConfig {
        concurrency,
        wait_time_ms: 20,
        drain_timeout_seconds: 1,
        reschedule_delay_seconds: 10,
        shutdown_timeout_seconds: 5,
        ..WorkerConfig::default()
    }
}

/// Handler that counts calls and tracks peak parallelism.
#[derive(Debug, Default)]
pub struct CountingHandler {
    pub calls: AtomicUsize,
    active: AtomicUsize,
    pub peak: AtomicUsize,
    pub delay: Duration,
}

impl CountingHandler {
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl JobHandler for CountingHandler {
    async fn execute(&self, job: &Job) -> anyhow::Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.active.fetch_sub(1, Ordering::SeqCst);

        if job.payload.get("fail").and_then(|v| v.as_bool()) == Some(true) {
            anyhow::bail!("boom: job asked to fail");
        }
        Ok(())
    }
}

/// Handler recording how many times each job ran.
#[derive(Debug, Default)]
pub struct RecordingHandler {
    runs: Mutex<HashMap<JobId, usize>>,
}

impl RecordingHandler {
    pub fn runs(&self) -> HashMap<JobId, usize> {
        self.runs.lock().unwrap().clone()
    }
}

#[async_trait]
impl JobHandler for RecordingHandler {
    async fn execute(&self, job: &Job) -> anyhow::Result<()> {
        *self.runs.lock().unwrap().entry(job.id).or_default() += 1;
        tokio::time::sleep(Duration::from_millis(5)).await;
        Ok(())
    }
}

/// Store wrapper injecting behavior around the protocol operations.
#[derive(Debug)]
pub struct HookedStore {
    inner: Arc<dyn JobStore>,
    /// Fired right after a successful claim.
    pub shutdown_on_claim: OnceLock<ShutdownHandle>,
    /// Make every renewal fail with a database error.
    pub fail_renew: bool,
}

impl HookedStore {
    pub fn new(inner: Arc<dyn JobStore>) -> Self {
        Self {
            inner,
            shutdown_on_claim: OnceLock::new(),
            fail_renew: false,
        }
    }
}

#[async_trait]
impl JobStore for HookedStore {
    fn backend(&self) -> &'static str {
        self.inner.backend()
    }

    async fn enqueue(&self, job: &NewJob) -> AppResult<Job> {
        self.inner.enqueue(job).await
    }

    async fn find(&self, id: JobId) -> AppResult<Option<Job>> {
        self.inner.find(id).await
    }

    async fn pending(
        &self,
        queues: &[String],
        now: DateTime<Utc>,
        limit: usize,
    ) -> AppResult<Vec<Job>> {
        self.inner.pending(queues, now, limit).await
    }

    async fn in_progress(&self, queues: &[String], worker: WorkerId) -> AppResult<Vec<Job>> {
        self.inner.in_progress(queues, worker).await
    }

    async fn claim(
        &self,
        id: JobId,
        owner: &str,
        now: DateTime<Utc>,
        lease: Option<chrono::Duration>,
    ) -> AppResult<bool> {
        let claimed = self.inner.claim(id, owner, now, lease).await?;
        if claimed {
            if let Some(handle) = self.shutdown_on_claim.get() {
                handle.shutdown();
            }
        }
        Ok(claimed)
    }

    async fn renew(&self, id: JobId, owner: &str, till: DateTime<Utc>) -> AppResult<bool> {
        if self.fail_renew {
            return Err(AppError::database("renew unavailable"));
        }
        self.inner.renew(id, owner, till).await
    }

    async fn finish(&self, id: JobId, owner: &str, now: DateTime<Utc>) -> AppResult<bool> {
        self.inner.finish(id, owner, now).await
    }

    async fn reschedule(&self, id: JobId, owner: &str, at: DateTime<Utc>) -> AppResult<bool> {
        self.inner.reschedule(id, owner, at).await
    }

    async fn reschedule_all(
        &self,
        queues: &[String],
        worker: WorkerId,
        at: DateTime<Utc>,
    ) -> AppResult<u64> {
        self.inner.reschedule_all(queues, worker, at).await
    }

    async fn stats(&self, queues: &[String], now: DateTime<Utc>) -> AppResult<Vec<QueueStats>> {
        self.inner.stats(queues, now).await
    }
}
