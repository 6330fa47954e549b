//! The job store: pending query and claim/lease protocol.
//!
//! Every mutation of a job's `owner`, `started_at`, `finished_at` or
//! `lock_expires_at` goes through one of the conditional updates below.
//! Each is a single `UPDATE … WHERE id = $1 AND <predicate>` and the
//! number of affected rows, not a prior read, decides success.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use stint_core::result::AppResult;
use stint_core::types::{JobId, WorkerId};
use stint_entity::{Job, NewJob, QueueStats};

/// Owner string for task `task` of worker `worker`.
///
/// Every task of a worker gets its own owner so two tasks in the same
/// process never hold the same claim identity.
pub fn task_owner(worker: WorkerId, task: u64) -> String {
    format!("{worker}:{task:x}")
}

/// `LIKE` pattern matching every owner produced by [`task_owner`] for `worker`.
pub fn worker_owner_pattern(worker: WorkerId) -> String {
    format!("{worker}:%")
}

/// Persistent job storage shared by all workers.
///
/// Conditional operations return `Ok(false)` when the row no longer
/// satisfies their predicate (lost race, wrong owner, already finished)
/// and when the backend reports a serialization conflict. `Err` is
/// reserved for transient store failures.
#[async_trait]
pub trait JobStore: Send + Sync + std::fmt::Debug + 'static {
    /// Short backend name for logs.
    fn backend(&self) -> &'static str;

    /// Insert a new job and return the stored row.
    async fn enqueue(&self, job: &NewJob) -> AppResult<Job>;

    /// Find a job by ID.
    async fn find(&self, id: JobId) -> AppResult<Option<Job>>;

    /// Claimable jobs in `queues` at `now`, highest priority first, then
    /// earliest scheduled, at most `limit` rows.
    async fn pending(&self, queues: &[String], now: DateTime<Utc>, limit: usize)
    -> AppResult<Vec<Job>>;

    /// Started, unfinished jobs in `queues` owned by any task of `worker`.
    async fn in_progress(&self, queues: &[String], worker: WorkerId) -> AppResult<Vec<Job>>;

    /// Claim a pending job for `owner`.
    ///
    /// Sets `started_at = now`, `owner`, and `lock_expires_at = now + lease`
    /// when a lease is given (left NULL otherwise).
    async fn claim(
        &self,
        id: JobId,
        owner: &str,
        now: DateTime<Utc>,
        lease: Option<Duration>,
    ) -> AppResult<bool>;

    /// Extend the lease of a job in progress for `owner` until `till`.
    async fn renew(&self, id: JobId, owner: &str, till: DateTime<Utc>) -> AppResult<bool>;

    /// Mark a job in progress for `owner` as finished at `now`.
    async fn finish(&self, id: JobId, owner: &str, now: DateTime<Utc>) -> AppResult<bool>;

    /// Release a job in progress for `owner`, making it pending again at `at`.
    async fn reschedule(&self, id: JobId, owner: &str, at: DateTime<Utc>) -> AppResult<bool>;

    /// Release every job in `queues` still in progress for any task of
    /// `worker`, rescheduling them at `at`. Returns the number released.
    async fn reschedule_all(
        &self,
        queues: &[String],
        worker: WorkerId,
        at: DateTime<Utc>,
    ) -> AppResult<u64>;

    /// Per-queue counts as of `now`. An empty `queues` slice means all queues.
    async fn stats(&self, queues: &[String], now: DateTime<Utc>) -> AppResult<Vec<QueueStats>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_owner_matches_worker_pattern() {
        let worker = WorkerId::new();
        let owner = task_owner(worker, 255);
        assert_eq!(owner, format!("{worker}:ff"));

        let pattern = worker_owner_pattern(worker);
        let prefix = pattern.trim_end_matches('%');
        assert!(owner.starts_with(prefix));
        assert!(owner.len() <= 100);
    }

    #[test]
    fn test_owners_differ_per_task() {
        let worker = WorkerId::new();
        assert_ne!(task_owner(worker, 1), task_owner(worker, 2));
        assert_ne!(task_owner(worker, 1), task_owner(WorkerId::new(), 1));
    }
}
