//! SQLite job store.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::SqlitePool;
use sqlx::query::Query;
use sqlx::sqlite::{Sqlite, SqliteArguments};

use stint_core::error::{AppError, ErrorKind};
use stint_core::result::AppResult;
use stint_core::types::{JobId, WorkerId};
use stint_entity::{Job, NewJob, QueueStats};

use super::sql;
use crate::store::{JobStore, worker_owner_pattern};

/// Job store backed by SQLite.
///
/// SQLite offers no isolation-level control; correctness rests on each
/// conditional update being a single statement that SQLite executes
/// atomically under its database write lock.
#[derive(Debug, Clone)]
pub struct SqliteJobStore {
    pool: SqlitePool,
}

impl SqliteJobStore {
    /// Create a new SQLite job store.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Execute a compare-and-swap update; `true` iff exactly one row changed.
    async fn compare_and_swap<'q>(
        &self,
        op: &'static str,
        id: JobId,
        query: Query<'q, Sqlite, SqliteArguments<'q>>,
    ) -> AppResult<bool> {
        match query.execute(&self.pool).await {
            Ok(result) => Ok(result.rows_affected() == 1),
            Err(e) if is_lock_conflict(&e) => {
                tracing::debug!(job_id = %id, op, error = %e, "Database busy, treating as lost race");
                Ok(false)
            }
            Err(e) => Err(AppError::with_source(
                ErrorKind::Database,
                format!("Failed to {op} job {id}"),
                e,
            )),
        }
    }
}

#[async_trait]
impl JobStore for SqliteJobStore {
    fn backend(&self) -> &'static str {
        "sqlite"
    }

    async fn enqueue(&self, job: &NewJob) -> AppResult<Job> {
        job.validate()?;
        let row = job.clone().into_job(Utc::now());

        sqlx::query_as::<_, Job>(sql::INSERT)
            .bind(row.id)
            .bind(&row.queue_name)
            .bind(row.priority)
            .bind(&row.payload)
            .bind(row.scheduled_at)
            .bind(row.expires_at)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to enqueue job", e))
    }

    async fn find(&self, id: JobId) -> AppResult<Option<Job>> {
        sqlx::query_as::<_, Job>(sql::FIND)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to find job", e))
    }

    async fn pending(
        &self,
        queues: &[String],
        now: DateTime<Utc>,
        limit: usize,
    ) -> AppResult<Vec<Job>> {
        if queues.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        sqlx::query_as::<_, Job>(sql::SQLITE_PENDING)
            .bind(queue_list(queues)?)
            .bind(now)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                AppError::with_source(ErrorKind::Database, "Failed to query pending jobs", e)
            })
    }

    async fn in_progress(&self, queues: &[String], worker: WorkerId) -> AppResult<Vec<Job>> {
        if queues.is_empty() {
            return Ok(Vec::new());
        }

        sqlx::query_as::<_, Job>(sql::SQLITE_IN_PROGRESS)
            .bind(queue_list(queues)?)
            .bind(worker_owner_pattern(worker))
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                AppError::with_source(ErrorKind::Database, "Failed to query in-progress jobs", e)
            })
    }

    async fn claim(
        &self,
        id: JobId,
        owner: &str,
        now: DateTime<Utc>,
        lease: Option<Duration>,
    ) -> AppResult<bool> {
        let query = sqlx::query(sql::CLAIM)
            .bind(id)
            .bind(owner)
            .bind(now)
            .bind(lease.map(|lease| now + lease));
        self.compare_and_swap("claim", id, query).await
    }

    async fn renew(&self, id: JobId, owner: &str, till: DateTime<Utc>) -> AppResult<bool> {
        let query = sqlx::query(sql::RENEW).bind(id).bind(owner).bind(till);
        self.compare_and_swap("renew", id, query).await
    }

    async fn finish(&self, id: JobId, owner: &str, now: DateTime<Utc>) -> AppResult<bool> {
        let query = sqlx::query(sql::FINISH).bind(id).bind(owner).bind(now);
        self.compare_and_swap("finish", id, query).await
    }

    async fn reschedule(&self, id: JobId, owner: &str, at: DateTime<Utc>) -> AppResult<bool> {
        let query = sqlx::query(sql::RESCHEDULE).bind(id).bind(owner).bind(at);
        self.compare_and_swap("reschedule", id, query).await
    }

    async fn reschedule_all(
        &self,
        queues: &[String],
        worker: WorkerId,
        at: DateTime<Utc>,
    ) -> AppResult<u64> {
        if queues.is_empty() {
            return Ok(0);
        }

        sqlx::query(sql::SQLITE_RESCHEDULE_ALL)
            .bind(queue_list(queues)?)
            .bind(worker_owner_pattern(worker))
            .bind(at)
            .execute(&self.pool)
            .await
            .map(|result| result.rows_affected())
            .map_err(|e| {
                AppError::with_source(
                    ErrorKind::Database,
                    "Failed to reschedule in-progress jobs",
                    e,
                )
            })
    }

    async fn stats(&self, queues: &[String], now: DateTime<Utc>) -> AppResult<Vec<QueueStats>> {
        let result = if queues.is_empty() {
            sqlx::query_as::<_, QueueStats>(sql::STATS_ALL)
                .bind(now)
                .fetch_all(&self.pool)
                .await
        } else {
            sqlx::query_as::<_, QueueStats>(sql::SQLITE_STATS)
                .bind(queue_list(queues)?)
                .bind(now)
                .fetch_all(&self.pool)
                .await
        };

        result.map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to count jobs", e))
    }
}

/// Encode queue names as the JSON array consumed by `json_each`.
fn queue_list(queues: &[String]) -> AppResult<String> {
    Ok(serde_json::to_string(queues)?)
}

/// `SQLITE_BUSY` or `SQLITE_LOCKED`, including their extended codes.
fn is_lock_conflict(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db) => db
            .code()
            .and_then(|code| code.parse::<i32>().ok())
            .is_some_and(|code| matches!(code & 0xff, 5 | 6)),
        _ => false,
    }
}
