//! PostgreSQL job store.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::PgPool;
use sqlx::postgres::{PgArguments, Postgres};
use sqlx::query::Query;

use stint_core::error::{AppError, ErrorKind};
use stint_core::result::AppResult;
use stint_core::types::{JobId, WorkerId};
use stint_entity::{Job, NewJob, QueueStats};

use super::sql;
use crate::store::{JobStore, worker_owner_pattern};

/// Job store backed by PostgreSQL.
///
/// Protocol operations run inside a `REPEATABLE READ` transaction; a
/// serialization failure is reported as a failed operation, not retried.
#[derive(Debug, Clone)]
pub struct PgJobStore {
    pool: PgPool,
}

impl PgJobStore {
    /// Create a new PostgreSQL job store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Run one conditional update under `REPEATABLE READ`.
    async fn execute_isolated(
        &self,
        query: Query<'_, Postgres, PgArguments>,
    ) -> Result<u64, sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ")
            .execute(&mut *tx)
            .await?;
        let result = query.execute(&mut *tx).await?;
        tx.commit().await?;
        Ok(result.rows_affected())
    }

    /// Execute a compare-and-swap update; `true` iff exactly one row changed.
    async fn compare_and_swap(
        &self,
        op: &'static str,
        id: JobId,
        query: Query<'_, Postgres, PgArguments>,
    ) -> AppResult<bool> {
        match self.execute_isolated(query).await {
            Ok(rows) => Ok(rows == 1),
            Err(e) if is_serialization_failure(&e) => {
                tracing::debug!(job_id = %id, op, error = %e, "Serialization conflict, treating as lost race");
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
impl JobStore for PgJobStore {
    fn backend(&self) -> &'static str {
        "postgres"
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

        sqlx::query_as::<_, Job>(sql::PG_PENDING)
            .bind(queues)
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

        sqlx::query_as::<_, Job>(sql::PG_IN_PROGRESS)
            .bind(queues)
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

        let query = sqlx::query(sql::PG_RESCHEDULE_ALL)
            .bind(queues)
            .bind(worker_owner_pattern(worker))
            .bind(at);
        match self.execute_isolated(query).await {
            Ok(rows) => Ok(rows),
            Err(e) if is_serialization_failure(&e) => {
                tracing::debug!(worker_id = %worker, error = %e, "Serialization conflict during reschedule sweep");
                Ok(0)
            }
            Err(e) => Err(AppError::with_source(
                ErrorKind::Database,
                "Failed to reschedule in-progress jobs",
                e,
            )),
        }
    }

    async fn stats(&self, queues: &[String], now: DateTime<Utc>) -> AppResult<Vec<QueueStats>> {
        let result = if queues.is_empty() {
            sqlx::query_as::<_, QueueStats>(sql::STATS_ALL)
                .bind(now)
                .fetch_all(&self.pool)
                .await
        } else {
            sqlx::query_as::<_, QueueStats>(sql::PG_STATS)
                .bind(queues)
                .bind(now)
                .fetch_all(&self.pool)
                .await
        };

        result.map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to count jobs", e))
    }
}

/// `serialization_failure` or `deadlock_detected`.
fn is_serialization_failure(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db) => matches!(db.code().as_deref(), Some("40001" | "40P01")),
        _ => false,
    }
}
