//! SQL text shared by the PostgreSQL and SQLite job stores.
//!
//! Both backends accept `$N` placeholders, so only the queue-list filter
//! differs: PostgreSQL binds `$1` as a `TEXT[]`, SQLite as a JSON array
//! expanded with `json_each`.

macro_rules! job_columns {
    () => {
        "id, queue_name, priority, payload, scheduled_at, started_at, finished_at, \
         expires_at, owner, lock_expires_at"
    };
}

/// Eligible to be claimed at `$now`.
macro_rules! pending_predicate {
    ($now:literal) => {
        concat!(
            "finished_at IS NULL",
            " AND (expires_at IS NULL OR expires_at > ", $now, ")",
            " AND scheduled_at <= ", $now,
            " AND (started_at IS NULL OR lock_expires_at < ", $now, ")"
        )
    };
}

/// Claimed by `$owner` and not yet finished.
macro_rules! in_progress_predicate {
    ($owner:literal) => {
        concat!(
            "started_at IS NOT NULL AND finished_at IS NULL AND owner = ",
            $owner
        )
    };
}

/// Per-state counters; `$now` is the evaluation instant.
macro_rules! stats_columns {
    ($now:literal) => {
        concat!(
            "queue_name, ",
            "SUM(CASE WHEN ", pending_predicate!($now), " THEN 1 ELSE 0 END) AS pending, ",
            "SUM(CASE WHEN finished_at IS NULL",
            " AND (expires_at IS NULL OR expires_at > ", $now, ")",
            " AND (started_at IS NULL OR lock_expires_at < ", $now, ")",
            " AND scheduled_at > ", $now, " THEN 1 ELSE 0 END) AS scheduled, ",
            "SUM(CASE WHEN finished_at IS NULL",
            " AND (expires_at IS NULL OR expires_at > ", $now, ")",
            " AND started_at IS NOT NULL",
            " AND (lock_expires_at IS NULL OR lock_expires_at >= ", $now, ")",
            " THEN 1 ELSE 0 END) AS running, ",
            "SUM(CASE WHEN finished_at IS NOT NULL THEN 1 ELSE 0 END) AS finished, ",
            "SUM(CASE WHEN finished_at IS NULL AND expires_at IS NOT NULL",
            " AND expires_at <= ", $now, " THEN 1 ELSE 0 END) AS expired"
        )
    };
}

macro_rules! pending_query {
    ($filter:literal) => {
        concat!(
            "SELECT ", job_columns!(), " FROM stint_jobs WHERE ", $filter, " AND ",
            pending_predicate!("$2"),
            " ORDER BY priority DESC, scheduled_at ASC, id ASC LIMIT $3"
        )
    };
}

macro_rules! in_progress_query {
    ($filter:literal) => {
        concat!(
            "SELECT ", job_columns!(), " FROM stint_jobs WHERE ", $filter,
            " AND started_at IS NOT NULL AND finished_at IS NULL AND owner LIKE $2",
            " ORDER BY started_at ASC"
        )
    };
}

macro_rules! reschedule_all_query {
    ($filter:literal) => {
        concat!(
            "UPDATE stint_jobs SET started_at = NULL, owner = NULL, lock_expires_at = NULL, ",
            "scheduled_at = $3 WHERE ", $filter,
            " AND started_at IS NOT NULL AND finished_at IS NULL AND owner LIKE $2"
        )
    };
}

macro_rules! stats_query {
    ($filter:literal, $now:literal) => {
        concat!(
            "SELECT ", stats_columns!($now), " FROM stint_jobs WHERE ", $filter,
            " GROUP BY queue_name ORDER BY queue_name"
        )
    };
}

pub(crate) const INSERT: &str = concat!(
    "INSERT INTO stint_jobs (",
    job_columns!(),
    ") VALUES ($1, $2, $3, $4, $5, NULL, NULL, $6, NULL, NULL) RETURNING ",
    job_columns!()
);

pub(crate) const FIND: &str = concat!("SELECT ", job_columns!(), " FROM stint_jobs WHERE id = $1");

/// `$1` id, `$2` owner, `$3` now, `$4` lock expiry (nullable).
pub(crate) const CLAIM: &str = concat!(
    "UPDATE stint_jobs SET started_at = $3, owner = $2, lock_expires_at = $4 WHERE id = $1 AND ",
    pending_predicate!("$3")
);

/// `$1` id, `$2` owner, `$3` new lock expiry.
pub(crate) const RENEW: &str = concat!(
    "UPDATE stint_jobs SET lock_expires_at = $3 WHERE id = $1 AND ",
    in_progress_predicate!("$2")
);

/// `$1` id, `$2` owner, `$3` now.
pub(crate) const FINISH: &str = concat!(
    "UPDATE stint_jobs SET finished_at = $3 WHERE id = $1 AND ",
    in_progress_predicate!("$2")
);

/// `$1` id, `$2` owner, `$3` new scheduled time.
pub(crate) const RESCHEDULE: &str = concat!(
    "UPDATE stint_jobs SET started_at = NULL, owner = NULL, lock_expires_at = NULL, ",
    "scheduled_at = $3 WHERE id = $1 AND ",
    in_progress_predicate!("$2")
);

pub(crate) const PG_PENDING: &str = pending_query!("queue_name = ANY($1)");
pub(crate) const PG_IN_PROGRESS: &str = in_progress_query!("queue_name = ANY($1)");
pub(crate) const PG_RESCHEDULE_ALL: &str = reschedule_all_query!("queue_name = ANY($1)");
pub(crate) const PG_STATS: &str = stats_query!("queue_name = ANY($1)", "$2");

pub(crate) const SQLITE_PENDING: &str =
    pending_query!("queue_name IN (SELECT value FROM json_each($1))");
pub(crate) const SQLITE_IN_PROGRESS: &str =
    in_progress_query!("queue_name IN (SELECT value FROM json_each($1))");
pub(crate) const SQLITE_RESCHEDULE_ALL: &str =
    reschedule_all_query!("queue_name IN (SELECT value FROM json_each($1))");
pub(crate) const SQLITE_STATS: &str =
    stats_query!("queue_name IN (SELECT value FROM json_each($1))", "$2");

/// Counts over every queue; `$1` is the evaluation instant.
pub(crate) const STATS_ALL: &str = stats_query!("1 = 1", "$1");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_claim_rechecks_full_pending_predicate() {
        assert!(CLAIM.contains("WHERE id = $1 AND finished_at IS NULL"));
        assert!(CLAIM.contains("expires_at > $3"));
        assert!(CLAIM.contains("scheduled_at <= $3"));
        assert!(CLAIM.contains("lock_expires_at < $3"));
    }

    #[test]
    fn test_owner_guarded_updates() {
        for sql in [RENEW, FINISH, RESCHEDULE] {
            assert!(sql.contains("WHERE id = $1 AND started_at IS NOT NULL"));
            assert!(sql.ends_with("owner = $2"));
        }
    }

    #[test]
    fn test_pending_order() {
        assert!(PG_PENDING.contains("ORDER BY priority DESC, scheduled_at ASC"));
        assert!(SQLITE_PENDING.contains("json_each($1)"));
    }
}
