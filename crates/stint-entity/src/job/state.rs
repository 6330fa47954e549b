//! Lifecycle state derived from a job row's timestamps.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::model::Job;

/// Where a job stands at a given instant.
///
/// Nothing stores this value; it is recomputed from the row so that it
/// always agrees with the predicates the store evaluates in SQL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    /// Waiting for its scheduled time.
    Scheduled,
    /// Eligible to be claimed right now.
    Pending,
    /// Claimed under a valid (or absent) lease.
    Running,
    /// Execution completed.
    Finished,
    /// Passed its expiry before finishing; never runs.
    Expired,
}

impl JobState {
    /// Classify `job` as of `now`.
    pub fn of(job: &Job, now: DateTime<Utc>) -> Self {
        if job.finished_at.is_some() {
            return Self::Finished;
        }
        if job.expires_at.is_some_and(|at| at <= now) {
            return Self::Expired;
        }
        if job.started_at.is_some() {
            let lease_lapsed = job.lock_expires_at.is_some_and(|at| at < now);
            if !lease_lapsed {
                return Self::Running;
            }
        }
        if job.scheduled_at > now {
            return Self::Scheduled;
        }
        Self::Pending
    }

    /// Return the state as a lowercase string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Scheduled => "scheduled",
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Finished => "finished",
            Self::Expired => "expired",
        }
    }

    /// Whether the job can never run again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Finished | Self::Expired)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::model::NewJob;
    use chrono::Duration;
    use serde_json::json;

    fn job(now: DateTime<Utc>) -> Job {
        NewJob::new("default", json!({})).into_job(now)
    }

    #[test]
    fn test_fresh_job_is_pending() {
        let now = Utc::now();
        assert_eq!(job(now).state(now), JobState::Pending);
    }

    #[test]
    fn test_future_job_is_scheduled() {
        let now = Utc::now();
        let mut j = job(now);
        j.scheduled_at = now + Duration::minutes(1);
        assert_eq!(j.state(now), JobState::Scheduled);
    }

    #[test]
    fn test_claimed_without_lease_stays_running() {
        let now = Utc::now();
        let mut j = job(now);
        j.started_at = Some(now - Duration::days(3));
        j.owner = Some("w:1".into());
        assert_eq!(j.state(now), JobState::Running);
    }

    #[test]
    fn test_lapsed_lease_is_pending_again() {
        let now = Utc::now();
        let mut j = job(now - Duration::hours(2));
        j.started_at = Some(now - Duration::hours(2));
        j.owner = Some("w:1".into());
        j.lock_expires_at = Some(now - Duration::hours(1));
        assert_eq!(j.state(now), JobState::Pending);
        assert!(j.is_pending(now));
    }

    #[test]
    fn test_expired_wins_over_everything_but_finished() {
        let now = Utc::now();
        let mut j = job(now);
        j.expires_at = Some(now - Duration::seconds(1));
        assert_eq!(j.state(now), JobState::Expired);
        assert!(j.state(now).is_terminal());

        j.finished_at = Some(now);
        assert_eq!(j.state(now), JobState::Finished);
    }
}
