//! Worker process configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Longest queue name the jobs table accepts.
pub const MAX_QUEUE_NAME_LEN: usize = 50;

/// Upper bound on `worker.concurrency`.
pub const MAX_CONCURRENCY: usize = u16::MAX as usize;

/// Worker loop and executor configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Queues to watch.
    #[serde(default = "default_queues")]
    pub queues: Vec<String>,
    /// Number of concurrent job processing tasks.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Wait between poll cycles, in milliseconds.
    #[serde(default = "default_wait_time")]
    pub wait_time_ms: u64,
    /// Lease duration in seconds. Leasing is disabled when absent.
    #[serde(default)]
    pub lease_duration_seconds: Option<u64>,
    /// How long to wait for in-flight jobs before the shutdown sweep.
    #[serde(default = "default_drain_timeout")]
    pub drain_timeout_seconds: u64,
    /// Delay applied to jobs released by the shutdown sweep.
    #[serde(default = "default_reschedule_delay")]
    pub reschedule_delay_seconds: u64,
    /// Upper bound on the final wait for in-flight jobs.
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_seconds: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            queues: default_queues(),
            concurrency: default_concurrency(),
            wait_time_ms: default_wait_time(),
            lease_duration_seconds: None,
            drain_timeout_seconds: default_drain_timeout(),
            reschedule_delay_seconds: default_reschedule_delay(),
            shutdown_timeout_seconds: default_shutdown_timeout(),
        }
    }
}

impl WorkerConfig {
    /// Poll wait interval.
    pub fn wait_time(&self) -> Duration {
        Duration::from_millis(self.wait_time_ms)
    }

    /// Lease duration, if leasing is enabled.
    pub fn lease_duration(&self) -> Option<Duration> {
        self.lease_duration_seconds.map(Duration::from_secs)
    }

    /// Wait for in-flight jobs before rescheduling leftovers.
    pub fn drain_timeout(&self) -> Duration {
        Duration::from_secs(self.drain_timeout_seconds)
    }

    /// Grace delay for jobs released on shutdown.
    pub fn reschedule_delay(&self) -> Duration {
        Duration::from_secs(self.reschedule_delay_seconds)
    }

    /// Final bounded wait for in-flight jobs.
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_seconds)
    }

    /// Validate the worker section.
    pub fn validate(&self) -> Result<(), AppError> {
        if self.concurrency == 0 || self.concurrency > MAX_CONCURRENCY {
            return Err(AppError::validation(format!(
                "worker.concurrency must be between 1 and {MAX_CONCURRENCY}"
            )));
        }
        if self.queues.is_empty() {
            return Err(AppError::validation("worker.queues must name at least one queue"));
        }
        for queue in &self.queues {
            if queue.is_empty() || queue.len() > MAX_QUEUE_NAME_LEN {
                return Err(AppError::validation(format!(
                    "Invalid queue name '{queue}': must be 1-{MAX_QUEUE_NAME_LEN} characters"
                )));
            }
        }
        if self.lease_duration_seconds == Some(0) {
            return Err(AppError::validation(
                "worker.lease_duration_seconds must be at least 1 when set",
            ));
        }
        Ok(())
    }
}

fn default_queues() -> Vec<String> {
    vec!["default".to_string()]
}

fn default_concurrency() -> usize {
    10
}

fn default_wait_time() -> u64 {
    1000
}

fn default_drain_timeout() -> u64 {
    1
}

fn default_reschedule_delay() -> u64 {
    10
}

fn default_shutdown_timeout() -> u64 {
    30
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = WorkerConfig::default();
        config.validate().unwrap();
        assert_eq!(config.wait_time(), Duration::from_secs(1));
        assert_eq!(config.reschedule_delay(), Duration::from_secs(10));
    }

    #[test]
    fn test_rejects_zero_concurrency() {
        let config = WorkerConfig {
            concurrency: 0,
            ..WorkerConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_oversized_concurrency() {
        let config = WorkerConfig {
            concurrency: usize::MAX,
            ..WorkerConfig::default()
        };
        assert!(config.validate().is_err());

        let config = WorkerConfig {
            concurrency: MAX_CONCURRENCY,
            ..WorkerConfig::default()
        };
        config.validate().unwrap();
    }

    #[test]
    fn test_rejects_long_queue_name() {
        let config = WorkerConfig {
            queues: vec!["q".repeat(MAX_QUEUE_NAME_LEN + 1)],
            ..WorkerConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_zero_lease() {
        let config = WorkerConfig {
            lease_duration_seconds: Some(0),
            ..WorkerConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
