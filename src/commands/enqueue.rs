//! Enqueue command.

use chrono::{Duration, Utc};
use clap::Args;

use stint_core::config::AppConfig;
use stint_core::error::AppError;
use stint_entity::{DEFAULT_PRIORITY, DEFAULT_QUEUE, NewJob};
use stint_worker::JobQueue;

use crate::output::{self, OutputFormat};

/// Arguments for the enqueue command
#[derive(Debug, Args)]
pub struct EnqueueArgs {
    /// Queue name
    #[arg(short, long, default_value = DEFAULT_QUEUE)]
    pub queue: String,

    /// Priority; higher runs first
    #[arg(short, long, default_value_t = DEFAULT_PRIORITY, allow_negative_numbers = true)]
    pub priority: i16,

    /// Run no earlier than this many seconds from now
    #[arg(long)]
    pub delay_seconds: Option<u32>,

    /// Expire the job this many seconds after its scheduled time
    #[arg(long)]
    pub ttl_seconds: Option<u32>,

    /// Job payload as JSON
    pub payload: String,
}

/// Enqueue one job
pub async fn execute(
    args: &EnqueueArgs,
    config: &AppConfig,
    format: OutputFormat,
) -> Result<(), AppError> {
    let job = build_job(args)?;

    let pool = super::connect(config).await?;
    let result = JobQueue::new(pool.job_store()).enqueue(job).await;
    pool.close().await;
    let job = result?;

    match format {
        OutputFormat::Json => output::print_json(&job),
        OutputFormat::Table => {
            output::print_success(&format!("Job enqueued (id: {})", job.id));
            output::print_kv("Queue", &job.queue_name);
            output::print_kv("Priority", &job.priority.to_string());
            output::print_kv("Scheduled at", &job.scheduled_at.to_rfc3339());
            if let Some(expires_at) = job.expires_at {
                output::print_kv("Expires at", &expires_at.to_rfc3339());
            }
        }
    }

    Ok(())
}

fn build_job(args: &EnqueueArgs) -> Result<NewJob, AppError> {
    let payload: serde_json::Value = serde_json::from_str(&args.payload)
        .map_err(|e| AppError::validation(format!("Invalid JSON payload: {e}")))?;

    let mut job = NewJob::new(&args.queue, payload).priority(args.priority);
    if let Some(delay) = args.delay_seconds {
        job = job.scheduled_at(Utc::now() + Duration::seconds(i64::from(delay)));
    }
    if let Some(ttl) = args.ttl_seconds {
        job = job.ttl(Duration::seconds(i64::from(ttl)));
    }
    job.validate()?;
    Ok(job)
}

#[cfg(test)]
mod tests {
    use super::*;
    use stint_core::error::ErrorKind;

    fn args(payload: &str) -> EnqueueArgs {
        EnqueueArgs {
            queue: DEFAULT_QUEUE.to_string(),
            priority: DEFAULT_PRIORITY,
            delay_seconds: None,
            ttl_seconds: None,
            payload: payload.to_string(),
        }
    }

    #[test]
    fn test_build_job_from_args() {
        let mut a = args(r#"{"job_class": "SendEmail"}"#);
        a.priority = -5;
        a.delay_seconds = Some(60);
        a.ttl_seconds = Some(30);

        let job = build_job(&a).unwrap();
        assert_eq!(job.priority, -5);
        assert_eq!(job.payload["job_class"], "SendEmail");
        assert!(job.scheduled_at.unwrap() > Utc::now());
        assert_eq!(job.ttl, Some(Duration::seconds(30)));
    }

    #[test]
    fn test_invalid_payload_rejected() {
        let err = build_job(&args("{not json")).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Validation);
    }

    #[test]
    fn test_zero_ttl_rejected() {
        let mut a = args("{}");
        a.ttl_seconds = Some(0);
        assert!(build_job(&a).is_err());
    }
}
