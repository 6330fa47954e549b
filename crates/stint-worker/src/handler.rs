//! Job execution callback and a registry dispatching on job class.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::anyhow;
use async_trait::async_trait;

use stint_entity::Job;

/// Executes a claimed job.
///
/// An `Err` is reported in the job's execution event; the job is marked
/// finished either way. Retrying is left to whoever enqueued the job.
#[async_trait]
pub trait JobHandler: Send + Sync + std::fmt::Debug + 'static {
    /// Run the job described by `job.payload`.
    async fn execute(&self, job: &Job) -> anyhow::Result<()>;
}

/// Dispatches jobs to handlers registered by `payload["job_class"]`.
#[derive(Debug, Default)]
pub struct JobRegistry {
    handlers: HashMap<String, Arc<dyn JobHandler>>,
    fallback: Option<Arc<dyn JobHandler>>,
}

impl JobRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for `job_class`, replacing any previous one.
    pub fn register(&mut self, job_class: impl Into<String>, handler: Arc<dyn JobHandler>) {
        let job_class = job_class.into();
        tracing::info!(job_class = %job_class, "Registered job handler");
        self.handlers.insert(job_class, handler);
    }

    /// Handler used for jobs whose class has no registered handler.
    pub fn with_fallback(mut self, handler: Arc<dyn JobHandler>) -> Self {
        self.fallback = Some(handler);
        self
    }

    /// Check if a handler is registered for a job class.
    pub fn has_handler(&self, job_class: &str) -> bool {
        self.handlers.contains_key(job_class)
    }

    /// Registered job classes, sorted.
    pub fn registered_classes(&self) -> Vec<String> {
        let mut classes: Vec<String> = self.handlers.keys().cloned().collect();
        classes.sort();
        classes
    }

    fn resolve(&self, job: &Job) -> anyhow::Result<&Arc<dyn JobHandler>> {
        let handler = job
            .job_class()
            .and_then(|class| self.handlers.get(class))
            .or(self.fallback.as_ref());

        handler.ok_or_else(|| match job.job_class() {
            Some(class) => anyhow!("No handler registered for job class '{class}'"),
            None => anyhow!("Job {} has no job_class in its payload", job.id),
        })
    }
}

#[async_trait]
impl JobHandler for JobRegistry {
    async fn execute(&self, job: &Job) -> anyhow::Result<()> {
        self.resolve(job)?.execute(job).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use stint_entity::NewJob;

    #[derive(Debug, Default)]
    struct Counting(AtomicUsize);

    #[async_trait]
    impl JobHandler for Counting {
        async fn execute(&self, _job: &Job) -> anyhow::Result<()> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn job(payload: serde_json::Value) -> Job {
        NewJob::new("default", payload).into_job(chrono::Utc::now())
    }

    #[tokio::test]
    async fn test_dispatch_by_class() {
        let mailer = Arc::new(Counting::default());
        let mut registry = JobRegistry::new();
        registry.register("SendEmail", mailer.clone());

        registry
            .execute(&job(json!({"job_class": "SendEmail"})))
            .await
            .unwrap();

        assert_eq!(mailer.0.load(Ordering::SeqCst), 1);
        assert!(registry.has_handler("SendEmail"));
        assert_eq!(registry.registered_classes(), vec!["SendEmail".to_string()]);
    }

    #[tokio::test]
    async fn test_unknown_class_fails() {
        let registry = JobRegistry::new();

        let err = registry
            .execute(&job(json!({"job_class": "Missing"})))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Missing"));

        let err = registry.execute(&job(json!({}))).await.unwrap_err();
        assert!(err.to_string().contains("no job_class"));
    }

    #[tokio::test]
    async fn test_fallback_handles_unregistered() {
        let fallback = Arc::new(Counting::default());
        let registry = JobRegistry::new().with_fallback(fallback.clone());

        registry.execute(&job(json!({"job_class": "Other"}))).await.unwrap();
        registry.execute(&job(json!({}))).await.unwrap();

        assert_eq!(fallback.0.load(Ordering::SeqCst), 2);
    }
}
