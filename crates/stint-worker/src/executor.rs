//! Capacity-limited executor.
//!
//! A fixed number of task slots backed by a semaphore. Submissions made
//! while every slot is busy are dropped, never queued: the worker loop
//! only submits up to the capacity it observed, so a drop means the
//! capacity changed between the check and the submit.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::Semaphore;

use stint_core::error::AppError;
use stint_core::result::AppResult;

/// Pool of at most `max_size` concurrently running tasks.
#[derive(Debug)]
pub struct Executor {
    max_size: usize,
    all_slots: u32,
    slots: Arc<Semaphore>,
    closed: AtomicBool,
    dropped: AtomicU64,
}

impl Executor {
    /// Create an executor with `max_size` slots.
    ///
    /// `wait_idle` acquires every slot in one call, so the slot count must
    /// fit a `u32` as well as the semaphore's permit limit.
    pub fn new(max_size: usize) -> AppResult<Self> {
        let all_slots = u32::try_from(max_size)
            .ok()
            .filter(|_| max_size <= Semaphore::MAX_PERMITS)
            .ok_or_else(|| {
                AppError::validation(format!("Executor size {max_size} is out of range"))
            })?;

        Ok(Self {
            max_size,
            all_slots,
            slots: Arc::new(Semaphore::new(max_size)),
            closed: AtomicBool::new(false),
            dropped: AtomicU64::new(0),
        })
    }

    /// Free slots; zero once shut down.
    pub fn capacity(&self) -> usize {
        if self.is_shutdown() {
            return 0;
        }
        self.slots.available_permits()
    }

    /// Tasks currently running.
    pub fn running(&self) -> usize {
        self.max_size.saturating_sub(self.slots.available_permits())
    }

    /// Submissions dropped so far.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Run `task` in a free slot.
    ///
    /// Returns `false` and drops the task when no slot is free or the
    /// executor has been shut down.
    pub fn submit<F>(&self, task: F) -> bool
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if self.is_shutdown() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            tracing::debug!("Executor shut down, dropping task");
            return false;
        }

        let permit = match self.slots.clone().try_acquire_owned() {
            Ok(p) => p,
            Err(_) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(max_size = self.max_size, "All executor slots busy, dropping task");
                return false;
            }
        };

        tokio::spawn(async move {
            let _permit = permit;
            task.await;
        });
        true
    }

    /// Stop accepting tasks. Running tasks are unaffected.
    pub fn shutdown(&self) {
        self.closed.store(true, Ordering::Release);
    }

    /// Whether [`shutdown`](Self::shutdown) has been called.
    pub fn is_shutdown(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Wait up to `timeout` for every running task to complete.
    ///
    /// Returns `true` when the executor is idle.
    pub async fn wait_idle(&self, timeout: Duration) -> bool {
        match tokio::time::timeout(timeout, self.slots.acquire_many(self.all_slots)).await {
            Ok(Ok(_permits)) => true,
            Ok(Err(_)) => true,
            Err(_) => false,
        }
    }
}
