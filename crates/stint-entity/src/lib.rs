//! # stint-entity
//!
//! Domain entity models for Stint. [`job::Job`] mirrors one row of the
//! jobs table and derives `sqlx::FromRow` so both the PostgreSQL and the
//! SQLite store decode into it.

pub mod job;

pub use job::{DEFAULT_PRIORITY, DEFAULT_QUEUE, Job, JobState, NewJob, QueueStats};
