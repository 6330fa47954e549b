//! Repository implementations for Stint entities.

pub mod job;

pub use job::{PgJobStore, SqliteJobStore};
