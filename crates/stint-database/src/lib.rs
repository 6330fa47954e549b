//! # stint-database
//!
//! Connection management, migrations and the PostgreSQL and SQLite
//! implementations of the [`JobStore`] claim/lease protocol.

pub mod connection;
pub mod migration;
pub mod repositories;
pub mod store;

pub use connection::DatabasePool;
pub use migration::run_migrations;
pub use repositories::{PgJobStore, SqliteJobStore};
pub use store::{JobStore, task_owner, worker_owner_pattern};
