//! Job store implementations, one per backend.

pub mod postgres;
pub mod sqlite;
pub(crate) mod sql;

pub use postgres::PgJobStore;
pub use sqlite::SqliteJobStore;
