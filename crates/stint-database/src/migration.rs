//! Database migration runner.

use sqlx::migrate::Migrator;
use tracing::info;

use stint_core::error::{AppError, ErrorKind};

use crate::connection::DatabasePool;

static POSTGRES_MIGRATIONS: Migrator = sqlx::migrate!("../../migrations/postgres");
static SQLITE_MIGRATIONS: Migrator = sqlx::migrate!("../../migrations/sqlite");

/// Run all pending database migrations for the pool's backend.
pub async fn run_migrations(pool: &DatabasePool) -> Result<(), AppError> {
    info!(backend = pool.backend(), "Running database migrations...");

    let result = match pool {
        DatabasePool::Postgres(pool) => POSTGRES_MIGRATIONS.run(pool).await,
        DatabasePool::Sqlite(pool) => SQLITE_MIGRATIONS.run(pool).await,
    };

    result.map_err(|e| {
        AppError::with_source(
            ErrorKind::Database,
            format!("Failed to run migrations: {e}"),
            e,
        )
    })?;

    info!("Database migrations completed successfully");
    Ok(())
}
