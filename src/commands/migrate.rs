//! Database migration command.

use stint_core::config::AppConfig;
use stint_core::error::AppError;
use stint_database::run_migrations;

use crate::output;

/// Apply all pending migrations for the configured backend
pub async fn execute(config: &AppConfig) -> Result<(), AppError> {
    let pool = super::connect(config).await?;

    println!("Running {} migrations...", pool.backend());
    let result = run_migrations(&pool).await;
    pool.close().await;
    result?;

    output::print_success("All migrations applied successfully.");
    Ok(())
}
