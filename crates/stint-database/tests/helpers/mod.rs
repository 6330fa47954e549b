//! Shared helpers for job store integration tests.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, SubsecRound, Utc};
use uuid::Uuid;

use stint_core::config::DatabaseConfig;
use stint_database::{DatabasePool, JobStore, run_migrations};

/// Environment variable naming a scratch PostgreSQL database.
pub const POSTGRES_URL_ENV: &str = "STINT_TEST_DATABASE_URL";

/// A migrated store plus the pool behind it.
pub struct TestStore {
    pub pool: DatabasePool,
    pub store: Arc<dyn JobStore>,
    _file: Option<ScratchFile>,
}

impl TestStore {
    /// Fresh in-memory SQLite store. Pinned to a single connection.
    pub async fn sqlite() -> Self {
        Self::open("sqlite::memory:").await
    }

    /// Fresh file-backed SQLite store with a multi-connection pool.
    pub async fn sqlite_file() -> Self {
        let file = ScratchFile::new();
        let mut test = Self::open(&file.url()).await;
        test._file = Some(file);
        test
    }

    /// PostgreSQL store, or `None` when no test database is configured.
    pub async fn postgres() -> Option<Self> {
        let url = std::env::var(POSTGRES_URL_ENV).ok()?;
        Some(Self::open(&url).await)
    }

    async fn open(url: &str) -> Self {
        let pool = DatabasePool::connect(&DatabaseConfig::new(url))
            .await
            .expect("Failed to connect to test database");
        run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        let store = pool.job_store();
        Self {
            pool,
            store,
            _file: None,
        }
    }
}

/// SQLite database file removed on drop, WAL files included.
pub struct ScratchFile {
    path: PathBuf,
}

impl ScratchFile {
    pub fn new() -> Self {
        let path = std::env::temp_dir().join(format!("stint-test-{}.db", Uuid::new_v4().simple()));
        Self { path }
    }

    pub fn url(&self) -> String {
        format!("sqlite://{}", self.path.display())
    }
}

impl Drop for ScratchFile {
    fn drop(&mut self) {
        for suffix in ["", "-wal", "-shm"] {
            let mut path = self.path.clone().into_os_string();
            path.push(suffix);
            let _ = std::fs::remove_file(path);
        }
    }
}

/// Queue name no other test uses.
pub fn unique_queue() -> String {
    format!("q-{}", Uuid::new_v4().simple())
}

/// Current time at the precision every backend stores.
pub fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}
