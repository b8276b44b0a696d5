pub mod models;
pub mod queries;
pub mod schema;

use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use tracing::info;

use crate::error::AuditResult;

/// Handle on the persistent audit store
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    pub async fn new(database_url: &str) -> AuditResult<Self> {
        Self::with_max_connections(database_url, 8).await
    }

    pub async fn with_max_connections(database_url: &str, max_connections: u32) -> AuditResult<Self> {
        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect_with(options)
            .await?;

        info!(url = %database_url, max_connections, "Audit store connected");
        Ok(Database { pool })
    }

    /// In-memory store for tests and dry runs.
    ///
    /// An SQLite memory database lives and dies with its connection, so the
    /// pool is pinned to exactly one connection that is never recycled.
    pub async fn new_in_memory() -> AuditResult<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        let pool = SqlitePoolOptions::new()
            .min_connections(1)
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;
        Ok(Database { pool })
    }

    pub async fn run_migrations(&self) -> AuditResult<()> {
        sqlx::raw_sql(schema::AUDIT_LOG_SCHEMA)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}
