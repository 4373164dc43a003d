//! SQLite pool setup for the model store
//!
//! Both constructors funnel through one open path: connect, then apply the
//! schema migration. Foreign keys are enforced on every connection, since
//! parent references in the model table are real constraints the merger
//! relies on.

use std::path::Path;
use std::time::Duration;

use replicore_core::ports::StoreError;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};

/// Owns the SQLite connection pool backing the model store
pub struct DatabasePool {
    pool: SqlitePool,
}

impl DatabasePool {
    /// Opens (creating if needed) the model store at the given path
    ///
    /// File-backed stores run in WAL mode with relaxed synchronous writes;
    /// WAL already guarantees durability at the journal level and hydration
    /// rewrites its bookmark every page anyway.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ConnectionFailed`] if the directory or the
    /// connection cannot be created, [`StoreError::MigrationFailed`] if the
    /// schema migration fails.
    pub async fn new(db_path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                StoreError::ConnectionFailed(format!(
                    "Failed to create store directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(5));

        let pool = Self::open(options, 5).await?;
        tracing::info!(path = %db_path.display(), "Model store opened");
        Ok(Self { pool })
    }

    /// Opens a throwaway in-memory store
    ///
    /// Capped at one connection: each SQLite in-memory database lives and
    /// dies with its connection, so a second connection would see an empty
    /// schema.
    pub async fn in_memory() -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::new()
            .in_memory(true)
            .foreign_keys(true);
        let pool = Self::open(options, 1).await?;
        Ok(Self { pool })
    }

    /// The underlying SQLite pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn open(
        options: SqliteConnectOptions,
        max_connections: u32,
    ) -> Result<SqlitePool, StoreError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .map_err(|e| {
                StoreError::ConnectionFailed(format!("Failed to open model store: {}", e))
            })?;

        sqlx::raw_sql(include_str!("migrations/20260830_initial.sql"))
            .execute(&pool)
            .await
            .map_err(|e| StoreError::MigrationFailed(format!("Schema migration failed: {}", e)))?;

        Ok(pool)
    }
}
