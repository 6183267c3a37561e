//! Database connection pool management
//!
//! Provides a wrapper around SQLx's SqlitePool with:
//! - Automatic directory creation for database files
//! - WAL journal mode for concurrent reads
//! - Foreign-key enforcement on every connection
//! - Automatic schema migration on first connection
//! - In-memory mode for testing

use std::path::Path;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};

use crate::MetaError;

/// Manages a pool of SQLite connections for DriveShard metadata
///
/// The pool is configured with:
/// - WAL journal mode for concurrent read access
/// - Foreign keys enabled (cascades depend on it)
/// - A 5-second busy timeout to handle write contention
/// - 1 connection for in-memory databases (required for data persistence)
pub struct DatabasePool {
    pool: SqlitePool,
}

impl DatabasePool {
    /// Creates a new database pool connected to the specified file
    ///
    /// This will:
    /// 1. Create parent directories if they don't exist
    /// 2. Create the database file if it doesn't exist
    /// 3. Enable WAL journal mode and foreign keys
    /// 4. Run schema migrations
    ///
    /// # Errors
    ///
    /// Returns `MetaError::ConnectionFailed` if the connection cannot be
    /// established, or `MetaError::MigrationFailed` if migrations fail.
    pub async fn new(db_path: &Path, max_connections: u32) -> Result<Self, MetaError> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                MetaError::ConnectionFailed(format!(
                    "failed to create database directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .foreign_keys(true)
            .busy_timeout(std::time::Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect_with(options)
            .await
            .map_err(|e| {
                MetaError::ConnectionFailed(format!(
                    "failed to connect to database at {}: {}",
                    db_path.display(),
                    e
                ))
            })?;

        Self::run_migrations(&pool).await?;

        tracing::info!(
            path = %db_path.display(),
            max_connections,
            "database pool initialized"
        );

        Ok(Self { pool })
    }

    /// Creates an in-memory database pool for testing
    ///
    /// Uses a single connection to ensure data persistence across queries
    /// (SQLite in-memory databases are per-connection).
    ///
    /// # Errors
    ///
    /// Returns `MetaError::ConnectionFailed` if the connection cannot be
    /// established, or `MetaError::MigrationFailed` if migrations fail.
    pub async fn in_memory() -> Result<Self, MetaError> {
        let options = SqliteConnectOptions::new()
            .filename(":memory:")
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(|e| {
                MetaError::ConnectionFailed(format!("failed to create in-memory database: {}", e))
            })?;

        Self::run_migrations(&pool).await?;

        tracing::debug!("in-memory database pool initialized");

        Ok(Self { pool })
    }

    /// Returns a reference to the underlying SQLite connection pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Lightweight liveness probe used by the health endpoint
    ///
    /// # Errors
    /// Returns the underlying query error when the database is unreachable.
    pub async fn ping(&self) -> Result<(), MetaError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    /// Runs the initial schema migration
    async fn run_migrations(pool: &SqlitePool) -> Result<(), MetaError> {
        let migration_sql = include_str!("migrations/0001_schema.sql");
        sqlx::raw_sql(migration_sql)
            .execute(pool)
            .await
            .map_err(|e| MetaError::MigrationFailed(format!("initial migration failed: {}", e)))?;

        tracing::debug!("database migrations completed");
        Ok(())
    }
}
