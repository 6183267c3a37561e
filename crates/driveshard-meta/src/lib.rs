//! DriveShard Meta - Relational metadata persistence
//!
//! SQLite-backed stores for:
//! - Buckets and their aggregates
//! - Object rows and chunk bookkeeping
//! - Storage accounts (credentials, tokens, quota, status)
//! - The virtual directory/file tree

use thiserror::Error;

pub mod accounts;
pub mod buckets;
pub mod chunks;
pub mod objects;
pub mod pool;
pub(crate) mod rows;
pub mod vfs;

pub use accounts::AccountStore;
pub use buckets::BucketStore;
pub use chunks::ChunkStore;
pub use objects::{ObjectPage, ObjectStore};
pub use pool::DatabasePool;
pub use vfs::VfsStore;

use driveshard_core::StorageError;

/// Errors raised by the metadata store
#[derive(Debug, Error)]
pub enum MetaError {
    /// Could not open or connect to the database
    #[error("database connection failed: {0}")]
    ConnectionFailed(String),

    /// Schema migration failed
    #[error("migration failed: {0}")]
    MigrationFailed(String),

    /// A uniqueness constraint was violated
    #[error("duplicate row: {0}")]
    Duplicate(String),

    /// A stored value could not be decoded into its domain type
    #[error("row decode failed: {0}")]
    Decode(String),

    /// Any other database failure
    #[error("query failed: {0}")]
    Query(#[from] sqlx::Error),
}

impl MetaError {
    /// Returns true when the error is a uniqueness-constraint violation
    #[must_use]
    pub fn is_duplicate(&self) -> bool {
        matches!(self, Self::Duplicate(_))
    }
}

impl From<MetaError> for StorageError {
    fn from(err: MetaError) -> Self {
        StorageError::Internal(err.to_string())
    }
}

/// Classify a sqlx error, detecting unique-constraint violations
pub(crate) fn classify(err: sqlx::Error, what: &str) -> MetaError {
    if let sqlx::Error::Database(ref db) = err {
        if db.kind() == sqlx::error::ErrorKind::UniqueViolation {
            return MetaError::Duplicate(what.to_string());
        }
    }
    MetaError::Query(err)
}
