//! Object-chunk repository
//!
//! Bookkeeping rows for resumable uploads. Rows are cascade-deleted with the
//! parent object; the object service also clears them explicitly once an
//! upload completes.

use std::str::FromStr;

use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use driveshard_core::domain::{AccountId, BucketName, ChunkState, ObjectChunk, ObjectKey};

use crate::rows::parse_datetime;
use crate::MetaError;

/// SQLite-backed chunk repository
pub struct ChunkStore {
    pool: SqlitePool,
}

fn chunk_from_row(row: &SqliteRow) -> Result<ObjectChunk, MetaError> {
    let bucket_str: String = row.get("bucket");
    let key_str: String = row.get("key");
    let account_str: String = row.get("account_id");
    let status_str: String = row.get("status");
    let created_at: String = row.get("created_at");

    Ok(ObjectChunk {
        bucket: BucketName::parse(&bucket_str)
            .map_err(|e| MetaError::Decode(format!("invalid bucket '{}': {}", bucket_str, e)))?,
        key: ObjectKey::parse(&key_str)
            .map_err(|e| MetaError::Decode(format!("invalid key '{}': {}", key_str, e)))?,
        chunk_index: row.get::<i64, _>("chunk_index") as i32,
        account_id: AccountId::from_str(&account_str)
            .map_err(|e| MetaError::Decode(format!("invalid account id: {}", e)))?,
        chunk_size: row.get("chunk_size"),
        checksum: row.get("checksum"),
        status: ChunkState::parse(&status_str)
            .map_err(|e| MetaError::Decode(e.to_string()))?,
        created_at: parse_datetime(&created_at)?,
    })
}

impl ChunkStore {
    /// Creates a new repository over the given pool
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert or replace a chunk row
    pub async fn upsert(&self, chunk: &ObjectChunk) -> Result<(), MetaError> {
        sqlx::query(
            "INSERT OR REPLACE INTO object_chunks
                 (bucket, key, chunk_index, account_id, chunk_size, checksum, status, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(chunk.bucket.as_str())
        .bind(chunk.key.as_str())
        .bind(chunk.chunk_index as i64)
        .bind(chunk.account_id.to_string())
        .bind(chunk.chunk_size)
        .bind(&chunk.checksum)
        .bind(chunk.status.as_str())
        .bind(chunk.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Update the state of one chunk row
    pub async fn set_status(
        &self,
        bucket: &BucketName,
        key: &ObjectKey,
        chunk_index: i32,
        status: ChunkState,
    ) -> Result<(), MetaError> {
        sqlx::query(
            "UPDATE object_chunks SET status = ?
             WHERE bucket = ? AND key = ? AND chunk_index = ?",
        )
        .bind(status.as_str())
        .bind(bucket.as_str())
        .bind(key.as_str())
        .bind(chunk_index as i64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Flip every non-uploaded chunk of an object to `failed`
    ///
    /// Used when an upload is cancelled so the caller can find and clean the
    /// leftovers.
    pub async fn fail_pending(
        &self,
        bucket: &BucketName,
        key: &ObjectKey,
    ) -> Result<u64, MetaError> {
        let result = sqlx::query(
            "UPDATE object_chunks SET status = 'failed'
             WHERE bucket = ? AND key = ? AND status = 'pending'",
        )
        .bind(bucket.as_str())
        .bind(key.as_str())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Remove every chunk row of an object
    pub async fn clear(&self, bucket: &BucketName, key: &ObjectKey) -> Result<(), MetaError> {
        sqlx::query("DELETE FROM object_chunks WHERE bucket = ? AND key = ?")
            .bind(bucket.as_str())
            .bind(key.as_str())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Chunk rows of an object in index order
    pub async fn list(
        &self,
        bucket: &BucketName,
        key: &ObjectKey,
    ) -> Result<Vec<ObjectChunk>, MetaError> {
        let rows = sqlx::query(
            "SELECT * FROM object_chunks WHERE bucket = ? AND key = ? ORDER BY chunk_index",
        )
        .bind(bucket.as_str())
        .bind(key.as_str())
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(chunk_from_row).collect()
    }
}
