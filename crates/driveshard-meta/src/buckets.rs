//! Bucket repository

use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use driveshard_core::domain::{Bucket, BucketName};

use crate::rows::parse_datetime;
use crate::{classify, MetaError};

/// SQLite-backed bucket repository
pub struct BucketStore {
    pool: SqlitePool,
}

fn bucket_from_row(row: &SqliteRow) -> Result<Bucket, MetaError> {
    let name_str: String = row.get("name");
    let name = BucketName::parse(&name_str)
        .map_err(|e| MetaError::Decode(format!("invalid bucket name '{}': {}", name_str, e)))?;
    let created_at: String = row.get("created_at");
    let updated_at: String = row.get("updated_at");

    Ok(Bucket {
        name,
        object_count: row.get("object_count"),
        total_size: row.get("total_size"),
        created_at: parse_datetime(&created_at)?,
        updated_at: parse_datetime(&updated_at)?,
    })
}

impl BucketStore {
    /// Creates a new repository over the given pool
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert a bucket row
    ///
    /// # Errors
    /// `MetaError::Duplicate` when the name is taken.
    pub async fn create(&self, bucket: &Bucket) -> Result<(), MetaError> {
        sqlx::query(
            "INSERT INTO buckets (name, object_count, total_size, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(bucket.name.as_str())
        .bind(bucket.object_count)
        .bind(bucket.total_size)
        .bind(bucket.created_at.to_rfc3339())
        .bind(bucket.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| classify(e, bucket.name.as_str()))?;
        Ok(())
    }

    /// Fetch a bucket by name
    pub async fn get(&self, name: &BucketName) -> Result<Option<Bucket>, MetaError> {
        let row = sqlx::query("SELECT * FROM buckets WHERE name = ?")
            .bind(name.as_str())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(bucket_from_row).transpose()
    }

    /// List all buckets ordered by name
    pub async fn list(&self) -> Result<Vec<Bucket>, MetaError> {
        let rows = sqlx::query("SELECT * FROM buckets ORDER BY name")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(bucket_from_row).collect()
    }

    /// Delete a bucket row; returns false when it did not exist
    pub async fn delete(&self, name: &BucketName) -> Result<bool, MetaError> {
        let result = sqlx::query("DELETE FROM buckets WHERE name = ?")
            .bind(name.as_str())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Recompute `object_count` and `total_size` from the objects table
    ///
    /// Called after every object mutation; aggregates are eventually
    /// consistent, not transactional with the mutation itself.
    pub async fn recompute_aggregates(&self, name: &BucketName) -> Result<(), MetaError> {
        sqlx::query(
            "UPDATE buckets SET
                 object_count = (SELECT COUNT(*) FROM objects WHERE bucket = ?1),
                 total_size   = (SELECT COALESCE(SUM(size), 0) FROM objects WHERE bucket = ?1),
                 updated_at   = ?2
             WHERE name = ?1",
        )
        .bind(name.as_str())
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
