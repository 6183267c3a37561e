//! Object repository
//!
//! Listing uses keyset pagination on `key` in lexicographic order: the query
//! asks for `max_keys + 1` rows so truncation is detected without a COUNT.

use std::str::FromStr;

use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use driveshard_core::domain::{AccountId, BucketName, ObjectKey, ObjectRecord};

use crate::rows::{escape_like, parse_datetime};
use crate::{classify, MetaError};

/// One page of a keyset-paginated object listing
#[derive(Debug)]
pub struct ObjectPage {
    /// Objects in key order
    pub objects: Vec<ObjectRecord>,
    /// Marker to pass for the next page, when truncated
    pub next_marker: Option<String>,
    /// Whether more rows exist past this page
    pub truncated: bool,
}

/// SQLite-backed object repository
pub struct ObjectStore {
    pool: SqlitePool,
}

fn object_from_row(row: &SqliteRow) -> Result<ObjectRecord, MetaError> {
    let bucket_str: String = row.get("bucket");
    let key_str: String = row.get("key");
    let account_str: String = row.get("account_id");
    let metadata_str: String = row.get("metadata");
    let created_at: String = row.get("created_at");
    let updated_at: String = row.get("updated_at");

    let bucket = BucketName::parse(&bucket_str)
        .map_err(|e| MetaError::Decode(format!("invalid bucket '{}': {}", bucket_str, e)))?;
    let key = ObjectKey::parse(&key_str)
        .map_err(|e| MetaError::Decode(format!("invalid key '{}': {}", key_str, e)))?;
    let account_id = AccountId::from_str(&account_str)
        .map_err(|e| MetaError::Decode(format!("invalid account id '{}': {}", account_str, e)))?;
    let metadata = serde_json::from_str(&metadata_str)
        .map_err(|e| MetaError::Decode(format!("invalid metadata JSON: {}", e)))?;

    Ok(ObjectRecord {
        bucket,
        key,
        account_id,
        remote_id: row.get("remote_id"),
        remote_path: row.get("remote_path"),
        size: row.get("size"),
        etag: row.get("etag"),
        mime_type: row.get("mime_type"),
        is_chunked: row.get::<i64, _>("is_chunked") != 0,
        chunk_count: row.get::<i64, _>("chunk_count") as i32,
        metadata,
        created_at: parse_datetime(&created_at)?,
        updated_at: parse_datetime(&updated_at)?,
    })
}

impl ObjectStore {
    /// Creates a new repository over the given pool
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert an object row
    ///
    /// # Errors
    /// `MetaError::Duplicate` when `(bucket, key)` already exists.
    pub async fn insert(&self, object: &ObjectRecord) -> Result<(), MetaError> {
        sqlx::query(
            "INSERT INTO objects
                 (bucket, key, account_id, remote_id, remote_path, size, etag,
                  mime_type, is_chunked, chunk_count, metadata, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(object.bucket.as_str())
        .bind(object.key.as_str())
        .bind(object.account_id.to_string())
        .bind(&object.remote_id)
        .bind(&object.remote_path)
        .bind(object.size)
        .bind(&object.etag)
        .bind(&object.mime_type)
        .bind(object.is_chunked as i64)
        .bind(object.chunk_count as i64)
        .bind(object.metadata.to_string())
        .bind(object.created_at.to_rfc3339())
        .bind(object.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| classify(e, &format!("{}/{}", object.bucket, object.key)))?;
        Ok(())
    }

    /// Fetch one object row
    pub async fn get(
        &self,
        bucket: &BucketName,
        key: &ObjectKey,
    ) -> Result<Option<ObjectRecord>, MetaError> {
        let row = sqlx::query("SELECT * FROM objects WHERE bucket = ? AND key = ?")
            .bind(bucket.as_str())
            .bind(key.as_str())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(object_from_row).transpose()
    }

    /// Delete one object row; returns false when it did not exist
    pub async fn delete(&self, bucket: &BucketName, key: &ObjectKey) -> Result<bool, MetaError> {
        let result = sqlx::query("DELETE FROM objects WHERE bucket = ? AND key = ?")
            .bind(bucket.as_str())
            .bind(key.as_str())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Keyset-paginated listing in key order
    ///
    /// Fetches `max_keys + 1` rows; the extra row, if present, only signals
    /// truncation and is not returned.
    pub async fn list(
        &self,
        bucket: &BucketName,
        prefix: Option<&str>,
        marker: Option<&str>,
        max_keys: u32,
    ) -> Result<ObjectPage, MetaError> {
        let max_keys = max_keys.clamp(1, 1000) as i64;
        let prefix_pattern = format!("{}%", escape_like(prefix.unwrap_or("")));
        let marker = marker.unwrap_or("");

        let rows = sqlx::query(
            "SELECT * FROM objects
             WHERE bucket = ? AND key > ? AND key LIKE ? ESCAPE '\\'
             ORDER BY key
             LIMIT ?",
        )
        .bind(bucket.as_str())
        .bind(marker)
        .bind(&prefix_pattern)
        .bind(max_keys + 1)
        .fetch_all(&self.pool)
        .await?;

        let truncated = rows.len() as i64 > max_keys;
        let objects: Vec<ObjectRecord> = rows
            .iter()
            .take(max_keys as usize)
            .map(object_from_row)
            .collect::<Result<_, _>>()?;

        let next_marker = if truncated {
            objects.last().map(|o| o.key.as_str().to_string())
        } else {
            None
        };

        Ok(ObjectPage {
            objects,
            next_marker,
            truncated,
        })
    }
}
