//! Object and object-chunk entities

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::ids::AccountId;
use super::names::{BucketName, ObjectKey};
use crate::error::StorageError;

/// Metadata row for one stored blob
///
/// Every object has exactly one backing location: an upstream account
/// (`account_id` set, `remote_id` non-empty) or the local filesystem
/// (`account_id` is the nil sentinel, `remote_path` names the local file).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectRecord {
    /// Owning bucket
    pub bucket: BucketName,
    /// Object key, unique within the bucket
    pub key: ObjectKey,
    /// Backing account, or the nil sentinel for local storage
    pub account_id: AccountId,
    /// Opaque upstream item id (empty for local objects)
    pub remote_id: String,
    /// Upstream path, or the local file path for local objects
    pub remote_path: String,
    /// Size in bytes
    pub size: i64,
    /// Hex MD5 of the bytes at upload time
    pub etag: String,
    /// MIME type supplied at upload
    pub mime_type: String,
    /// Whether the object went through a resumable upload session
    pub is_chunked: bool,
    /// Number of chunks for chunked objects, 0 otherwise
    pub chunk_count: i32,
    /// Free-form caller metadata
    pub metadata: Value,
    /// When the object was created
    pub created_at: DateTime<Utc>,
    /// When the row was last updated
    pub updated_at: DateTime<Utc>,
}

impl ObjectRecord {
    /// Returns true when the bytes live on the local filesystem
    #[must_use]
    pub fn is_local(&self) -> bool {
        self.account_id.is_nil()
    }
}

/// Upload state of a single chunk row
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkState {
    /// Recorded but not yet uploaded
    #[default]
    Pending,
    /// Accepted by the upload session
    Uploaded,
    /// Upload failed or was cancelled
    Failed,
}

impl ChunkState {
    /// Storage representation
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Uploaded => "uploaded",
            Self::Failed => "failed",
        }
    }

    /// Parse the storage representation
    ///
    /// # Errors
    /// Returns `StorageError::Internal` for an unknown state string.
    pub fn parse(s: &str) -> Result<Self, StorageError> {
        match s {
            "pending" => Ok(Self::Pending),
            "uploaded" => Ok(Self::Uploaded),
            "failed" => Ok(Self::Failed),
            other => Err(StorageError::Internal(format!(
                "unknown chunk state: {other}"
            ))),
        }
    }
}

impl std::fmt::Display for ChunkState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One slice of a resumable upload
///
/// Chunk rows are cascade-deleted with their parent object and cleared by
/// the object service once the whole upload completes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectChunk {
    /// Owning bucket
    pub bucket: BucketName,
    /// Parent object key
    pub key: ObjectKey,
    /// Zero-based slice index
    pub chunk_index: i32,
    /// Account the slice was sent to
    pub account_id: AccountId,
    /// Slice size in bytes
    pub chunk_size: i64,
    /// Hex MD5 of the slice bytes
    pub checksum: String,
    /// Upload state
    pub status: ChunkState,
    /// When the row was recorded
    pub created_at: DateTime<Utc>,
}
