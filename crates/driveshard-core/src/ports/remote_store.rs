//! Remote drive port
//!
//! Interface to one upstream cloud-drive account. The client is stateless:
//! every call takes the bearer access token, so a single implementation
//! serves the whole account pool. All operations accept a cancellation
//! handle; cancellation short-circuits promptly rather than waiting for the
//! HTTP round-trip.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Quota block from the upstream drive
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriveQuota {
    /// Total quota in bytes
    pub total: u64,
    /// Used bytes
    pub used: u64,
    /// Remaining bytes
    pub remaining: u64,
    /// Provider-reported quota state (e.g. "normal", "nearing")
    pub state: String,
}

/// Drive descriptor returned by the drive-info call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriveInfo {
    /// Provider drive id
    pub id: String,
    /// Owner display name
    pub owner_name: String,
    /// Owner email, when the provider exposes one
    pub owner_email: Option<String>,
    /// Quota block
    pub quota: DriveQuota,
}

/// Item descriptor returned after uploads and metadata reads
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteItem {
    /// Provider item id
    pub id: String,
    /// Item name
    pub name: String,
    /// Size in bytes
    pub size: u64,
    /// MIME type, when reported
    pub mime_type: Option<String>,
    /// Provider content hash, when reported
    pub hash: Option<String>,
    /// Creation timestamp
    pub created: Option<DateTime<Utc>>,
    /// Last-modified timestamp
    pub modified: Option<DateTime<Utc>>,
}

/// A resumable upload session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadSession {
    /// Absolute URL chunks are PUT to
    pub upload_url: String,
    /// When the session expires
    pub expires_at: Option<DateTime<Utc>>,
}

/// Result of one chunk PUT
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChunkOutcome {
    /// Intermediate chunk accepted (HTTP 202)
    Accepted,
    /// Final chunk; the upload is complete and the item descriptor is returned
    Complete(RemoteItem),
}

/// Failure talking to the upstream drive
///
/// Variants are structured so the retry primitive can classify them without
/// string matching.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RemoteError {
    /// The request timed out
    #[error("upstream request timed out")]
    Timeout,

    /// Connection-level failure (reset, refused, DNS, truncated body)
    #[error("upstream connection error: {0}")]
    Connection(String),

    /// Upstream answered with a non-success HTTP status
    #[error("upstream returned status {status}: {message}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Response body or reason phrase
        message: String,
    },

    /// The resumable upload session is gone (expired or revoked)
    #[error("upload session expired")]
    SessionExpired,

    /// The operation was cancelled by the caller
    #[error("operation cancelled")]
    Cancelled,

    /// Anything else (serialization, malformed response)
    #[error("{0}")]
    Other(String),
}

impl RemoteError {
    /// Default retryability predicate: network timeouts, connection-level
    /// failures, and upstream 429/500/502/503/504.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout | Self::Connection(_) => true,
            Self::Status { status, .. } => matches!(status, 429 | 500 | 502 | 503 | 504),
            Self::SessionExpired | Self::Cancelled | Self::Other(_) => false,
        }
    }
}

/// Port trait for upstream drive operations
///
/// Implementations must be idempotency-tolerant at the protocol layer; the
/// caller decides whether retrying a given operation is safe.
#[async_trait::async_trait]
pub trait RemoteStore: Send + Sync {
    /// Fetch the drive descriptor (id, owner, quota)
    async fn get_drive(
        &self,
        access_token: &str,
        cancel: &CancellationToken,
    ) -> Result<DriveInfo, RemoteError>;

    /// Upload a payload of at most 4 MiB in a single PUT
    async fn upload_small(
        &self,
        access_token: &str,
        remote_path: &str,
        data: &[u8],
        cancel: &CancellationToken,
    ) -> Result<RemoteItem, RemoteError>;

    /// Create a resumable upload session for the given path
    async fn create_upload_session(
        &self,
        access_token: &str,
        remote_path: &str,
        cancel: &CancellationToken,
    ) -> Result<UploadSession, RemoteError>;

    /// PUT one chunk to an upload session
    ///
    /// `range_start..=range_end` is the inclusive byte range; `total` is the
    /// final object size. HTTP 200/201 complete the session, 202 accepts an
    /// intermediate chunk.
    async fn upload_chunk(
        &self,
        access_token: &str,
        session: &UploadSession,
        data: &[u8],
        range_start: u64,
        range_end: u64,
        total: u64,
        cancel: &CancellationToken,
    ) -> Result<ChunkOutcome, RemoteError>;

    /// Download an item's bytes by id (metadata fetch, then content fetch)
    async fn download(
        &self,
        access_token: &str,
        item_id: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>, RemoteError>;

    /// Delete an item by id; 200 and 204 both count as success
    async fn delete(
        &self,
        access_token: &str,
        item_id: &str,
        cancel: &CancellationToken,
    ) -> Result<(), RemoteError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_statuses() {
        for status in [429u16, 500, 502, 503, 504] {
            let err = RemoteError::Status {
                status,
                message: String::new(),
            };
            assert!(err.is_retryable(), "status {status} should be retryable");
        }
        for status in [400u16, 401, 403, 404, 409, 413] {
            let err = RemoteError::Status {
                status,
                message: String::new(),
            };
            assert!(!err.is_retryable(), "status {status} should not be retryable");
        }
    }

    #[test]
    fn test_retryable_network_errors() {
        assert!(RemoteError::Timeout.is_retryable());
        assert!(RemoteError::Connection("reset".into()).is_retryable());
        assert!(!RemoteError::Cancelled.is_retryable());
        assert!(!RemoteError::SessionExpired.is_retryable());
    }
}
