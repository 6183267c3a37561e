//! Error taxonomy
//!
//! Every client-visible failure is one of these tagged variants. Each variant
//! carries a stable machine code and maps to an HTTP status; the adapter layer
//! renders them as `{"error": {"code", "message", "details"}}` envelopes.

use serde_json::Value;
use thiserror::Error;

/// Errors surfaced by the storage engine
#[derive(Debug, Error)]
pub enum StorageError {
    /// Malformed or semantically invalid request
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Bucket name violates the naming rules
    #[error("invalid bucket name: {0}")]
    InvalidBucket(String),

    /// Object key violates the key rules
    #[error("invalid object key: {0}")]
    InvalidKey(String),

    /// VFS path cannot be normalised
    #[error("invalid path: {0}")]
    InvalidPath(String),

    /// Bucket does not exist
    #[error("bucket not found: {0}")]
    BucketNotFound(String),

    /// Object does not exist
    #[error("object not found: {bucket}/{key}")]
    ObjectNotFound {
        /// Bucket the lookup ran against
        bucket: String,
        /// Missing object key
        key: String,
    },

    /// VFS path does not exist
    #[error("path not found: {0}")]
    PathNotFound(String),

    /// Storage account does not exist
    #[error("storage account not found: {0}")]
    AccountNotFound(String),

    /// Bucket already exists
    #[error("bucket already exists: {0}")]
    BucketExists(String),

    /// Object already exists
    #[error("object already exists: {bucket}/{key}")]
    ObjectExists {
        /// Bucket the conflict occurred in
        bucket: String,
        /// Conflicting object key
        key: String,
    },

    /// VFS path already exists
    #[error("path already exists: {0}")]
    PathExists(String),

    /// Bucket still contains objects
    #[error("bucket not empty: {0}")]
    BucketNotEmpty(String),

    /// Directory still contains entries and the delete was not recursive
    #[error("directory not empty: {0}")]
    DirNotEmpty(String),

    /// Payload exceeds the configured maximum
    #[error("file too large: {size} bytes exceeds limit of {limit}")]
    FileTooLarge {
        /// Size of the rejected payload
        size: u64,
        /// Configured maximum
        limit: u64,
    },

    /// No storage account can hold the payload
    #[error("no storage account has {required} bytes available")]
    StorageFull {
        /// Bytes the write needed
        required: u64,
    },

    /// Unexpected failure inside the engine or the metadata store
    #[error("internal error: {0}")]
    Internal(String),

    /// Upstream drive API failure after retries were exhausted
    #[error("upstream error: {0}")]
    Upstream(String),

    /// Engine is temporarily unable to serve the request
    #[error("service unavailable: {0}")]
    Unavailable(String),
}

impl StorageError {
    /// Stable machine-readable code for the error envelope
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidRequest(_) => "INVALID_REQUEST",
            Self::InvalidBucket(_) => "INVALID_BUCKET",
            Self::InvalidKey(_) => "INVALID_KEY",
            Self::InvalidPath(_) => "INVALID_PATH",
            Self::BucketNotFound(_) => "BUCKET_NOT_FOUND",
            Self::ObjectNotFound { .. } => "OBJECT_NOT_FOUND",
            Self::PathNotFound(_) => "PATH_NOT_FOUND",
            Self::AccountNotFound(_) => "ACCOUNT_NOT_FOUND",
            Self::BucketExists(_) => "BUCKET_EXISTS",
            Self::ObjectExists { .. } => "OBJECT_EXISTS",
            Self::PathExists(_) => "PATH_EXISTS",
            Self::BucketNotEmpty(_) => "BUCKET_NOT_EMPTY",
            Self::DirNotEmpty(_) => "DIR_NOT_EMPTY",
            Self::FileTooLarge { .. } => "FILE_TOO_LARGE",
            Self::StorageFull { .. } => "STORAGE_FULL",
            Self::Internal(_) => "INTERNAL_ERROR",
            Self::Upstream(_) => "UPSTREAM_ERROR",
            Self::Unavailable(_) => "SERVICE_UNAVAIL",
        }
    }

    /// Mapped HTTP status code
    #[must_use]
    pub fn http_status(&self) -> u16 {
        match self {
            Self::InvalidRequest(_)
            | Self::InvalidBucket(_)
            | Self::InvalidKey(_)
            | Self::InvalidPath(_) => 400,
            Self::BucketNotFound(_)
            | Self::ObjectNotFound { .. }
            | Self::PathNotFound(_)
            | Self::AccountNotFound(_) => 404,
            Self::BucketExists(_)
            | Self::ObjectExists { .. }
            | Self::PathExists(_)
            | Self::BucketNotEmpty(_)
            | Self::DirNotEmpty(_) => 409,
            Self::FileTooLarge { .. } => 413,
            Self::StorageFull { .. } => 507,
            Self::Internal(_) => 500,
            Self::Upstream(_) => 502,
            Self::Unavailable(_) => 503,
        }
    }

    /// Optional structured details for the error envelope
    #[must_use]
    pub fn details(&self) -> Option<Value> {
        match self {
            Self::ObjectNotFound { bucket, key } | Self::ObjectExists { bucket, key } => {
                Some(serde_json::json!({ "bucket": bucket, "key": key }))
            }
            Self::FileTooLarge { size, limit } => {
                Some(serde_json::json!({ "size": size, "limit": limit }))
            }
            Self::StorageFull { required } => Some(serde_json::json!({ "required": required })),
            _ => None,
        }
    }

    /// Returns true when the client caused the error (4xx band)
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.http_status())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_and_statuses() {
        let cases: Vec<(StorageError, &str, u16)> = vec![
            (
                StorageError::InvalidRequest("x".into()),
                "INVALID_REQUEST",
                400,
            ),
            (
                StorageError::InvalidBucket("x".into()),
                "INVALID_BUCKET",
                400,
            ),
            (StorageError::InvalidKey("x".into()), "INVALID_KEY", 400),
            (StorageError::InvalidPath("x".into()), "INVALID_PATH", 400),
            (
                StorageError::BucketNotFound("b".into()),
                "BUCKET_NOT_FOUND",
                404,
            ),
            (
                StorageError::ObjectNotFound {
                    bucket: "b".into(),
                    key: "k".into(),
                },
                "OBJECT_NOT_FOUND",
                404,
            ),
            (StorageError::PathNotFound("/p".into()), "PATH_NOT_FOUND", 404),
            (
                StorageError::AccountNotFound("a".into()),
                "ACCOUNT_NOT_FOUND",
                404,
            ),
            (StorageError::BucketExists("b".into()), "BUCKET_EXISTS", 409),
            (
                StorageError::ObjectExists {
                    bucket: "b".into(),
                    key: "k".into(),
                },
                "OBJECT_EXISTS",
                409,
            ),
            (StorageError::PathExists("/p".into()), "PATH_EXISTS", 409),
            (
                StorageError::BucketNotEmpty("b".into()),
                "BUCKET_NOT_EMPTY",
                409,
            ),
            (StorageError::DirNotEmpty("/d".into()), "DIR_NOT_EMPTY", 409),
            (
                StorageError::FileTooLarge { size: 2, limit: 1 },
                "FILE_TOO_LARGE",
                413,
            ),
            (
                StorageError::StorageFull { required: 10 },
                "STORAGE_FULL",
                507,
            ),
            (StorageError::Internal("x".into()), "INTERNAL_ERROR", 500),
            (StorageError::Upstream("x".into()), "UPSTREAM_ERROR", 502),
            (
                StorageError::Unavailable("x".into()),
                "SERVICE_UNAVAIL",
                503,
            ),
        ];

        for (err, code, status) in cases {
            assert_eq!(err.code(), code);
            assert_eq!(err.http_status(), status);
        }
    }

    #[test]
    fn test_details_present_where_expected() {
        let err = StorageError::FileTooLarge {
            size: 100,
            limit: 50,
        };
        let details = err.details().unwrap();
        assert_eq!(details["size"], 100);
        assert_eq!(details["limit"], 50);

        assert!(StorageError::Internal("boom".into()).details().is_none());
    }

    #[test]
    fn test_client_error_band() {
        assert!(StorageError::InvalidKey("k".into()).is_client_error());
        assert!(!StorageError::Internal("x".into()).is_client_error());
        assert!(!StorageError::StorageFull { required: 1 }.is_client_error());
    }
}
