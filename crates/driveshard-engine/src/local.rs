//! Local-disk blob fallback
//!
//! Objects land under `<root>/<bucket>/<key>` when remote mode is disabled
//! or no active account exists. Keys may contain `/` and become nested
//! directories; `.` and `..` segments are rejected so a key can never escape
//! the storage root.

use std::path::PathBuf;

use tracing::debug;

use driveshard_core::domain::{BucketName, ObjectKey};
use driveshard_core::StorageError;

/// Filesystem blob store rooted at a configured directory
pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    /// Creates a store rooted at `root` (typically `data/storage`)
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// Absolute path for a blob
    ///
    /// # Errors
    /// `StorageError::InvalidKey` when a key segment is `.` or `..`.
    pub fn blob_path(&self, bucket: &BucketName, key: &ObjectKey) -> Result<PathBuf, StorageError> {
        if key.as_str().split('/').any(|seg| seg == "." || seg == "..") {
            return Err(StorageError::InvalidKey(format!(
                "key may not contain dot segments in local mode: {}",
                key.as_str()
            )));
        }
        let mut path = self.root.join(bucket.as_str());
        for segment in key.as_str().split('/').filter(|s| !s.is_empty()) {
            path.push(segment);
        }
        Ok(path)
    }

    /// Write blob bytes, creating parent directories as needed
    ///
    /// Returns the path the blob was written to.
    pub async fn write(
        &self,
        bucket: &BucketName,
        key: &ObjectKey,
        data: &[u8],
    ) -> Result<PathBuf, StorageError> {
        let path = self.blob_path(bucket, key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StorageError::Internal(format!("creating blob directory: {e}")))?;
        }
        tokio::fs::write(&path, data)
            .await
            .map_err(|e| StorageError::Internal(format!("writing local blob: {e}")))?;
        debug!(path = %path.display(), bytes = data.len(), "wrote local blob");
        Ok(path)
    }

    /// Read blob bytes; a missing file surfaces as `OBJECT_NOT_FOUND`
    pub async fn read(
        &self,
        bucket: &BucketName,
        key: &ObjectKey,
    ) -> Result<Vec<u8>, StorageError> {
        let path = self.blob_path(bucket, key)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::ObjectNotFound {
                    bucket: bucket.as_str().to_string(),
                    key: key.as_str().to_string(),
                })
            }
            Err(e) => Err(StorageError::Internal(format!("reading local blob: {e}"))),
        }
    }

    /// Remove a blob; missing files are fine
    pub async fn remove(&self, bucket: &BucketName, key: &ObjectKey) -> Result<(), StorageError> {
        let path = self.blob_path(bucket, key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::Internal(format!("removing local blob: {e}"))),
        }
    }
}
