//! Retry-wrapped remote store
//!
//! Decorates any [`RemoteStore`] with the shared backoff primitive. Each
//! failed attempt is logged by the retry layer; exhaustion surfaces the last
//! upstream error unchanged so callers can still classify it.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::warn;

use driveshard_core::ports::{
    ChunkOutcome, DriveInfo, RemoteError, RemoteItem, RemoteStore, UploadSession,
};
use driveshard_retry::{retry, RetryConfig, RetryError};

/// [`RemoteStore`] decorator applying retry with the default retryability
/// predicate
pub struct RetryingRemote {
    inner: Arc<dyn RemoteStore>,
    config: RetryConfig,
}

impl RetryingRemote {
    /// Wraps `inner` with the given backoff configuration
    pub fn new(inner: Arc<dyn RemoteStore>, config: RetryConfig) -> Self {
        Self { inner, config }
    }

    fn flatten(operation: &str, err: RetryError<RemoteError>) -> RemoteError {
        match err {
            RetryError::Cancelled => RemoteError::Cancelled,
            RetryError::Exhausted { attempts, source } => {
                if attempts > 1 {
                    warn!(operation, attempts, error = %source, "upstream retries exhausted");
                }
                source
            }
        }
    }
}

#[async_trait::async_trait]
impl RemoteStore for RetryingRemote {
    async fn get_drive(
        &self,
        access_token: &str,
        cancel: &CancellationToken,
    ) -> Result<DriveInfo, RemoteError> {
        retry(&self.config, cancel, RemoteError::is_retryable, |_| {
            self.inner.get_drive(access_token, cancel)
        })
        .await
        .map_err(|e| Self::flatten("get_drive", e))
    }

    async fn upload_small(
        &self,
        access_token: &str,
        remote_path: &str,
        data: &[u8],
        cancel: &CancellationToken,
    ) -> Result<RemoteItem, RemoteError> {
        retry(&self.config, cancel, RemoteError::is_retryable, |_| {
            self.inner.upload_small(access_token, remote_path, data, cancel)
        })
        .await
        .map_err(|e| Self::flatten("upload_small", e))
    }

    async fn create_upload_session(
        &self,
        access_token: &str,
        remote_path: &str,
        cancel: &CancellationToken,
    ) -> Result<UploadSession, RemoteError> {
        retry(&self.config, cancel, RemoteError::is_retryable, |_| {
            self.inner.create_upload_session(access_token, remote_path, cancel)
        })
        .await
        .map_err(|e| Self::flatten("create_upload_session", e))
    }

    async fn upload_chunk(
        &self,
        access_token: &str,
        session: &UploadSession,
        data: &[u8],
        range_start: u64,
        range_end: u64,
        total: u64,
        cancel: &CancellationToken,
    ) -> Result<ChunkOutcome, RemoteError> {
        retry(&self.config, cancel, RemoteError::is_retryable, |_| {
            self.inner.upload_chunk(
                access_token,
                session,
                data,
                range_start,
                range_end,
                total,
                cancel,
            )
        })
        .await
        .map_err(|e| Self::flatten("upload_chunk", e))
    }

    async fn download(
        &self,
        access_token: &str,
        item_id: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>, RemoteError> {
        retry(&self.config, cancel, RemoteError::is_retryable, |_| {
            self.inner.download(access_token, item_id, cancel)
        })
        .await
        .map_err(|e| Self::flatten("download", e))
    }

    async fn delete(
        &self,
        access_token: &str,
        item_id: &str,
        cancel: &CancellationToken,
    ) -> Result<(), RemoteError> {
        retry(&self.config, cancel, RemoteError::is_retryable, |_| {
            self.inner.delete(access_token, item_id, cancel)
        })
        .await
        .map_err(|e| Self::flatten("delete", e))
    }
}
