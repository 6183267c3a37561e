//! Object service
//!
//! Validates names, hashes content, picks a backend and keeps the metadata
//! store consistent with it. The backend is decided per upload: the account
//! pool when remote mode is on and active accounts exist, the local
//! filesystem otherwise. Bucket aggregates are recomputed after every
//! mutation (eventually consistent, never transactional with the mutation).

use std::sync::Arc;

use chrono::Utc;
use md5::{Digest, Md5};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use driveshard_core::config::UploadConfig;
use driveshard_core::domain::{AccountId, Bucket, BucketName, ObjectKey, ObjectRecord};
use driveshard_core::ports::{RemoteError, RemoteStore};
use driveshard_core::StorageError;
use driveshard_meta::{BucketStore, ChunkStore, MetaError, ObjectPage, ObjectStore};

use crate::accounts::AccountService;
use crate::balancer::LoadBalancer;
use crate::chunked::upload_chunked;
use crate::local::LocalStore;
use crate::map_remote;

fn hex(input: impl AsRef<[u8]>) -> String {
    hex_simd::encode_to_string(input.as_ref(), hex_simd::AsciiCase::Lower)
}

/// Hex MD5 of the payload, the object's etag
pub fn compute_etag(data: &[u8]) -> String {
    hex(Md5::digest(data))
}

const DEFAULT_MIME: &str = "application/octet-stream";

/// Blob storage over the account pool with local fallback
pub struct ObjectService {
    buckets: BucketStore,
    objects: ObjectStore,
    chunks: ChunkStore,
    accounts: Arc<AccountService>,
    balancer: Arc<LoadBalancer>,
    remote: Arc<dyn RemoteStore>,
    local: LocalStore,
    upload_cfg: UploadConfig,
}

impl ObjectService {
    /// Creates the service
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        buckets: BucketStore,
        objects: ObjectStore,
        chunks: ChunkStore,
        accounts: Arc<AccountService>,
        balancer: Arc<LoadBalancer>,
        remote: Arc<dyn RemoteStore>,
        local: LocalStore,
        upload_cfg: UploadConfig,
    ) -> Self {
        Self {
            buckets,
            objects,
            chunks,
            accounts,
            balancer,
            remote,
            local,
            upload_cfg,
        }
    }

    // ------------------------------------------------------------------
    // Buckets
    // ------------------------------------------------------------------

    /// Create a bucket
    pub async fn create_bucket(&self, name: &str) -> Result<Bucket, StorageError> {
        let name = BucketName::parse(name)?;
        let bucket = Bucket::new(name.clone());
        match self.buckets.create(&bucket).await {
            Ok(()) => {
                info!(bucket = %name, "bucket created");
                Ok(bucket)
            }
            Err(MetaError::Duplicate(_)) => Err(StorageError::BucketExists(name.to_string())),
            Err(e) => Err(e.into()),
        }
    }

    /// Delete an empty bucket
    pub async fn delete_bucket(&self, name: &str) -> Result<(), StorageError> {
        let name = BucketName::parse(name)?;
        let bucket = self
            .buckets
            .get(&name)
            .await?
            .ok_or_else(|| StorageError::BucketNotFound(name.to_string()))?;

        if bucket.object_count > 0 {
            return Err(StorageError::BucketNotEmpty(name.to_string()));
        }

        self.buckets.delete(&name).await?;
        info!(bucket = %name, "bucket deleted");
        Ok(())
    }

    /// Fetch one bucket
    pub async fn get_bucket(&self, name: &str) -> Result<Bucket, StorageError> {
        let name = BucketName::parse(name)?;
        self.buckets
            .get(&name)
            .await?
            .ok_or_else(|| StorageError::BucketNotFound(name.to_string()))
    }

    /// All buckets in name order
    pub async fn list_buckets(&self) -> Result<Vec<Bucket>, StorageError> {
        Ok(self.buckets.list().await?)
    }

    // ------------------------------------------------------------------
    // Objects
    // ------------------------------------------------------------------

    async fn require_bucket(&self, name: &BucketName) -> Result<Bucket, StorageError> {
        self.buckets
            .get(name)
            .await?
            .ok_or_else(|| StorageError::BucketNotFound(name.to_string()))
    }

    /// Upload a blob
    ///
    /// Remote writes happen before the metadata insert; a failed insert is
    /// compensated by a best-effort delete of the just-written blob.
    pub async fn upload(
        &self,
        bucket: &str,
        key: &str,
        data: &[u8],
        mime_type: Option<&str>,
        metadata: Option<Value>,
        cancel: &CancellationToken,
    ) -> Result<ObjectRecord, StorageError> {
        let bucket = BucketName::parse(bucket)?;
        let key = ObjectKey::parse(key)?;
        self.require_bucket(&bucket).await?;

        if data.len() as u64 > self.upload_cfg.max_file_size {
            return Err(StorageError::FileTooLarge {
                size: data.len() as u64,
                limit: self.upload_cfg.max_file_size,
            });
        }

        // Reject duplicates before any bytes move; the unique constraint on
        // the insert backs this up under races.
        if self.objects.get(&bucket, &key).await?.is_some() {
            return Err(StorageError::ObjectExists {
                bucket: bucket.to_string(),
                key: key.to_string(),
            });
        }

        let etag = compute_etag(data);
        let mime_type = mime_type.unwrap_or(DEFAULT_MIME).to_string();

        // Backend selection: pool when remote mode is on and the pool has
        // active accounts, local disk otherwise. A pool with accounts but no
        // capacity is STORAGE_FULL, never a silent local fallback.
        let selected = if self.upload_cfg.remote_enabled {
            let active = self.accounts.get_active_accounts().await?;
            if active.is_empty() {
                debug!(bucket = %bucket, key = %key, "no active accounts, using local fallback");
                None
            } else {
                let picked = self.balancer.select(&active, data.len() as u64)?;
                Some(self.accounts.ensure_token_valid(&picked.id, cancel).await?)
            }
        } else {
            None
        };

        let now = Utc::now();
        let record = match selected {
            Some(account) => {
                let remote_path = format!("/{}/{}", bucket.as_str(), key.as_str());
                let (item, chunk_count) =
                    if data.len() as u64 <= self.upload_cfg.chunk_threshold {
                        let item = self
                            .remote
                            .upload_small(&account.access_token, &remote_path, data, cancel)
                            .await
                            .map_err(map_remote)?;
                        (item, 0)
                    } else {
                        upload_chunked(
                            self.remote.as_ref(),
                            &self.chunks,
                            &account,
                            &bucket,
                            &key,
                            &remote_path,
                            data,
                            self.upload_cfg.chunk_size as usize,
                            cancel,
                        )
                        .await?
                    };

                ObjectRecord {
                    bucket: bucket.clone(),
                    key: key.clone(),
                    account_id: account.id,
                    remote_id: item.id,
                    remote_path,
                    size: data.len() as i64,
                    etag,
                    mime_type,
                    is_chunked: chunk_count > 0,
                    chunk_count,
                    metadata: metadata.unwrap_or_else(|| serde_json::json!({})),
                    created_at: now,
                    updated_at: now,
                }
            }
            None => {
                let path = self.local.write(&bucket, &key, data).await?;
                ObjectRecord {
                    bucket: bucket.clone(),
                    key: key.clone(),
                    account_id: AccountId::nil(),
                    remote_id: String::new(),
                    remote_path: path.to_string_lossy().into_owned(),
                    size: data.len() as i64,
                    etag,
                    mime_type,
                    is_chunked: false,
                    chunk_count: 0,
                    metadata: metadata.unwrap_or_else(|| serde_json::json!({})),
                    created_at: now,
                    updated_at: now,
                }
            }
        };

        if let Err(insert_err) = self.objects.insert(&record).await {
            match insert_err {
                MetaError::Duplicate(_) => {
                    // A concurrent writer won the key. The local path belongs
                    // to the winner's row, so only a remote blob is cleaned up.
                    if !record.is_local() {
                        self.compensate_orphan(&record, cancel).await;
                    }
                    return Err(StorageError::ObjectExists {
                        bucket: bucket.to_string(),
                        key: key.to_string(),
                    });
                }
                other => {
                    self.compensate_orphan(&record, cancel).await;
                    return Err(StorageError::Internal(other.to_string()));
                }
            }
        }

        self.buckets.recompute_aggregates(&bucket).await?;
        info!(
            bucket = %bucket,
            key = %key,
            size = record.size,
            backend = if record.is_local() { "local" } else { "remote" },
            "object uploaded"
        );
        Ok(record)
    }

    /// Best-effort cleanup of a blob whose metadata insert failed
    async fn compensate_orphan(&self, record: &ObjectRecord, cancel: &CancellationToken) {
        let result = if record.is_local() {
            self.local.remove(&record.bucket, &record.key).await
        } else {
            match self.accounts.ensure_token_valid(&record.account_id, cancel).await {
                Ok(account) => self
                    .remote
                    .delete(&account.access_token, &record.remote_id, cancel)
                    .await
                    .map_err(map_remote),
                Err(e) => Err(e),
            }
        };
        if let Err(e) = result {
            warn!(
                bucket = %record.bucket,
                key = %record.key,
                error = %e,
                "failed to clean up orphaned blob after metadata insert failure"
            );
        }
    }

    /// Download a blob with its metadata
    pub async fn download(
        &self,
        bucket: &str,
        key: &str,
        cancel: &CancellationToken,
    ) -> Result<(ObjectRecord, Vec<u8>), StorageError> {
        let bucket = BucketName::parse(bucket)?;
        let key = ObjectKey::parse(key)?;

        let record = self
            .objects
            .get(&bucket, &key)
            .await?
            .ok_or_else(|| StorageError::ObjectNotFound {
                bucket: bucket.to_string(),
                key: key.to_string(),
            })?;

        let bytes = if record.is_local() {
            self.local.read(&bucket, &key).await?
        } else {
            let account = self
                .accounts
                .ensure_token_valid(&record.account_id, cancel)
                .await?;
            match self
                .remote
                .download(&account.access_token, &record.remote_id, cancel)
                .await
            {
                Ok(bytes) => bytes,
                // vanished upstream: same outcome as a missing row
                Err(RemoteError::Status { status: 404, .. }) => {
                    return Err(StorageError::ObjectNotFound {
                        bucket: bucket.to_string(),
                        key: key.to_string(),
                    })
                }
                Err(e) => return Err(map_remote(e)),
            }
        };

        Ok((record, bytes))
    }

    /// Delete a blob and its metadata
    ///
    /// Remote delete failures abort the metadata delete so the caller can
    /// retry; local delete failures are logged and the row is removed anyway.
    pub async fn delete(
        &self,
        bucket: &str,
        key: &str,
        cancel: &CancellationToken,
    ) -> Result<(), StorageError> {
        let bucket = BucketName::parse(bucket)?;
        let key = ObjectKey::parse(key)?;

        let record = self
            .objects
            .get(&bucket, &key)
            .await?
            .ok_or_else(|| StorageError::ObjectNotFound {
                bucket: bucket.to_string(),
                key: key.to_string(),
            })?;

        if record.is_local() {
            if let Err(e) = self.local.remove(&bucket, &key).await {
                warn!(bucket = %bucket, key = %key, error = %e, "local blob delete failed");
            }
        } else {
            let account = self
                .accounts
                .ensure_token_valid(&record.account_id, cancel)
                .await?;
            match self
                .remote
                .delete(&account.access_token, &record.remote_id, cancel)
                .await
            {
                Ok(()) => {}
                // already gone upstream; the row is stale, keep going
                Err(RemoteError::Status { status: 404, .. }) => {
                    debug!(bucket = %bucket, key = %key, "remote item already absent");
                }
                Err(e) => return Err(map_remote(e)),
            }
        }

        self.objects.delete(&bucket, &key).await?;
        self.buckets.recompute_aggregates(&bucket).await?;
        info!(bucket = %bucket, key = %key, "object deleted");
        Ok(())
    }

    /// Keyset-paginated listing
    pub async fn list(
        &self,
        bucket: &str,
        prefix: Option<&str>,
        marker: Option<&str>,
        max_keys: u32,
    ) -> Result<ObjectPage, StorageError> {
        let bucket = BucketName::parse(bucket)?;
        self.require_bucket(&bucket).await?;
        Ok(self.objects.list(&bucket, prefix, marker, max_keys).await?)
    }

    /// Metadata-only fetch
    pub async fn get_metadata(
        &self,
        bucket: &str,
        key: &str,
    ) -> Result<ObjectRecord, StorageError> {
        let bucket = BucketName::parse(bucket)?;
        let key = ObjectKey::parse(key)?;
        self.objects
            .get(&bucket, &key)
            .await?
            .ok_or_else(|| StorageError::ObjectNotFound {
                bucket: bucket.to_string(),
                key: key.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compute_etag_matches_known_md5() {
        // md5("hi"), the value the end-to-end upload checks pin
        assert_eq!(compute_etag(b"hi"), "49f68a5c8493ec2c0bf489821c21fc3b");
        // md5("")
        assert_eq!(compute_etag(b""), "d41d8cd98f00b204e9800998ecf8427e");
    }
}
