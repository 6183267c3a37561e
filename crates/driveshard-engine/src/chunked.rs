//! Resumable (chunked) upload orchestration
//!
//! Payloads above the configured threshold are sliced and PUT sequentially
//! through an upload session. Bookkeeping rows are recorded per slice and
//! cleared once the whole upload completes. An expired session is recreated
//! once per slice and the upload resumes from the slice that failed; a
//! cancelled or failed upload flips the remaining rows to `failed` before
//! returning.

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use driveshard_core::domain::{BucketName, ChunkState, ObjectChunk, ObjectKey, StorageAccount};
use driveshard_core::ports::{ChunkOutcome, RemoteError, RemoteItem, RemoteStore};
use driveshard_core::StorageError;
use driveshard_meta::ChunkStore;

use crate::map_remote;
use crate::objects::compute_etag;

/// Flip leftover rows to `failed` and translate the upstream error
async fn abort_upload(
    chunks: &ChunkStore,
    bucket: &BucketName,
    key: &ObjectKey,
    error: RemoteError,
) -> StorageError {
    if let Err(e) = chunks.fail_pending(bucket, key).await {
        warn!(bucket = %bucket, key = %key, error = %e, "failed to mark leftover chunk rows");
    }
    map_remote(error)
}

/// Upload `data` through a resumable session, returning the final item and
/// the number of slices sent
pub(crate) async fn upload_chunked(
    remote: &dyn RemoteStore,
    chunks: &ChunkStore,
    account: &StorageAccount,
    bucket: &BucketName,
    key: &ObjectKey,
    remote_path: &str,
    data: &[u8],
    chunk_size: usize,
    cancel: &CancellationToken,
) -> Result<(RemoteItem, i32), StorageError> {
    let chunk_size = chunk_size.max(1);
    let total = data.len() as u64;
    let chunk_count = data.len().div_ceil(chunk_size);

    info!(
        path = remote_path,
        bytes = total,
        chunks = chunk_count,
        "starting chunked upload"
    );

    // Record every slice up front so an interrupted upload leaves a visible
    // trail for cleanup.
    for (index, slice) in data.chunks(chunk_size).enumerate() {
        chunks
            .upsert(&ObjectChunk {
                bucket: bucket.clone(),
                key: key.clone(),
                chunk_index: index as i32,
                account_id: account.id,
                chunk_size: slice.len() as i64,
                checksum: compute_etag(slice),
                status: ChunkState::Pending,
                created_at: Utc::now(),
            })
            .await?;
    }

    let mut session = match remote
        .create_upload_session(&account.access_token, remote_path, cancel)
        .await
    {
        Ok(session) => session,
        Err(err) => return Err(abort_upload(chunks, bucket, key, err).await),
    };

    let mut completed: Option<RemoteItem> = None;
    let mut offset: u64 = 0;

    for (index, slice) in data.chunks(chunk_size).enumerate() {
        let range_end = offset + slice.len() as u64 - 1;
        let mut recreated = false;

        loop {
            let result = remote
                .upload_chunk(
                    &account.access_token,
                    &session,
                    slice,
                    offset,
                    range_end,
                    total,
                    cancel,
                )
                .await;

            match result {
                Ok(outcome) => {
                    chunks
                        .set_status(bucket, key, index as i32, ChunkState::Uploaded)
                        .await?;
                    if let ChunkOutcome::Complete(item) = outcome {
                        completed = Some(item);
                    }
                    break;
                }
                Err(RemoteError::SessionExpired) if !recreated => {
                    // Restart from this slice on a fresh session.
                    warn!(
                        chunk = index,
                        path = remote_path,
                        "upload session expired, recreating"
                    );
                    session = match remote
                        .create_upload_session(&account.access_token, remote_path, cancel)
                        .await
                    {
                        Ok(session) => session,
                        Err(err) => return Err(abort_upload(chunks, bucket, key, err).await),
                    };
                    recreated = true;
                }
                Err(err) => {
                    chunks
                        .set_status(bucket, key, index as i32, ChunkState::Failed)
                        .await?;
                    return Err(abort_upload(chunks, bucket, key, err).await);
                }
            }
        }

        offset = range_end + 1;
    }

    let item = completed.ok_or_else(|| {
        StorageError::Internal("upload session finished without a final item".to_string())
    })?;

    // All slices landed; the bookkeeping rows have served their purpose.
    chunks.clear(bucket, key).await?;

    info!(path = remote_path, item = %item.id, "chunked upload complete");
    Ok((item, chunk_count as i32))
}
