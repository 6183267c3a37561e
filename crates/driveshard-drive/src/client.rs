//! Drive API client
//!
//! A stateless, typed HTTP client for one upstream drive account. Every call
//! takes the bearer access token, so a single client instance serves the
//! whole account pool. The base URL is overridable for tests.

use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use driveshard_core::ports::{
    ChunkOutcome, DriveInfo, DriveQuota, RemoteError, RemoteItem, RemoteStore, UploadSession,
};

/// Base URL for the drive API
const DRIVE_BASE_URL: &str = "https://graph.microsoft.com/v1.0";

/// Default per-call timeout
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

// ============================================================================
// API response types
// ============================================================================

/// Response from the drive-info endpoint
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DriveResponse {
    id: Option<String>,
    owner: Option<OwnerResponse>,
    quota: Option<QuotaResponse>,
}

#[derive(Debug, Deserialize)]
struct OwnerResponse {
    user: Option<OwnerUser>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OwnerUser {
    display_name: Option<String>,
    email: Option<String>,
}

#[derive(Debug, Deserialize)]
struct QuotaResponse {
    total: Option<u64>,
    used: Option<u64>,
    remaining: Option<u64>,
    state: Option<String>,
}

/// A drive item as returned after uploads and metadata reads
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DriveItemResponse {
    id: String,
    name: String,
    size: Option<u64>,
    created_date_time: Option<String>,
    last_modified_date_time: Option<String>,
    file: Option<FileFacet>,
    #[serde(rename = "@microsoft.graph.downloadUrl")]
    download_url: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileFacet {
    mime_type: Option<String>,
    hashes: Option<HashesFacet>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HashesFacet {
    quick_xor_hash: Option<String>,
}

/// Response from creating an upload session
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UploadSessionResponse {
    upload_url: String,
    expiration_date_time: Option<String>,
}

fn parse_timestamp(s: Option<&str>) -> Option<DateTime<Utc>> {
    s.and_then(|v| v.parse::<DateTime<Utc>>().ok())
}

fn item_from_response(item: DriveItemResponse) -> RemoteItem {
    RemoteItem {
        id: item.id,
        name: item.name,
        size: item.size.unwrap_or(0),
        mime_type: item.file.as_ref().and_then(|f| f.mime_type.clone()),
        hash: item
            .file
            .as_ref()
            .and_then(|f| f.hashes.as_ref())
            .and_then(|h| h.quick_xor_hash.clone()),
        created: parse_timestamp(item.created_date_time.as_deref()),
        modified: parse_timestamp(item.last_modified_date_time.as_deref()),
    }
}

// ============================================================================
// Error mapping
// ============================================================================

fn map_transport_error(err: reqwest::Error) -> RemoteError {
    if err.is_timeout() {
        RemoteError::Timeout
    } else if err.is_connect() || err.is_body() || err.is_request() {
        RemoteError::Connection(err.to_string())
    } else if err.is_decode() {
        RemoteError::Other(format!("malformed response: {err}"))
    } else {
        RemoteError::Other(err.to_string())
    }
}

async fn status_error(response: Response) -> RemoteError {
    let status = response.status().as_u16();
    let message = response
        .text()
        .await
        .unwrap_or_else(|_| "unable to read error body".to_string());
    RemoteError::Status { status, message }
}

/// Race a fallible future against the cancellation handle
async fn cancellable<T, F>(cancel: &CancellationToken, fut: F) -> Result<T, RemoteError>
where
    F: std::future::Future<Output = Result<T, RemoteError>>,
{
    tokio::select! {
        () = cancel.cancelled() => Err(RemoteError::Cancelled),
        result = fut => result,
    }
}

// ============================================================================
// DriveClient
// ============================================================================

/// HTTP client for the upstream drive API
///
/// Wraps `reqwest::Client` with bearer authentication and base-URL
/// construction. The item-by-path convention addresses files as
/// `/me/drive/root:{path}:/{operation}`.
pub struct DriveClient {
    client: Client,
    base_url: String,
}

impl Default for DriveClient {
    fn default() -> Self {
        Self::new()
    }
}

impl DriveClient {
    /// Creates a client against the production API with the default timeout
    pub fn new() -> Self {
        Self::with_base_url(DRIVE_BASE_URL)
    }

    /// Creates a client with a custom base URL (useful for testing)
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        let client = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    /// Returns the base URL for API requests
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Creates an authenticated request builder for the given method and path
    fn request(&self, method: Method, token: &str, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        self.client.request(method, &url).bearer_auth(token)
    }

    /// API path addressing an item by its remote path
    ///
    /// `remote_path` is `/`-prefixed, e.g. `/my-bucket/reports/q3.pdf`.
    fn item_path(remote_path: &str, operation: &str) -> String {
        format!("/me/drive/root:{remote_path}:/{operation}")
    }

    async fn send_checked(request: RequestBuilder) -> Result<Response, RemoteError> {
        let response = request.send().await.map_err(map_transport_error)?;
        if response.status().is_success() {
            Ok(response)
        } else {
            Err(status_error(response).await)
        }
    }
}

#[async_trait::async_trait]
impl RemoteStore for DriveClient {
    async fn get_drive(
        &self,
        access_token: &str,
        cancel: &CancellationToken,
    ) -> Result<DriveInfo, RemoteError> {
        debug!("fetching drive info");
        let request = self.request(Method::GET, access_token, "/me/drive");

        cancellable(cancel, async {
            let drive: DriveResponse = Self::send_checked(request)
                .await?
                .json()
                .await
                .map_err(map_transport_error)?;

            let quota = drive.quota.unwrap_or(QuotaResponse {
                total: None,
                used: None,
                remaining: None,
                state: None,
            });
            let owner = drive.owner.and_then(|o| o.user);

            Ok(DriveInfo {
                id: drive.id.unwrap_or_default(),
                owner_name: owner
                    .as_ref()
                    .and_then(|u| u.display_name.clone())
                    .unwrap_or_default(),
                owner_email: owner.and_then(|u| u.email),
                quota: DriveQuota {
                    total: quota.total.unwrap_or(0),
                    used: quota.used.unwrap_or(0),
                    remaining: quota.remaining.unwrap_or(0),
                    state: quota.state.unwrap_or_else(|| "unknown".to_string()),
                },
            })
        })
        .await
    }

    async fn upload_small(
        &self,
        access_token: &str,
        remote_path: &str,
        data: &[u8],
        cancel: &CancellationToken,
    ) -> Result<RemoteItem, RemoteError> {
        debug!(bytes = data.len(), path = remote_path, "small upload");
        let request = self
            .request(
                Method::PUT,
                access_token,
                &Self::item_path(remote_path, "content"),
            )
            .header("Content-Type", "application/octet-stream")
            .body(data.to_vec());

        cancellable(cancel, async {
            let item: DriveItemResponse = Self::send_checked(request)
                .await?
                .json()
                .await
                .map_err(map_transport_error)?;
            Ok(item_from_response(item))
        })
        .await
    }

    async fn create_upload_session(
        &self,
        access_token: &str,
        remote_path: &str,
        cancel: &CancellationToken,
    ) -> Result<UploadSession, RemoteError> {
        debug!(path = remote_path, "creating upload session");
        let request = self
            .request(
                Method::POST,
                access_token,
                &Self::item_path(remote_path, "createUploadSession"),
            )
            .header("Content-Type", "application/json")
            .body("{}");

        cancellable(cancel, async {
            let session: UploadSessionResponse = Self::send_checked(request)
                .await?
                .json()
                .await
                .map_err(map_transport_error)?;
            Ok(UploadSession {
                upload_url: session.upload_url,
                expires_at: parse_timestamp(session.expiration_date_time.as_deref()),
            })
        })
        .await
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
        let content_range = format!("bytes {range_start}-{range_end}/{total}");
        debug!(range = %content_range, "chunk upload");

        // The session URL is absolute; it does not go through the base URL.
        let request = self
            .client
            .put(&session.upload_url)
            .bearer_auth(access_token)
            .header("Content-Length", data.len().to_string())
            .header("Content-Range", &content_range)
            .body(data.to_vec());

        cancellable(cancel, async {
            let response = request.send().await.map_err(map_transport_error)?;
            match response.status() {
                StatusCode::OK | StatusCode::CREATED => {
                    let item: DriveItemResponse =
                        response.json().await.map_err(map_transport_error)?;
                    Ok(ChunkOutcome::Complete(item_from_response(item)))
                }
                StatusCode::ACCEPTED => Ok(ChunkOutcome::Accepted),
                StatusCode::NOT_FOUND | StatusCode::GONE => Err(RemoteError::SessionExpired),
                _ => Err(status_error(response).await),
            }
        })
        .await
    }

    async fn download(
        &self,
        access_token: &str,
        item_id: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>, RemoteError> {
        debug!(item = item_id, "downloading item");
        let meta_request = self.request(
            Method::GET,
            access_token,
            &format!("/me/drive/items/{item_id}"),
        );

        cancellable(cancel, async {
            // step 1: item metadata carries the time-limited download URL
            let item: DriveItemResponse = Self::send_checked(meta_request)
                .await?
                .json()
                .await
                .map_err(map_transport_error)?;

            let download_url = item.download_url.ok_or_else(|| {
                RemoteError::Other(format!("item {item_id} has no download URL"))
            })?;

            // step 2: fetch the bytes from the pre-authorized URL
            let response = Self::send_checked(self.client.get(&download_url)).await?;
            let bytes = response.bytes().await.map_err(map_transport_error)?;
            debug!(item = item_id, bytes = bytes.len(), "download complete");
            Ok(bytes.to_vec())
        })
        .await
    }

    async fn delete(
        &self,
        access_token: &str,
        item_id: &str,
        cancel: &CancellationToken,
    ) -> Result<(), RemoteError> {
        debug!(item = item_id, "deleting item");
        let request = self.request(
            Method::DELETE,
            access_token,
            &format!("/me/drive/items/{item_id}"),
        );

        cancellable(cancel, async {
            let response = request.send().await.map_err(map_transport_error)?;
            match response.status() {
                StatusCode::NO_CONTENT | StatusCode::OK => Ok(()),
                _ => Err(status_error(response).await),
            }
        })
        .await
    }
}
