//! Shared test harness for engine integration tests
//!
//! Provides in-memory fakes for the remote drive and the OAuth provider so
//! the full service stack runs against a `sqlite::memory:` pool with no
//! network access.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use chrono::Utc;
use tokio_util::sync::CancellationToken;

use driveshard_core::domain::{AccountStatus, StorageAccount};
use driveshard_core::ports::{
    AuthProvider, ChunkOutcome, DriveInfo, DriveQuota, OAuthCredentials, RemoteError, RemoteItem,
    RemoteStore, TokenGrant, UploadSession,
};
use driveshard_core::Config;
use driveshard_engine::{Engine, NewAccount};
use driveshard_meta::DatabasePool;

// ============================================================================
// FakeRemote
// ============================================================================

#[derive(Default)]
struct RemoteInner {
    next_id: u64,
    next_session: u64,
    /// item id -> bytes
    items: HashMap<String, Vec<u8>>,
    /// upload_url -> remote path
    sessions: HashMap<String, String>,
    /// remote path -> accumulated chunk bytes (survives session recreation)
    buffers: HashMap<String, Vec<u8>>,
}

/// In-memory drive standing in for the upstream API
pub struct FakeRemote {
    inner: Mutex<RemoteInner>,
    /// Quota reported by `get_drive`
    pub quota_total: AtomicU64,
    pub quota_used: AtomicU64,
    /// Fail the next N small uploads with HTTP 503
    pub fail_next_uploads: AtomicU64,
    /// Expire the next N chunk PUTs
    pub expire_next_chunks: AtomicU64,
    /// Fail every delete with HTTP 500 while set
    pub fail_deletes: AtomicBool,
    pub upload_calls: AtomicU64,
    pub delete_calls: AtomicU64,
}

impl Default for FakeRemote {
    fn default() -> Self {
        Self {
            inner: Mutex::new(RemoteInner::default()),
            quota_total: AtomicU64::new(10_000_000),
            quota_used: AtomicU64::new(0),
            fail_next_uploads: AtomicU64::new(0),
            expire_next_chunks: AtomicU64::new(0),
            fail_deletes: AtomicBool::new(false),
            upload_calls: AtomicU64::new(0),
            delete_calls: AtomicU64::new(0),
        }
    }
}

impl FakeRemote {
    /// Number of items currently stored upstream
    pub fn item_count(&self) -> usize {
        self.inner.lock().unwrap().items.len()
    }

    fn new_item(inner: &mut RemoteInner, path: &str, data: Vec<u8>) -> RemoteItem {
        inner.next_id += 1;
        let id = format!("ITEM-{}", inner.next_id);
        let size = data.len() as u64;
        inner.items.insert(id.clone(), data);
        RemoteItem {
            id,
            name: path.rsplit('/').next().unwrap_or(path).to_string(),
            size,
            mime_type: None,
            hash: None,
            created: Some(Utc::now()),
            modified: Some(Utc::now()),
        }
    }
}

#[async_trait::async_trait]
impl RemoteStore for FakeRemote {
    async fn get_drive(
        &self,
        _token: &str,
        _cancel: &CancellationToken,
    ) -> Result<DriveInfo, RemoteError> {
        let total = self.quota_total.load(Ordering::SeqCst);
        let used = self.quota_used.load(Ordering::SeqCst);
        Ok(DriveInfo {
            id: "fake-drive".to_string(),
            owner_name: "Fake Owner".to_string(),
            owner_email: Some("owner@example.com".to_string()),
            quota: DriveQuota {
                total,
                used,
                remaining: total.saturating_sub(used),
                state: "normal".to_string(),
            },
        })
    }

    async fn upload_small(
        &self,
        _token: &str,
        remote_path: &str,
        data: &[u8],
        _cancel: &CancellationToken,
    ) -> Result<RemoteItem, RemoteError> {
        self.upload_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_next_uploads.load(Ordering::SeqCst) > 0 {
            self.fail_next_uploads.fetch_sub(1, Ordering::SeqCst);
            return Err(RemoteError::Status {
                status: 503,
                message: "fake outage".to_string(),
            });
        }
        let mut inner = self.inner.lock().unwrap();
        Ok(Self::new_item(&mut inner, remote_path, data.to_vec()))
    }

    async fn create_upload_session(
        &self,
        _token: &str,
        remote_path: &str,
        _cancel: &CancellationToken,
    ) -> Result<UploadSession, RemoteError> {
        let mut inner = self.inner.lock().unwrap();
        inner.next_session += 1;
        let url = format!("fake://session/{}", inner.next_session);
        inner.sessions.insert(url.clone(), remote_path.to_string());
        Ok(UploadSession {
            upload_url: url,
            expires_at: None,
        })
    }

    async fn upload_chunk(
        &self,
        _token: &str,
        session: &UploadSession,
        data: &[u8],
        range_start: u64,
        range_end: u64,
        total: u64,
        _cancel: &CancellationToken,
    ) -> Result<ChunkOutcome, RemoteError> {
        self.upload_calls.fetch_add(1, Ordering::SeqCst);
        if self.expire_next_chunks.load(Ordering::SeqCst) > 0 {
            self.expire_next_chunks.fetch_sub(1, Ordering::SeqCst);
            return Err(RemoteError::SessionExpired);
        }

        let mut inner = self.inner.lock().unwrap();
        let path = inner
            .sessions
            .get(&session.upload_url)
            .cloned()
            .ok_or(RemoteError::SessionExpired)?;

        let buffer = inner.buffers.entry(path.clone()).or_default();
        assert_eq!(
            buffer.len() as u64,
            range_start,
            "chunks must arrive in order"
        );
        buffer.extend_from_slice(data);

        if range_end + 1 == total {
            let bytes = inner.buffers.remove(&path).unwrap();
            let item = Self::new_item(&mut inner, &path, bytes);
            Ok(ChunkOutcome::Complete(item))
        } else {
            Ok(ChunkOutcome::Accepted)
        }
    }

    async fn download(
        &self,
        _token: &str,
        item_id: &str,
        _cancel: &CancellationToken,
    ) -> Result<Vec<u8>, RemoteError> {
        self.inner
            .lock()
            .unwrap()
            .items
            .get(item_id)
            .cloned()
            .ok_or(RemoteError::Status {
                status: 404,
                message: format!("no such item: {item_id}"),
            })
    }

    async fn delete(
        &self,
        _token: &str,
        item_id: &str,
        _cancel: &CancellationToken,
    ) -> Result<(), RemoteError> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(RemoteError::Status {
                status: 500,
                message: "fake delete outage".to_string(),
            });
        }
        match self.inner.lock().unwrap().items.remove(item_id) {
            Some(_) => Ok(()),
            None => Err(RemoteError::Status {
                status: 404,
                message: format!("no such item: {item_id}"),
            }),
        }
    }
}

// ============================================================================
// FakeAuth
// ============================================================================

/// OAuth provider that mints predictable tokens
pub struct FakeAuth {
    pub refresh_calls: AtomicU64,
    pub fail_refresh: AtomicBool,
    /// Artificial latency inside refresh, to widen race windows
    pub refresh_delay_ms: u64,
}

impl Default for FakeAuth {
    fn default() -> Self {
        Self {
            refresh_calls: AtomicU64::new(0),
            fail_refresh: AtomicBool::new(false),
            refresh_delay_ms: 0,
        }
    }
}

#[async_trait::async_trait]
impl AuthProvider for FakeAuth {
    fn authorize_url(&self, creds: &OAuthCredentials, _redirect_uri: &str, state: &str) -> String {
        format!(
            "https://fake.example/{}/authorize?client_id={}&state={state}",
            creds.tenant_id, creds.client_id
        )
    }

    async fn exchange_code(
        &self,
        _creds: &OAuthCredentials,
        _redirect_uri: &str,
        code: &str,
        _cancel: &CancellationToken,
    ) -> Result<TokenGrant, RemoteError> {
        Ok(TokenGrant {
            access_token: format!("access-for-{code}"),
            refresh_token: Some(format!("refresh-for-{code}")),
            expires_in: 3600,
            scope: Some("offline_access Files.ReadWrite.All".to_string()),
            token_type: Some("Bearer".to_string()),
        })
    }

    async fn refresh(
        &self,
        _creds: &OAuthCredentials,
        _refresh_token: &str,
        _cancel: &CancellationToken,
    ) -> Result<TokenGrant, RemoteError> {
        if self.refresh_delay_ms > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(self.refresh_delay_ms)).await;
        }
        if self.fail_refresh.load(Ordering::SeqCst) {
            return Err(RemoteError::Status {
                status: 400,
                message: "invalid_grant".to_string(),
            });
        }
        let n = self.refresh_calls.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(TokenGrant {
            access_token: format!("refreshed-access-{n}"),
            refresh_token: Some("rotated-refresh".to_string()),
            expires_in: 3600,
            scope: None,
            token_type: Some("Bearer".to_string()),
        })
    }

    async fn validate(
        &self,
        _access_token: &str,
        _cancel: &CancellationToken,
    ) -> Result<bool, RemoteError> {
        Ok(true)
    }
}

// ============================================================================
// Harness
// ============================================================================

/// Fully wired engine over fakes and an in-memory database
pub struct Harness {
    pub engine: Engine,
    pub remote: Arc<FakeRemote>,
    pub auth: Arc<FakeAuth>,
    pub pool: DatabasePool,
    pub cancel: CancellationToken,
    _blob_dir: tempfile::TempDir,
}

/// Build a harness with config tweaks applied before wiring
pub async fn harness_with(customize: impl FnOnce(&mut Config)) -> Harness {
    let blob_dir = tempfile::tempdir().unwrap();
    let mut config = Config::default();
    config.upload.local_root = blob_dir.path().join("blobs");
    config.retry.max_attempts = 3;
    config.retry.initial_delay_ms = 1;
    config.retry.max_delay_ms = 5;
    config.retry.jitter = false;
    customize(&mut config);

    let pool = DatabasePool::in_memory().await.unwrap();
    let remote = Arc::new(FakeRemote::default());
    let auth = Arc::new(FakeAuth::default());

    let engine = Engine::new(
        &config,
        &pool,
        Arc::clone(&remote) as Arc<dyn RemoteStore>,
        Arc::clone(&auth) as Arc<dyn AuthProvider>,
    );

    Harness {
        engine,
        remote,
        auth,
        pool,
        cancel: CancellationToken::new(),
        _blob_dir: blob_dir,
    }
}

/// Default harness: remote mode on, no accounts registered yet
pub async fn harness() -> Harness {
    harness_with(|_| {}).await
}

impl Harness {
    /// Register an active account whose token is fresh for an hour
    pub async fn seed_account(&self, total_space: i64, used_space: i64) -> StorageAccount {
        self.seed_account_with(total_space, used_space, 0, 3600).await
    }

    /// Register an account with explicit priority and token lifetime
    pub async fn seed_account_with(
        &self,
        total_space: i64,
        used_space: i64,
        priority: i32,
        expires_in: u64,
    ) -> StorageAccount {
        let account = self
            .engine
            .accounts
            .create(NewAccount {
                display_name: "pool account".to_string(),
                email: "pool@example.com".to_string(),
                client_id: "client".to_string(),
                client_secret: "secret".to_string(),
                tenant_id: "common".to_string(),
                refresh_token: "seed-refresh".to_string(),
                access_token: "seed-access".to_string(),
                expires_in: Some(expires_in),
                priority,
            })
            .await
            .unwrap();

        // quota numbers come from sync in production; tests poke them in
        sqlx::query("UPDATE accounts SET total_space = ?, used_space = ? WHERE id = ?")
            .bind(total_space)
            .bind(used_space)
            .bind(account.id.to_string())
            .execute(self.pool.pool())
            .await
            .unwrap();

        self.engine.accounts.get(&account.id).await.unwrap()
    }

    /// Assert this bucket's aggregates
    pub async fn assert_bucket_totals(&self, bucket: &str, count: i64, size: i64) {
        let row = self.engine.objects.get_bucket(bucket).await.unwrap();
        assert_eq!(row.object_count, count, "object_count for {bucket}");
        assert_eq!(row.total_size, size, "total_size for {bucket}");
    }

    /// Status string stored for an account, for assertions
    pub async fn account_status(&self, account: &StorageAccount) -> AccountStatus {
        self.engine.accounts.get(&account.id).await.unwrap().status
    }
}
