//! Account service
//!
//! Lifecycle of the storage-account pool, quota sync, and the token-refresh
//! path every write depends on. Refreshes are serialised per account through
//! a keyed lock map so concurrent writers trigger exactly one upstream
//! refresh; the expiry window is re-checked under the lock.

use std::sync::Arc;

use chrono::{Duration, Utc};
use dashmap::DashMap;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use driveshard_core::domain::{AccountId, AccountStatus, StorageAccount};
use driveshard_core::ports::{AuthProvider, OAuthCredentials, RemoteError, RemoteStore, TokenGrant};
use driveshard_core::StorageError;
use driveshard_meta::AccountStore;
use driveshard_retry::{retry, RetryConfig, RetryError};

/// Parameters for registering a storage account
#[derive(Debug, Clone)]
pub struct NewAccount {
    /// Human-readable label
    pub display_name: String,
    /// Account owner's email
    pub email: String,
    /// OAuth2 application (client) id
    pub client_id: String,
    /// OAuth2 client secret
    pub client_secret: String,
    /// Identity tenant
    pub tenant_id: String,
    /// Initial refresh token
    pub refresh_token: String,
    /// Initial access token (may be empty; the first write refreshes)
    pub access_token: String,
    /// Seconds until the initial access token expires
    pub expires_in: Option<u64>,
    /// Load-balancing priority
    pub priority: i32,
}

/// Account lifecycle service
pub struct AccountService {
    store: AccountStore,
    auth: Arc<dyn AuthProvider>,
    remote: Arc<dyn RemoteStore>,
    refresh_window: Duration,
    retry_config: RetryConfig,
    refresh_locks: DashMap<AccountId, Arc<Mutex<()>>>,
}

impl AccountService {
    /// Creates the service
    pub fn new(
        store: AccountStore,
        auth: Arc<dyn AuthProvider>,
        remote: Arc<dyn RemoteStore>,
        refresh_window: Duration,
        retry_config: RetryConfig,
    ) -> Self {
        Self {
            store,
            auth,
            remote,
            refresh_window,
            retry_config,
            refresh_locks: DashMap::new(),
        }
    }

    fn credentials(account: &StorageAccount) -> OAuthCredentials {
        OAuthCredentials {
            client_id: account.client_id.clone(),
            client_secret: account.client_secret.clone(),
            tenant_id: account.tenant_id.clone(),
        }
    }

    /// Register a new storage account
    pub async fn create(&self, params: NewAccount) -> Result<StorageAccount, StorageError> {
        let now = Utc::now();
        let account = StorageAccount {
            id: AccountId::new(),
            display_name: params.display_name,
            email: params.email,
            client_id: params.client_id,
            client_secret: params.client_secret,
            tenant_id: params.tenant_id,
            refresh_token: params.refresh_token,
            access_token: params.access_token,
            token_expires: params
                .expires_in
                .map(|secs| now + Duration::seconds(secs as i64)),
            total_space: 0,
            used_space: 0,
            status: AccountStatus::Active,
            priority: params.priority,
            last_sync: None,
            error_message: None,
            created_at: now,
            updated_at: now,
        };

        self.store.insert(&account).await?;
        info!(account = %account.id, email = %account.email, "storage account registered");
        Ok(account)
    }

    /// Register an account from a completed OAuth consent exchange
    pub async fn create_from_grant(
        &self,
        display_name: String,
        email: String,
        creds: OAuthCredentials,
        grant: TokenGrant,
    ) -> Result<StorageAccount, StorageError> {
        self.create(NewAccount {
            display_name,
            email,
            client_id: creds.client_id,
            client_secret: creds.client_secret,
            tenant_id: creds.tenant_id,
            refresh_token: grant.refresh_token.unwrap_or_default(),
            access_token: grant.access_token,
            expires_in: Some(grant.expires_in),
            priority: 0,
        })
        .await
    }

    /// Fetch one account
    pub async fn get(&self, id: &AccountId) -> Result<StorageAccount, StorageError> {
        self.store
            .get(id)
            .await?
            .ok_or_else(|| StorageError::AccountNotFound(id.to_string()))
    }

    /// All accounts regardless of status
    pub async fn list(&self) -> Result<Vec<StorageAccount>, StorageError> {
        Ok(self.store.list().await?)
    }

    /// Accounts eligible for selection, ordered by priority descending then id
    pub async fn get_active_accounts(&self) -> Result<Vec<StorageAccount>, StorageError> {
        Ok(self.store.list_active().await?)
    }

    /// Update label, priority and status
    pub async fn update_profile(
        &self,
        id: &AccountId,
        display_name: &str,
        priority: i32,
        status: AccountStatus,
    ) -> Result<StorageAccount, StorageError> {
        if !self.store.update_profile(id, display_name, priority, status).await? {
            return Err(StorageError::AccountNotFound(id.to_string()));
        }
        self.get(id).await
    }

    /// Remove an account
    pub async fn delete(&self, id: &AccountId) -> Result<(), StorageError> {
        if !self.store.delete(id).await? {
            return Err(StorageError::AccountNotFound(id.to_string()));
        }
        self.refresh_locks.remove(id);
        info!(account = %id, "storage account deleted");
        Ok(())
    }

    /// Ensure the account's access token outlives the refresh window,
    /// refreshing it upstream when it does not
    ///
    /// Returns the account with a usable `access_token`. A refresh failure
    /// moves the account into `status = error` (making it invisible to the
    /// balancer) and surfaces `UPSTREAM_ERROR`.
    pub async fn ensure_token_valid(
        &self,
        id: &AccountId,
        cancel: &CancellationToken,
    ) -> Result<StorageAccount, StorageError> {
        let account = self.get(id).await?;
        if !account.token_expires_within(self.refresh_window) {
            return Ok(account);
        }

        // Serialise refreshes per account; losers of the race re-check and
        // find a fresh token.
        let lock = self
            .refresh_locks
            .entry(*id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let _guard = lock.lock().await;

        let account = self.get(id).await?;
        if !account.token_expires_within(self.refresh_window) {
            debug!(account = %id, "token already refreshed by a concurrent caller");
            return Ok(account);
        }

        debug!(account = %id, "refreshing access token");
        let creds = Self::credentials(&account);
        let refresh_token = account.refresh_token.clone();

        let result = retry(
            &self.retry_config,
            cancel,
            RemoteError::is_retryable,
            |_| self.auth.refresh(&creds, &refresh_token, cancel),
        )
        .await;

        match result {
            Ok(grant) => {
                let expires = Utc::now() + Duration::seconds(grant.expires_in as i64);
                self.store
                    .update_tokens(id, &grant.access_token, expires, grant.refresh_token.as_deref())
                    .await?;
                info!(account = %id, "access token refreshed");
                self.get(id).await
            }
            Err(RetryError::Cancelled) => {
                Err(StorageError::Unavailable("operation cancelled".to_string()))
            }
            Err(RetryError::Exhausted { attempts, source }) => {
                let message = format!("token refresh failed after {attempts} attempt(s): {source}");
                warn!(account = %id, %message, "marking account as errored");
                self.store.mark_error(id, &message).await?;
                Err(StorageError::Upstream(message))
            }
        }
    }

    /// Refresh quota numbers from the upstream drive
    ///
    /// The remote port is already retry-wrapped, so a surfaced error here is
    /// final: the account is marked errored.
    pub async fn sync_space(
        &self,
        id: &AccountId,
        cancel: &CancellationToken,
    ) -> Result<StorageAccount, StorageError> {
        let account = self.ensure_token_valid(id, cancel).await?;

        match self.remote.get_drive(&account.access_token, cancel).await {
            Ok(info) => {
                self.store
                    .update_quota(id, info.quota.total as i64, info.quota.used as i64)
                    .await?;
                debug!(
                    account = %id,
                    total = info.quota.total,
                    used = info.quota.used,
                    "quota synced"
                );
                self.get(id).await
            }
            Err(RemoteError::Cancelled) => {
                Err(StorageError::Unavailable("operation cancelled".to_string()))
            }
            Err(source) => {
                let message = format!("quota sync failed: {source}");
                warn!(account = %id, %message, "marking account as errored");
                self.store.mark_error(id, &message).await?;
                Err(StorageError::Upstream(message))
            }
        }
    }
}
