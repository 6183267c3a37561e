//! DriveShard Engine - the layered storage services
//!
//! Composition, in dependency order:
//! - [`accounts::AccountService`]: account lifecycle and token refresh
//! - [`balancer::LoadBalancer`]: per-write account selection
//! - [`objects::ObjectService`]: blob upload/download/delete over the pool,
//!   with a local-disk fallback and bucket aggregate maintenance
//! - [`vfs::VfsService`]: the path-addressed tree layered over objects

pub mod accounts;
pub mod balancer;
pub mod chunked;
pub mod local;
pub mod objects;
pub mod remote_retry;
pub mod vfs;

pub use accounts::{AccountService, NewAccount};
pub use balancer::LoadBalancer;
pub use local::LocalStore;
pub use objects::ObjectService;
pub use remote_retry::RetryingRemote;
pub use vfs::{DirectoryListing, VfsService};

use std::sync::Arc;

use driveshard_core::ports::{AuthProvider, RemoteError, RemoteStore};
use driveshard_core::{Config, StorageError};
use driveshard_meta::DatabasePool;
use driveshard_retry::RetryConfig;

/// Map an upstream failure into the client-visible taxonomy
///
/// Call sites handle context-dependent statuses (e.g. a 404 on download)
/// before falling through to this.
pub(crate) fn map_remote(err: RemoteError) -> StorageError {
    match err {
        RemoteError::Cancelled => StorageError::Unavailable("operation cancelled".to_string()),
        other => StorageError::Upstream(other.to_string()),
    }
}

/// The wired-up engine handed to the API adapter
pub struct Engine {
    /// Account lifecycle service
    pub accounts: Arc<AccountService>,
    /// Object service (buckets + blobs)
    pub objects: Arc<ObjectService>,
    /// Virtual filesystem service
    pub vfs: Arc<VfsService>,
}

impl Engine {
    /// Wire every service from configuration, a connected pool, and the
    /// remote-port implementations
    pub fn new(
        config: &Config,
        pool: &DatabasePool,
        remote: Arc<dyn RemoteStore>,
        auth: Arc<dyn AuthProvider>,
    ) -> Self {
        let retry_config = RetryConfig::from_settings(&config.retry);
        let sq = pool.pool().clone();

        // Every upstream call goes through the backoff wrapper exactly once.
        let remote: Arc<dyn RemoteStore> =
            Arc::new(RetryingRemote::new(remote, retry_config.clone()));

        let accounts = Arc::new(AccountService::new(
            driveshard_meta::AccountStore::new(sq.clone()),
            auth,
            Arc::clone(&remote),
            chrono::Duration::seconds(config.token.refresh_before_expire_s),
            retry_config.clone(),
        ));

        let balancer = Arc::new(LoadBalancer::new(config.load_balance.strategy));

        let objects = Arc::new(ObjectService::new(
            driveshard_meta::BucketStore::new(sq.clone()),
            driveshard_meta::ObjectStore::new(sq.clone()),
            driveshard_meta::ChunkStore::new(sq.clone()),
            Arc::clone(&accounts),
            balancer,
            remote,
            LocalStore::new(config.upload.local_root.clone()),
            config.upload.clone(),
        ));

        let vfs = Arc::new(VfsService::new(
            driveshard_meta::VfsStore::new(sq),
            Arc::clone(&objects),
        ));

        Self {
            accounts,
            objects,
            vfs,
        }
    }
}
