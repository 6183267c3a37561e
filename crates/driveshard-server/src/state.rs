//! Shared per-process state handed to every request handler

use std::sync::Arc;

use driveshard_core::ports::{AuthProvider, RemoteStore};
use driveshard_core::Config;
use driveshard_engine::Engine;
use driveshard_meta::DatabasePool;

use crate::rate_limit::RateLimiter;

/// Everything a handler needs, behind one `Arc`
pub struct AppState {
    /// The wired engine services
    pub engine: Engine,
    /// Pool handle for health pings
    pub pool: DatabasePool,
    /// Configuration snapshot taken at startup
    pub config: Config,
    /// Per-client-IP token buckets
    pub limiter: RateLimiter,
    /// OAuth provider for the consent endpoints
    pub auth: Arc<dyn AuthProvider>,
    /// Remote port for the consent flow's drive probe
    pub remote: Arc<dyn RemoteStore>,
}

impl AppState {
    /// Bundle the pieces into shared state
    pub fn new(
        engine: Engine,
        pool: DatabasePool,
        config: Config,
        auth: Arc<dyn AuthProvider>,
        remote: Arc<dyn RemoteStore>,
    ) -> Arc<Self> {
        let limiter = RateLimiter::from_config(&config.rate_limit);
        Arc::new(Self {
            engine,
            pool,
            config,
            limiter,
            auth,
            remote,
        })
    }
}
