//! DriveShard - S3-style gateway over a pool of personal drive accounts
//!
//! Wires configuration, the metadata pool, the upstream drive client and the
//! engine services together, then serves the JSON API until interrupted.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use driveshard_core::ports::{AuthProvider, RemoteStore};
use driveshard_core::Config;
use driveshard_drive::{DriveClient, OAuthFlow};
use driveshard_engine::Engine;
use driveshard_meta::DatabasePool;
use driveshard_server::{server, AppState};

#[derive(Debug, Parser)]
#[command(
    name = "driveshard",
    version,
    about = "S3-style storage gateway over a pool of personal cloud-drive accounts"
)]
struct Cli {
    /// Path to the YAML configuration file
    #[arg(short, long, default_value = "driveshard.yaml")]
    config: PathBuf,
}

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.logging.level.clone()));

    if config.logging.format == "json" {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load_or_default(&cli.config);
    init_tracing(&config);

    tracing::info!(
        config = %cli.config.display(),
        strategy = ?config.load_balance.strategy,
        remote_enabled = config.upload.remote_enabled,
        "starting driveshard"
    );

    let pool = DatabasePool::new(&config.database.path, config.database.max_connections)
        .await
        .context("failed to open the metadata store")?;

    let remote: Arc<dyn RemoteStore> = Arc::new(DriveClient::new());
    let auth: Arc<dyn AuthProvider> = Arc::new(OAuthFlow::new());

    let engine = Engine::new(&config, &pool, Arc::clone(&remote), Arc::clone(&auth));
    let state = AppState::new(engine, pool, config, auth, remote);

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "failed to listen for shutdown signal");
        }
    };

    server::run(state, shutdown).await
}
