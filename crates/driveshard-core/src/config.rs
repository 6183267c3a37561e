//! Configuration module for DriveShard.
//!
//! Provides typed configuration structs that map to the YAML configuration
//! file, with loading, validation, defaults, and environment overrides for
//! deployment-sensitive fields.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Config struct with sub-sections
// ---------------------------------------------------------------------------

/// Top-level configuration for DriveShard.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub upload: UploadConfig,
    pub load_balance: LoadBalanceConfig,
    pub retry: RetrySettings,
    pub token: TokenConfig,
    pub rate_limit: RateLimitConfig,
    pub logging: LoggingConfig,
}

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind host.
    pub host: String,
    /// Bind port.
    pub port: u16,
    /// Route prefix for the JSON API.
    pub prefix: String,
    /// Allowed CORS origins; `*` means any.
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            prefix: "/api/v1".to_string(),
            cors_origins: vec!["*".to_string()],
        }
    }
}

/// Metadata store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Path to the SQLite database file.
    pub path: PathBuf,
    /// Maximum pooled connections.
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("data/driveshard.db"),
            max_connections: 5,
        }
    }
}

/// Upload behaviour and backend selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    /// Largest accepted object in bytes.
    pub max_file_size: u64,
    /// Slice size for resumable uploads.
    pub chunk_size: u64,
    /// Payloads above this go through a resumable upload session.
    pub chunk_threshold: u64,
    /// Reserved for parallel chunk PUTs (chunks are currently sequential).
    pub parallel_chunks: u32,
    /// Whether uploads target the upstream account pool at all.
    pub remote_enabled: bool,
    /// Root directory for local-fallback blobs.
    pub local_root: PathBuf,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_file_size: 5 * 1024 * 1024 * 1024,
            chunk_size: 10 * 1024 * 1024,
            chunk_threshold: 4 * 1024 * 1024,
            parallel_chunks: 1,
            remote_enabled: true,
            local_root: PathBuf::from("data/storage"),
        }
    }
}

/// Load-balancer strategy selection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BalanceStrategy {
    /// Pick the account with the lowest used/total ratio.
    #[default]
    LeastUsed,
    /// Cycle through candidates with a shared counter.
    RoundRobin,
    /// Weighted random over account priorities.
    Weighted,
}

/// Load-balancing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoadBalanceConfig {
    /// Selection strategy.
    pub strategy: BalanceStrategy,
    /// Seconds between background account health checks.
    pub health_check_interval_s: u64,
}

impl Default for LoadBalanceConfig {
    fn default() -> Self {
        Self {
            strategy: BalanceStrategy::LeastUsed,
            health_check_interval_s: 300,
        }
    }
}

/// Retry/backoff settings shared by all upstream calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    /// Total attempts including the first.
    pub max_attempts: u32,
    /// Delay before the first retry, in milliseconds.
    pub initial_delay_ms: u64,
    /// Ceiling for any single delay, in milliseconds.
    pub max_delay_ms: u64,
    /// Exponential growth factor.
    pub multiplier: f64,
    /// Whether to add up to 25% uniform jitter.
    pub jitter: bool,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 500,
            max_delay_ms: 30_000,
            multiplier: 2.0,
            jitter: true,
        }
    }
}

/// OAuth token lifecycle settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenConfig {
    /// Refresh when the token expires within this many seconds.
    pub refresh_before_expire_s: i64,
    /// Seconds between background refresh sweeps.
    pub refresh_check_interval_s: u64,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            refresh_before_expire_s: 300,
            refresh_check_interval_s: 600,
        }
    }
}

/// Per-client-IP rate limiting at the API adapter.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Bucket capacity (burst size).
    pub capacity: u32,
    /// Tokens added per second.
    pub refill_per_sec: f64,
    /// Buckets idle this long are garbage-collected.
    pub idle_gc_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            capacity: 100,
            refill_per_sec: 50.0,
            idle_gc_secs: 300,
        }
    }
}

/// Logging / tracing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: `trace`, `debug`, `info`, `warn`, or `error`.
    pub level: String,
    /// Output format: `pretty` or `json`.
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

impl Config {
    /// Load configuration from a YAML file at `path`, then apply environment
    /// overrides.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let mut config: Config = serde_yaml::from_str(&content)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Try to load from `path`; fall back to defaults (plus environment
    /// overrides) on any error.
    pub fn load_or_default(path: &Path) -> Self {
        Self::load(path).unwrap_or_else(|_| {
            let mut config = Config::default();
            config.apply_env_overrides();
            config
        })
    }

    /// Apply `DRIVESHARD_*` environment overrides for deployment-sensitive
    /// fields.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(host) = std::env::var("DRIVESHARD_HOST") {
            self.server.host = host;
        }
        if let Ok(port) = std::env::var("DRIVESHARD_PORT") {
            if let Ok(port) = port.parse() {
                self.server.port = port;
            }
        }
        if let Ok(origins) = std::env::var("DRIVESHARD_CORS_ORIGINS") {
            self.server.cors_origins = origins.split(',').map(|s| s.trim().to_string()).collect();
        }
        if let Ok(path) = std::env::var("DRIVESHARD_DB_PATH") {
            self.database.path = PathBuf::from(path);
        }
        if let Ok(level) = std::env::var("DRIVESHARD_LOG_LEVEL") {
            self.logging.level = level;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.upload.chunk_size, 10 * 1024 * 1024);
        assert_eq!(config.upload.chunk_threshold, 4 * 1024 * 1024);
        assert_eq!(config.token.refresh_before_expire_s, 300);
        assert_eq!(config.load_balance.strategy, BalanceStrategy::LeastUsed);
        assert!(config.retry.jitter);
    }

    #[test]
    fn test_load_partial_yaml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            "server:\n  port: 9000\nload_balance:\n  strategy: round_robin\n"
        )
        .unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.load_balance.strategy, BalanceStrategy::RoundRobin);
        // untouched sections keep their defaults
        assert_eq!(config.database.max_connections, 5);
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let config = Config::load_or_default(Path::new("/nonexistent/driveshard.yaml"));
        assert_eq!(config.server.prefix, "/api/v1");
    }

    #[test]
    fn test_strategy_serde_names() {
        let yaml = "strategy: weighted\nhealth_check_interval_s: 60\n";
        let lb: LoadBalanceConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(lb.strategy, BalanceStrategy::Weighted);
    }
}
