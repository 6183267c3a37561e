//! Storage-account entity
//!
//! A storage account is one upstream cloud-drive credential set. The pool of
//! accounts is what the load balancer selects from; an account whose status
//! is not `active` is invisible to it.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::ids::AccountId;
use crate::error::StorageError;

/// Operational status of a storage account
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountStatus {
    /// Account is healthy and eligible for writes
    #[default]
    Active,
    /// Account has been taken out of rotation by an operator
    Inactive,
    /// Last token refresh or sync failed; see `error_message`
    Error,
}

impl AccountStatus {
    /// Storage representation
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Inactive => "inactive",
            Self::Error => "error",
        }
    }

    /// Parse the storage representation
    ///
    /// # Errors
    /// Returns `StorageError::Internal` for an unknown status string.
    pub fn parse(s: &str) -> Result<Self, StorageError> {
        match s {
            "active" => Ok(Self::Active),
            "inactive" => Ok(Self::Inactive),
            "error" => Ok(Self::Error),
            other => Err(StorageError::Internal(format!(
                "unknown account status: {other}"
            ))),
        }
    }
}

impl std::fmt::Display for AccountStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One upstream cloud-drive account with its OAuth2 credentials and quota
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageAccount {
    /// Unique account id
    pub id: AccountId,
    /// Human-readable label
    pub display_name: String,
    /// Account owner's email
    pub email: String,
    /// OAuth2 application (client) id
    pub client_id: String,
    /// OAuth2 client secret
    pub client_secret: String,
    /// Identity tenant the OAuth endpoints are scoped to
    pub tenant_id: String,
    /// Current refresh token (rotated on refresh when the provider issues one)
    pub refresh_token: String,
    /// Current access token
    pub access_token: String,
    /// When the access token expires
    pub token_expires: Option<DateTime<Utc>>,
    /// Total quota in bytes as reported by the drive (0 = not yet synced)
    pub total_space: i64,
    /// Used bytes as reported by the drive
    pub used_space: i64,
    /// Operational status
    pub status: AccountStatus,
    /// Load-balancing priority (used by the weighted strategy, and for
    /// deterministic active-account ordering)
    pub priority: i32,
    /// Last successful quota sync
    pub last_sync: Option<DateTime<Utc>>,
    /// Failure message from the last refresh/sync error
    pub error_message: Option<String>,
    /// When the account was registered
    pub created_at: DateTime<Utc>,
    /// When the row was last updated
    pub updated_at: DateTime<Utc>,
}

impl StorageAccount {
    /// Returns true when the account is eligible for selection
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status == AccountStatus::Active
    }

    /// Remaining quota in bytes; unsynced accounts (`total_space == 0`)
    /// report no meaningful value and are treated as unconstrained by the
    /// balancer
    #[must_use]
    pub fn available_space(&self) -> i64 {
        (self.total_space - self.used_space).max(0)
    }

    /// Fraction of quota used; 0.0 when unsynced
    #[must_use]
    pub fn usage_ratio(&self) -> f64 {
        if self.total_space <= 0 {
            0.0
        } else {
            self.used_space as f64 / self.total_space as f64
        }
    }

    /// Returns true when the access token is missing, already expired, or
    /// expires within `window`
    #[must_use]
    pub fn token_expires_within(&self, window: Duration) -> bool {
        match self.token_expires {
            None => true,
            Some(expires) => expires - Utc::now() < window,
        }
    }
}
