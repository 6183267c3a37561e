//! Storage-account repository

use std::str::FromStr;

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use driveshard_core::domain::{AccountId, AccountStatus, StorageAccount};

use crate::rows::{parse_datetime, parse_optional_datetime};
use crate::{classify, MetaError};

/// SQLite-backed account repository
pub struct AccountStore {
    pool: SqlitePool,
}

fn account_from_row(row: &SqliteRow) -> Result<StorageAccount, MetaError> {
    let id_str: String = row.get("id");
    let status_str: String = row.get("status");
    let token_expires: Option<String> = row.get("token_expires");
    let last_sync: Option<String> = row.get("last_sync");
    let created_at: String = row.get("created_at");
    let updated_at: String = row.get("updated_at");

    Ok(StorageAccount {
        id: AccountId::from_str(&id_str)
            .map_err(|e| MetaError::Decode(format!("invalid account id '{}': {}", id_str, e)))?,
        display_name: row.get("display_name"),
        email: row.get("email"),
        client_id: row.get("client_id"),
        client_secret: row.get("client_secret"),
        tenant_id: row.get("tenant_id"),
        refresh_token: row.get("refresh_token"),
        access_token: row.get("access_token"),
        token_expires: parse_optional_datetime(token_expires)?,
        total_space: row.get("total_space"),
        used_space: row.get("used_space"),
        status: AccountStatus::parse(&status_str).map_err(|e| MetaError::Decode(e.to_string()))?,
        priority: row.get::<i64, _>("priority") as i32,
        last_sync: parse_optional_datetime(last_sync)?,
        error_message: row.get("error_message"),
        created_at: parse_datetime(&created_at)?,
        updated_at: parse_datetime(&updated_at)?,
    })
}

impl AccountStore {
    /// Creates a new repository over the given pool
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert an account row
    pub async fn insert(&self, account: &StorageAccount) -> Result<(), MetaError> {
        sqlx::query(
            "INSERT INTO accounts
                 (id, display_name, email, client_id, client_secret, tenant_id,
                  refresh_token, access_token, token_expires, total_space, used_space,
                  status, priority, last_sync, error_message, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(account.id.to_string())
        .bind(&account.display_name)
        .bind(&account.email)
        .bind(&account.client_id)
        .bind(&account.client_secret)
        .bind(&account.tenant_id)
        .bind(&account.refresh_token)
        .bind(&account.access_token)
        .bind(account.token_expires.map(|t| t.to_rfc3339()))
        .bind(account.total_space)
        .bind(account.used_space)
        .bind(account.status.as_str())
        .bind(account.priority as i64)
        .bind(account.last_sync.map(|t| t.to_rfc3339()))
        .bind(&account.error_message)
        .bind(account.created_at.to_rfc3339())
        .bind(account.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| classify(e, &account.id.to_string()))?;
        Ok(())
    }

    /// Fetch one account by id
    pub async fn get(&self, id: &AccountId) -> Result<Option<StorageAccount>, MetaError> {
        let row = sqlx::query("SELECT * FROM accounts WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(account_from_row).transpose()
    }

    /// All accounts, newest first
    pub async fn list(&self) -> Result<Vec<StorageAccount>, MetaError> {
        let rows = sqlx::query("SELECT * FROM accounts ORDER BY created_at DESC, id")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(account_from_row).collect()
    }

    /// Accounts visible to the load balancer: `status = active`, ordered
    /// deterministically by priority descending then id ascending
    pub async fn list_active(&self) -> Result<Vec<StorageAccount>, MetaError> {
        let rows = sqlx::query(
            "SELECT * FROM accounts WHERE status = 'active' ORDER BY priority DESC, id ASC",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(account_from_row).collect()
    }

    /// Update the mutable profile fields (name, priority, status)
    pub async fn update_profile(
        &self,
        id: &AccountId,
        display_name: &str,
        priority: i32,
        status: AccountStatus,
    ) -> Result<bool, MetaError> {
        let result = sqlx::query(
            "UPDATE accounts SET display_name = ?, priority = ?, status = ?, updated_at = ?
             WHERE id = ?",
        )
        .bind(display_name)
        .bind(priority as i64)
        .bind(status.as_str())
        .bind(Utc::now().to_rfc3339())
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Persist a refreshed token set
    ///
    /// The refresh token is only replaced when the provider rotated it.
    pub async fn update_tokens(
        &self,
        id: &AccountId,
        access_token: &str,
        token_expires: DateTime<Utc>,
        refresh_token: Option<&str>,
    ) -> Result<(), MetaError> {
        sqlx::query(
            "UPDATE accounts SET
                 access_token = ?,
                 token_expires = ?,
                 refresh_token = COALESCE(?, refresh_token),
                 status = 'active',
                 error_message = NULL,
                 updated_at = ?
             WHERE id = ?",
        )
        .bind(access_token)
        .bind(token_expires.to_rfc3339())
        .bind(refresh_token)
        .bind(Utc::now().to_rfc3339())
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Move an account into the error state with a message
    pub async fn mark_error(&self, id: &AccountId, message: &str) -> Result<(), MetaError> {
        sqlx::query(
            "UPDATE accounts SET status = 'error', error_message = ?, updated_at = ?
             WHERE id = ?",
        )
        .bind(message)
        .bind(Utc::now().to_rfc3339())
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Record a quota sync
    pub async fn update_quota(
        &self,
        id: &AccountId,
        total_space: i64,
        used_space: i64,
    ) -> Result<(), MetaError> {
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            "UPDATE accounts SET total_space = ?, used_space = ?, last_sync = ?, updated_at = ?
             WHERE id = ?",
        )
        .bind(total_space)
        .bind(used_space)
        .bind(&now)
        .bind(&now)
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Delete an account row; returns false when it did not exist
    pub async fn delete(&self, id: &AccountId) -> Result<bool, MetaError> {
        let result = sqlx::query("DELETE FROM accounts WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
