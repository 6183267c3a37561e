//! Request and response DTOs
//!
//! Domain entities serialize directly where safe; accounts go through a view
//! that never exposes secrets or tokens.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use driveshard_core::domain::{StorageAccount, VirtualDirectory, VirtualFile};

/// Body of `POST /vfs/{bucket}/_mkdir`
#[derive(Debug, Deserialize)]
pub struct MkdirRequest {
    pub path: String,
}

/// Body of `POST /vfs/{bucket}/_move` and `_copy`
#[derive(Debug, Deserialize)]
pub struct MoveRequest {
    pub source: String,
    pub destination: String,
}

/// Body of `POST /accounts`
#[derive(Debug, Deserialize)]
pub struct CreateAccountRequest {
    pub display_name: String,
    pub email: String,
    pub client_id: String,
    pub client_secret: String,
    pub tenant_id: String,
    pub refresh_token: String,
    #[serde(default)]
    pub access_token: String,
    #[serde(default)]
    pub expires_in: Option<u64>,
    #[serde(default)]
    pub priority: i32,
}

/// Body of `PUT /accounts/{id}`
#[derive(Debug, Deserialize)]
pub struct UpdateAccountRequest {
    pub display_name: Option<String>,
    pub priority: Option<i32>,
    pub status: Option<String>,
}

/// Body of `POST /oauth/authorize-url`
#[derive(Debug, Deserialize)]
pub struct AuthorizeUrlRequest {
    pub client_id: String,
    pub client_secret: String,
    pub tenant_id: String,
    pub redirect_uri: String,
    pub state: String,
}

/// Body of `POST /oauth/callback`
#[derive(Debug, Deserialize)]
pub struct OAuthCallbackRequest {
    pub client_id: String,
    pub client_secret: String,
    pub tenant_id: String,
    pub redirect_uri: String,
    pub code: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub priority: i32,
}

/// Account representation with credentials and tokens redacted
#[derive(Debug, Serialize)]
pub struct AccountView {
    pub id: String,
    pub display_name: String,
    pub email: String,
    pub tenant_id: String,
    pub status: String,
    pub priority: i32,
    pub total_space: i64,
    pub used_space: i64,
    pub token_expires: Option<DateTime<Utc>>,
    pub last_sync: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<&StorageAccount> for AccountView {
    fn from(account: &StorageAccount) -> Self {
        Self {
            id: account.id.to_string(),
            display_name: account.display_name.clone(),
            email: account.email.clone(),
            tenant_id: account.tenant_id.clone(),
            status: account.status.to_string(),
            priority: account.priority,
            total_space: account.total_space,
            used_space: account.used_space,
            token_expires: account.token_expires,
            last_sync: account.last_sync,
            error_message: account.error_message.clone(),
            created_at: account.created_at,
        }
    }
}

/// Directory entry in listing responses
#[derive(Debug, Serialize)]
pub struct DirectoryView {
    pub name: String,
    pub path: String,
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub created_at: DateTime<Utc>,
}

impl From<&VirtualDirectory> for DirectoryView {
    fn from(dir: &VirtualDirectory) -> Self {
        Self {
            name: dir.name.clone(),
            path: dir.full_path.to_string(),
            kind: "directory",
            created_at: dir.created_at,
        }
    }
}

/// File entry in listing responses
#[derive(Debug, Serialize)]
pub struct FileView {
    pub name: String,
    pub path: String,
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub size: i64,
    pub mime_type: String,
    pub object_key: String,
    pub updated_at: DateTime<Utc>,
}

impl From<&VirtualFile> for FileView {
    fn from(file: &VirtualFile) -> Self {
        Self {
            name: file.name.clone(),
            path: file.full_path.to_string(),
            kind: "file",
            size: file.size,
            mime_type: file.mime_type.clone(),
            object_key: file.object_key.to_string(),
            updated_at: file.updated_at,
        }
    }
}
