//! OAuth2 port
//!
//! Authorization-code and refresh-token exchanges against a tenant-scoped
//! identity endpoint. Credentials are per storage account; the provider
//! itself is stateless.

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use super::remote_store::RemoteError;

/// Per-account OAuth2 credential triple
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OAuthCredentials {
    /// Application (client) id
    pub client_id: String,
    /// Client secret
    pub client_secret: String,
    /// Identity tenant (e.g. "common" or a directory id)
    pub tenant_id: String,
}

/// Token endpoint response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenGrant {
    /// Bearer access token
    pub access_token: String,
    /// Rotated refresh token, when the provider issued one
    pub refresh_token: Option<String>,
    /// Lifetime of the access token in seconds
    pub expires_in: u64,
    /// Granted scope
    pub scope: Option<String>,
    /// Token type (normally "Bearer")
    pub token_type: Option<String>,
}

/// Port trait for the OAuth2 authorization-code + refresh-token flow
#[async_trait::async_trait]
pub trait AuthProvider: Send + Sync {
    /// Build the authorization URL for the consent redirect
    ///
    /// The scope requested is `offline_access` plus the drive scope; `state`
    /// is chosen by the caller and round-trips through the provider.
    fn authorize_url(&self, creds: &OAuthCredentials, redirect_uri: &str, state: &str) -> String;

    /// Exchange an authorization code for tokens
    async fn exchange_code(
        &self,
        creds: &OAuthCredentials,
        redirect_uri: &str,
        code: &str,
        cancel: &CancellationToken,
    ) -> Result<TokenGrant, RemoteError>;

    /// Exchange a refresh token for fresh tokens
    async fn refresh(
        &self,
        creds: &OAuthCredentials,
        refresh_token: &str,
        cancel: &CancellationToken,
    ) -> Result<TokenGrant, RemoteError>;

    /// Check whether an access token is still accepted upstream
    ///
    /// Issues a trivial authenticated call; any non-2xx answer means invalid.
    async fn validate(
        &self,
        access_token: &str,
        cancel: &CancellationToken,
    ) -> Result<bool, RemoteError>;
}
