//! OAuth2 authorization-code + refresh-token flow
//!
//! Confidential-client flow against tenant-scoped identity endpoints. Each
//! storage account carries its own `(client_id, client_secret, tenant_id)`
//! triple, so the flow is built per call rather than held as state.

use oauth2::{
    basic::BasicClient, AuthUrl, AuthorizationCode, ClientId, ClientSecret, CsrfToken,
    EndpointNotSet, EndpointSet, RedirectUrl, RefreshToken, RequestTokenError, Scope,
    TokenResponse, TokenUrl,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use driveshard_core::ports::{
    AuthProvider, OAuthCredentials, RemoteError, RemoteStore, TokenGrant,
};

use crate::client::DriveClient;

/// Tenant-scoped authorization endpoint template
const AUTH_URL_TEMPLATE: &str = "https://login.microsoftonline.com/{tenant}/oauth2/v2.0/authorize";

/// Tenant-scoped token endpoint template
const TOKEN_URL_TEMPLATE: &str = "https://login.microsoftonline.com/{tenant}/oauth2/v2.0/token";

/// Scopes requested for every account: a refresh token plus drive access
const SCOPES: &[&str] = &["offline_access", "Files.ReadWrite.All"];

type ConfiguredClient =
    BasicClient<EndpointSet, EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointSet>;

/// OAuth2 flow implementation over the `oauth2` crate
pub struct OAuthFlow {
    http: reqwest::Client,
    auth_url_template: String,
    token_url_template: String,
    /// Client used for token validation probes
    drive: DriveClient,
}

impl Default for OAuthFlow {
    fn default() -> Self {
        Self::new()
    }
}

impl OAuthFlow {
    /// Creates a flow against the production identity endpoints
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::new(),
            auth_url_template: AUTH_URL_TEMPLATE.to_string(),
            token_url_template: TOKEN_URL_TEMPLATE.to_string(),
            drive: DriveClient::new(),
        }
    }

    /// Creates a flow with custom endpoints (useful for testing)
    ///
    /// `identity_base` replaces `https://login.microsoftonline.com`;
    /// `drive_base` is handed to the validation probe client.
    pub fn with_endpoints(identity_base: &str, drive_base: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            auth_url_template: format!("{identity_base}/{{tenant}}/oauth2/v2.0/authorize"),
            token_url_template: format!("{identity_base}/{{tenant}}/oauth2/v2.0/token"),
            drive: DriveClient::with_base_url(drive_base),
        }
    }

    fn endpoints(&self, tenant: &str) -> (String, String) {
        (
            self.auth_url_template.replace("{tenant}", tenant),
            self.token_url_template.replace("{tenant}", tenant),
        )
    }

    fn build_client(
        &self,
        creds: &OAuthCredentials,
        redirect_uri: &str,
    ) -> Result<ConfiguredClient, RemoteError> {
        let (auth_url, token_url) = self.endpoints(&creds.tenant_id);

        let client = BasicClient::new(ClientId::new(creds.client_id.clone()))
            .set_client_secret(ClientSecret::new(creds.client_secret.clone()))
            .set_auth_uri(
                AuthUrl::new(auth_url)
                    .map_err(|e| RemoteError::Other(format!("invalid authorization URL: {e}")))?,
            )
            .set_token_uri(
                TokenUrl::new(token_url)
                    .map_err(|e| RemoteError::Other(format!("invalid token URL: {e}")))?,
            )
            .set_redirect_uri(
                RedirectUrl::new(redirect_uri.to_string())
                    .map_err(|e| RemoteError::Other(format!("invalid redirect URI: {e}")))?,
            );

        Ok(client)
    }
}

fn grant_from_response<T>(response: &T, fallback_refresh: Option<&str>) -> TokenGrant
where
    T: TokenResponse,
{
    TokenGrant {
        access_token: response.access_token().secret().to_string(),
        refresh_token: response
            .refresh_token()
            .map(|t| t.secret().to_string())
            .or_else(|| fallback_refresh.map(str::to_string)),
        expires_in: response.expires_in().map_or(3600, |d| d.as_secs()),
        scope: response
            .scopes()
            .map(|scopes| scopes.iter().map(|s| s.as_str()).collect::<Vec<_>>().join(" ")),
        token_type: Some("Bearer".to_string()),
    }
}

fn map_token_error<RE, TE>(err: RequestTokenError<RE, TE>) -> RemoteError
where
    RE: std::error::Error + 'static,
    TE: oauth2::ErrorResponse + 'static,
{
    match err {
        RequestTokenError::ServerResponse(resp) => RemoteError::Status {
            status: 400,
            message: format!("{resp:?}"),
        },
        RequestTokenError::Request(req) => RemoteError::Connection(req.to_string()),
        other => RemoteError::Other(other.to_string()),
    }
}

#[async_trait::async_trait]
impl AuthProvider for OAuthFlow {
    fn authorize_url(&self, creds: &OAuthCredentials, redirect_uri: &str, state: &str) -> String {
        let client = match self.build_client(creds, redirect_uri) {
            Ok(client) => client,
            // An unparseable endpoint cannot produce a URL; hand back the
            // template so the failure is visible to the caller.
            Err(_) => return self.endpoints(&creds.tenant_id).0,
        };

        let state = state.to_string();
        let mut request = client.authorize_url(move || CsrfToken::new(state.clone()));
        for scope in SCOPES {
            request = request.add_scope(Scope::new((*scope).to_string()));
        }

        let (url, _csrf) = request.url();
        debug!("built authorization URL");
        url.to_string()
    }

    async fn exchange_code(
        &self,
        creds: &OAuthCredentials,
        redirect_uri: &str,
        code: &str,
        cancel: &CancellationToken,
    ) -> Result<TokenGrant, RemoteError> {
        info!("exchanging authorization code for tokens");
        let client = self.build_client(creds, redirect_uri)?;

        let exchange = client
            .exchange_code(AuthorizationCode::new(code.to_string()))
            .request_async(&self.http);

        let response = tokio::select! {
            () = cancel.cancelled() => return Err(RemoteError::Cancelled),
            result = exchange => result.map_err(map_token_error)?,
        };

        info!("authorization code exchange succeeded");
        Ok(grant_from_response(&response, None))
    }

    async fn refresh(
        &self,
        creds: &OAuthCredentials,
        refresh_token: &str,
        cancel: &CancellationToken,
    ) -> Result<TokenGrant, RemoteError> {
        debug!("refreshing access token");
        // The redirect URI is not used by the refresh grant.
        let client = self.build_client(creds, "http://localhost/unused")?;

        let refresh_token_value = RefreshToken::new(refresh_token.to_string());
        let exchange = client
            .exchange_refresh_token(&refresh_token_value)
            .request_async(&self.http);

        let response = tokio::select! {
            () = cancel.cancelled() => return Err(RemoteError::Cancelled),
            result = exchange => result.map_err(map_token_error)?,
        };

        info!("access token refreshed");
        Ok(grant_from_response(&response, Some(refresh_token)))
    }

    async fn validate(
        &self,
        access_token: &str,
        cancel: &CancellationToken,
    ) -> Result<bool, RemoteError> {
        match self.drive.get_drive(access_token, cancel).await {
            Ok(_) => Ok(true),
            Err(RemoteError::Status { .. }) => Ok(false),
            Err(err) => Err(err),
        }
    }
}
