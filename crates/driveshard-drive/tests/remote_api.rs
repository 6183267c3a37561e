//! Integration tests for the drive client and OAuth flow
//!
//! All upstream endpoints are mocked with wiremock; no network access.

use tokio_util::sync::CancellationToken;
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use driveshard_core::ports::{
    AuthProvider, ChunkOutcome, OAuthCredentials, RemoteError, RemoteStore,
};
use driveshard_drive::{DriveClient, OAuthFlow};

fn cancel() -> CancellationToken {
    CancellationToken::new()
}

fn creds() -> OAuthCredentials {
    OAuthCredentials {
        client_id: "app-1".to_string(),
        client_secret: "secret".to_string(),
        tenant_id: "common".to_string(),
    }
}

// ============================================================================
// Drive info
// ============================================================================

#[tokio::test]
async fn test_get_drive_parses_quota_and_owner() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/me/drive"))
        .and(header("authorization", "Bearer tok-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": "drive-001",
            "owner": { "user": { "displayName": "Pool Account", "email": "pool@example.com" } },
            "quota": { "total": 1000_u64, "used": 250_u64, "remaining": 750_u64, "state": "normal" }
        })))
        .mount(&server)
        .await;

    let client = DriveClient::with_base_url(server.uri());
    let drive = client.get_drive("tok-1", &cancel()).await.unwrap();

    assert_eq!(drive.id, "drive-001");
    assert_eq!(drive.owner_name, "Pool Account");
    assert_eq!(drive.owner_email.as_deref(), Some("pool@example.com"));
    assert_eq!(drive.quota.total, 1000);
    assert_eq!(drive.quota.used, 250);
    assert_eq!(drive.quota.state, "normal");
}

#[tokio::test]
async fn test_get_drive_unauthorized_maps_to_status() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/me/drive"))
        .respond_with(ResponseTemplate::new(401).set_body_string("token expired"))
        .mount(&server)
        .await;

    let client = DriveClient::with_base_url(server.uri());
    let err = client.get_drive("stale", &cancel()).await.unwrap_err();

    match err {
        RemoteError::Status { status, message } => {
            assert_eq!(status, 401);
            assert!(message.contains("token expired"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

// ============================================================================
// Uploads
// ============================================================================

#[tokio::test]
async fn test_upload_small_puts_content() {
    let server = MockServer::start().await;

    Mock::given(method("PUT"))
        .and(path("/me/drive/root:/my-data/hello.txt:/content"))
        .and(header("authorization", "Bearer tok-1"))
        .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
            "id": "ITEM-42",
            "name": "hello.txt",
            "size": 2,
            "lastModifiedDateTime": "2026-07-01T00:00:00Z",
            "file": { "mimeType": "text/plain" }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = DriveClient::with_base_url(server.uri());
    let item = client
        .upload_small("tok-1", "/my-data/hello.txt", b"hi", &cancel())
        .await
        .unwrap();

    assert_eq!(item.id, "ITEM-42");
    assert_eq!(item.size, 2);
    assert_eq!(item.mime_type.as_deref(), Some("text/plain"));
}

#[tokio::test]
async fn test_create_session_then_chunks() {
    let server = MockServer::start().await;
    let session_url = format!("{}/upload-session/abc", server.uri());

    Mock::given(method("POST"))
        .and(path("/me/drive/root:/my-data/big.bin:/createUploadSession"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "uploadUrl": session_url,
            "expirationDateTime": "2026-07-01T12:00:00Z"
        })))
        .mount(&server)
        .await;

    // first chunk accepted, second completes
    Mock::given(method("PUT"))
        .and(path("/upload-session/abc"))
        .and(header("content-range", "bytes 0-4/10"))
        .respond_with(ResponseTemplate::new(202).set_body_json(serde_json::json!({
            "nextExpectedRanges": ["5-9"]
        })))
        .mount(&server)
        .await;

    Mock::given(method("PUT"))
        .and(path("/upload-session/abc"))
        .and(header("content-range", "bytes 5-9/10"))
        .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
            "id": "ITEM-BIG",
            "name": "big.bin",
            "size": 10
        })))
        .mount(&server)
        .await;

    let client = DriveClient::with_base_url(server.uri());
    let token = cancel();

    let session = client
        .create_upload_session("tok-1", "/my-data/big.bin", &token)
        .await
        .unwrap();
    assert!(session.expires_at.is_some());

    let first = client
        .upload_chunk("tok-1", &session, b"aaaaa", 0, 4, 10, &token)
        .await
        .unwrap();
    assert_eq!(first, ChunkOutcome::Accepted);

    let second = client
        .upload_chunk("tok-1", &session, b"bbbbb", 5, 9, 10, &token)
        .await
        .unwrap();
    match second {
        ChunkOutcome::Complete(item) => {
            assert_eq!(item.id, "ITEM-BIG");
            assert_eq!(item.size, 10);
        }
        other => panic!("expected completion, got {other:?}"),
    }
}

#[tokio::test]
async fn test_expired_session_chunk() {
    let server = MockServer::start().await;

    Mock::given(method("PUT"))
        .and(path("/upload-session/stale"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let client = DriveClient::with_base_url(server.uri());
    let session = driveshard_core::ports::UploadSession {
        upload_url: format!("{}/upload-session/stale", server.uri()),
        expires_at: None,
    };

    let err = client
        .upload_chunk("tok-1", &session, b"x", 0, 0, 1, &cancel())
        .await
        .unwrap_err();
    assert_eq!(err, RemoteError::SessionExpired);
}

// ============================================================================
// Download and delete
// ============================================================================

#[tokio::test]
async fn test_download_is_two_step() {
    let server = MockServer::start().await;
    let content_url = format!("{}/content/ITEM-7", server.uri());

    Mock::given(method("GET"))
        .and(path("/me/drive/items/ITEM-7"))
        .and(header("authorization", "Bearer tok-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": "ITEM-7",
            "name": "blob.bin",
            "size": 3,
            "@microsoft.graph.downloadUrl": content_url
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/content/ITEM-7"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"abc".to_vec()))
        .expect(1)
        .mount(&server)
        .await;

    let client = DriveClient::with_base_url(server.uri());
    let bytes = client.download("tok-1", "ITEM-7", &cancel()).await.unwrap();
    assert_eq!(bytes, b"abc");
}

#[tokio::test]
async fn test_delete_accepts_204_and_200() {
    let server = MockServer::start().await;

    Mock::given(method("DELETE"))
        .and(path("/me/drive/items/GONE-1"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/me/drive/items/GONE-2"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/me/drive/items/MISSING"))
        .respond_with(ResponseTemplate::new(404).set_body_string("not found"))
        .mount(&server)
        .await;

    let client = DriveClient::with_base_url(server.uri());
    client.delete("tok-1", "GONE-1", &cancel()).await.unwrap();
    client.delete("tok-1", "GONE-2", &cancel()).await.unwrap();

    let err = client.delete("tok-1", "MISSING", &cancel()).await.unwrap_err();
    assert!(matches!(err, RemoteError::Status { status: 404, .. }));
}

// ============================================================================
// OAuth flow
// ============================================================================

#[tokio::test]
async fn test_refresh_token_exchange() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/common/oauth2/v2.0/token"))
        .and(body_string_contains("grant_type=refresh_token"))
        .and(body_string_contains("refresh_token=old-refresh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "access_token": "fresh-access",
            "refresh_token": "rotated-refresh",
            "expires_in": 3600,
            "token_type": "Bearer",
            "scope": "offline_access Files.ReadWrite.All"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let flow = OAuthFlow::with_endpoints(&server.uri(), &server.uri());
    let grant = flow
        .refresh(&creds(), "old-refresh", &cancel())
        .await
        .unwrap();

    assert_eq!(grant.access_token, "fresh-access");
    assert_eq!(grant.refresh_token.as_deref(), Some("rotated-refresh"));
    assert_eq!(grant.expires_in, 3600);
}

#[tokio::test]
async fn test_refresh_keeps_old_token_when_not_rotated() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/common/oauth2/v2.0/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "access_token": "fresh-access",
            "expires_in": 1800,
            "token_type": "Bearer"
        })))
        .mount(&server)
        .await;

    let flow = OAuthFlow::with_endpoints(&server.uri(), &server.uri());
    let grant = flow
        .refresh(&creds(), "kept-refresh", &cancel())
        .await
        .unwrap();

    assert_eq!(grant.refresh_token.as_deref(), Some("kept-refresh"));
}

#[tokio::test]
async fn test_code_exchange() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/common/oauth2/v2.0/token"))
        .and(body_string_contains("grant_type=authorization_code"))
        .and(body_string_contains("code=auth-code-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "access_token": "first-access",
            "refresh_token": "first-refresh",
            "expires_in": 3600,
            "token_type": "Bearer"
        })))
        .mount(&server)
        .await;

    let flow = OAuthFlow::with_endpoints(&server.uri(), &server.uri());
    let grant = flow
        .exchange_code(&creds(), "http://localhost/cb", "auth-code-1", &cancel())
        .await
        .unwrap();

    assert_eq!(grant.access_token, "first-access");
    assert_eq!(grant.refresh_token.as_deref(), Some("first-refresh"));
}

#[tokio::test]
async fn test_refresh_rejection_is_not_retryable() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/common/oauth2/v2.0/token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
            "error": "invalid_grant",
            "error_description": "refresh token revoked"
        })))
        .mount(&server)
        .await;

    let flow = OAuthFlow::with_endpoints(&server.uri(), &server.uri());
    let err = flow
        .refresh(&creds(), "revoked", &cancel())
        .await
        .unwrap_err();

    assert!(!err.is_retryable());
}

#[tokio::test]
async fn test_validate_probes_drive_info() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/me/drive"))
        .and(header("authorization", "Bearer good"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": "d", "quota": { "total": 1, "used": 0 }
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/me/drive"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let flow = OAuthFlow::with_endpoints(&server.uri(), &server.uri());
    assert!(flow.validate("good", &cancel()).await.unwrap());
    assert!(!flow.validate("bad", &cancel()).await.unwrap());
}
