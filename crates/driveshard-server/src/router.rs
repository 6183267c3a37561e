//! Route dispatch
//!
//! Hand-rolled dispatch over method + path segments: the surface is small
//! and stable enough that a router dependency buys nothing. Handlers return
//! `Result<Response, StorageError>`; the error arm renders the envelope.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;

use futures_util::FutureExt;
use http_body_util::BodyExt;
use hyper::body::Incoming;
use hyper::header::HeaderValue;
use hyper::{Method, Request, Response};
use serde::de::DeserializeOwned;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};

use driveshard_core::domain::{AccountId, AccountStatus};
use driveshard_core::ports::OAuthCredentials;
use driveshard_core::StorageError;
use driveshard_engine::NewAccount;

use crate::dto::{
    AccountView, AuthorizeUrlRequest, CreateAccountRequest, DirectoryView, FileView, MkdirRequest,
    MoveRequest, OAuthCallbackRequest, UpdateAccountRequest,
};
use crate::envelope::{self, adapter_error, Body};
use crate::state::AppState;

/// Top-level request entry: CORS, rate limiting, panic recovery, dispatch
pub async fn handle(
    state: Arc<AppState>,
    peer_ip: IpAddr,
    req: Request<Incoming>,
) -> Response<Body> {
    let origin = req.headers().get("origin").cloned();

    if req.method() == Method::OPTIONS {
        return with_cors(envelope::empty(204), &state, origin.as_ref());
    }

    let path = req.uri().path().to_string();
    if !is_probe(&state, &path) && !state.limiter.allow(peer_ip) {
        let response = adapter_error(429, "RATE_LIMITED", "too many requests");
        return with_cors(response, &state, origin.as_ref());
    }

    // A panicking handler becomes a 500, never a dropped connection.
    let response = match std::panic::AssertUnwindSafe(route(state.clone(), req))
        .catch_unwind()
        .await
    {
        Ok(response) => response,
        Err(panic) => {
            let message = panic
                .downcast_ref::<&str>()
                .map(|s| (*s).to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            error!(%path, panic = %message, "request handler panicked");
            adapter_error(500, "INTERNAL_ERROR", "internal server error")
        }
    };

    with_cors(response, &state, origin.as_ref())
}

fn is_probe(state: &AppState, path: &str) -> bool {
    let prefix = state.config.server.prefix.as_str();
    matches!(
        path.strip_prefix(prefix).map(|p| p.trim_matches('/')),
        Some("health" | "info" | "ready" | "live")
    )
}

fn with_cors(
    mut response: Response<Body>,
    state: &AppState,
    origin: Option<&HeaderValue>,
) -> Response<Body> {
    let origins = &state.config.server.cors_origins;
    let allow = if origins.iter().any(|o| o == "*") {
        Some(HeaderValue::from_static("*"))
    } else {
        origin
            .filter(|o| origins.iter().any(|allowed| o.as_bytes() == allowed.as_bytes()))
            .cloned()
    };

    if let Some(allow) = allow {
        let headers = response.headers_mut();
        headers.insert("Access-Control-Allow-Origin", allow);
        headers.insert(
            "Access-Control-Allow-Methods",
            HeaderValue::from_static("GET,POST,PUT,DELETE,HEAD,OPTIONS"),
        );
        headers.insert(
            "Access-Control-Allow-Headers",
            HeaderValue::from_static("Content-Type,Authorization"),
        );
    }
    response
}

async fn route(state: Arc<AppState>, req: Request<Incoming>) -> Response<Body> {
    match dispatch(state, req).await {
        Ok(response) => response,
        Err(err) => {
            if !err.is_client_error() {
                warn!(code = err.code(), error = %err, "request failed");
            }
            envelope::storage_error(&err)
        }
    }
}

fn parse_query(query: Option<&str>) -> HashMap<String, String> {
    query
        .map(|q| {
            url::form_urlencoded::parse(q.as_bytes())
                .map(|(k, v)| (k.into_owned(), v.into_owned()))
                .collect()
        })
        .unwrap_or_default()
}

async fn read_body(req: Request<Incoming>) -> Result<Vec<u8>, StorageError> {
    let collected = req
        .into_body()
        .collect()
        .await
        .map_err(|e| StorageError::InvalidRequest(format!("failed to read request body: {e}")))?;
    Ok(collected.to_bytes().to_vec())
}

async fn read_json<T: DeserializeOwned>(req: Request<Incoming>) -> Result<T, StorageError> {
    let bytes = read_body(req).await?;
    serde_json::from_slice(&bytes)
        .map_err(|e| StorageError::InvalidRequest(format!("invalid JSON body: {e}")))
}

fn parse_account_id(raw: &str) -> Result<AccountId, StorageError> {
    raw.parse()
        .map_err(|_| StorageError::InvalidRequest(format!("invalid account id: {raw}")))
}

async fn dispatch(
    state: Arc<AppState>,
    req: Request<Incoming>,
) -> Result<Response<Body>, StorageError> {
    let prefix = state.config.server.prefix.clone();
    let method = req.method().clone();
    let uri_path = req.uri().path().to_string();
    let query = parse_query(req.uri().query());

    let rel = uri_path
        .strip_prefix(prefix.as_str())
        .unwrap_or(uri_path.as_str())
        .trim_start_matches('/')
        .to_string();
    let trailing_slash = rel.ends_with('/');
    let segments: Vec<String> = rel
        .split('/')
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect();
    let parts: Vec<&str> = segments.iter().map(String::as_str).collect();
    let cancel = CancellationToken::new();

    match (&method, parts.as_slice()) {
        // ------------------------------------------------------------
        // Health surface
        // ------------------------------------------------------------
        (&Method::GET, ["health"]) => match state.pool.ping().await {
            Ok(()) => Ok(envelope::json(200, &json!({ "status": "ok" }))),
            Err(e) => {
                warn!(error = %e, "health check failed");
                Ok(envelope::json(
                    503,
                    &json!({ "status": "degraded", "database": e.to_string() }),
                ))
            }
        },
        (&Method::GET, ["ready"]) => match state.pool.ping().await {
            Ok(()) => Ok(envelope::json(200, &json!({ "ready": true }))),
            Err(_) => Ok(envelope::json(503, &json!({ "ready": false }))),
        },
        (&Method::GET, ["live"]) => Ok(envelope::json(200, &json!({ "alive": true }))),
        (&Method::GET, ["info"]) => Ok(envelope::json(
            200,
            &json!({
                "name": "driveshard",
                "version": env!("CARGO_PKG_VERSION"),
                "strategy": state.config.load_balance.strategy,
                "remote_enabled": state.config.upload.remote_enabled,
            }),
        )),

        // ------------------------------------------------------------
        // Buckets
        // ------------------------------------------------------------
        (&Method::GET, ["buckets"]) => {
            let buckets = state.engine.objects.list_buckets().await?;
            Ok(envelope::json(200, &json!({ "buckets": buckets })))
        }
        (&Method::PUT, ["buckets", bucket]) => {
            let created = state.engine.objects.create_bucket(bucket).await?;
            Ok(envelope::json(201, &serde_json::to_value(created).unwrap_or_default()))
        }
        (&Method::GET, ["buckets", bucket]) => {
            let found = state.engine.objects.get_bucket(bucket).await?;
            Ok(envelope::json(200, &serde_json::to_value(found).unwrap_or_default()))
        }
        (&Method::DELETE, ["buckets", bucket]) => {
            state.engine.objects.delete_bucket(bucket).await?;
            Ok(envelope::empty(204))
        }

        // ------------------------------------------------------------
        // Objects
        // ------------------------------------------------------------
        (&Method::GET, ["objects", bucket]) => {
            let max_keys = query
                .get("max_keys")
                .and_then(|v| v.parse().ok())
                .unwrap_or(1000);
            let page = state
                .engine
                .objects
                .list(
                    bucket,
                    query.get("prefix").map(String::as_str),
                    query.get("marker").map(String::as_str),
                    max_keys,
                )
                .await?;
            Ok(envelope::json(
                200,
                &json!({
                    "objects": page.objects,
                    "next_marker": page.next_marker,
                    "truncated": page.truncated,
                }),
            ))
        }
        (&Method::PUT, ["objects", bucket, key @ ..]) => {
            let bucket = bucket.to_string();
            let key = key.join("/");
            let mime = req
                .headers()
                .get("content-type")
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            let data = read_body(req).await?;
            let record = state
                .engine
                .objects
                .upload(&bucket, &key, &data, mime.as_deref(), None, &cancel)
                .await?;
            Ok(envelope::json(200, &serde_json::to_value(record).unwrap_or_default()))
        }
        (&Method::GET, ["objects", bucket, key @ ..]) => {
            let (record, data) = state
                .engine
                .objects
                .download(bucket, &key.join("/"), &cancel)
                .await?;
            let mut response = envelope::bytes(200, &record.mime_type, data);
            if let Ok(etag) = HeaderValue::from_str(&format!("\"{}\"", record.etag)) {
                response.headers_mut().insert("ETag", etag);
            }
            Ok(response)
        }
        (&Method::HEAD, ["objects", bucket, key @ ..]) => {
            let record = state
                .engine
                .objects
                .get_metadata(bucket, &key.join("/"))
                .await?;
            let mut response = envelope::empty(200);
            let headers = response.headers_mut();
            if let Ok(v) = HeaderValue::from_str(&record.mime_type) {
                headers.insert("Content-Type", v);
            }
            if let Ok(v) = HeaderValue::from_str(&record.size.to_string()) {
                headers.insert("Content-Length", v);
            }
            if let Ok(v) = HeaderValue::from_str(&format!("\"{}\"", record.etag)) {
                headers.insert("ETag", v);
            }
            Ok(response)
        }
        (&Method::DELETE, ["objects", bucket, key @ ..]) => {
            state
                .engine
                .objects
                .delete(bucket, &key.join("/"), &cancel)
                .await?;
            Ok(envelope::empty(204))
        }

        // ------------------------------------------------------------
        // VFS
        // ------------------------------------------------------------
        (&Method::POST, ["vfs", bucket, "_mkdir"]) => {
            let bucket = bucket.to_string();
            let body: MkdirRequest = read_json(req).await?;
            let dir = state.engine.vfs.create_directory(&bucket, &body.path).await?;
            Ok(envelope::json(
                201,
                &serde_json::to_value(DirectoryView::from(&dir)).unwrap_or_default(),
            ))
        }
        (&Method::POST, ["vfs", bucket, "_move"]) => {
            let bucket = bucket.to_string();
            let body: MoveRequest = read_json(req).await?;
            // a file source moves a file, a directory source moves a subtree
            if state.engine.vfs.get_file(&bucket, &body.source).await.is_ok() {
                let moved = state
                    .engine
                    .vfs
                    .move_file(&bucket, &body.source, &body.destination)
                    .await?;
                Ok(envelope::json(
                    200,
                    &serde_json::to_value(FileView::from(&moved)).unwrap_or_default(),
                ))
            } else {
                let moved = state
                    .engine
                    .vfs
                    .move_directory(&bucket, &body.source, &body.destination)
                    .await?;
                Ok(envelope::json(
                    200,
                    &serde_json::to_value(DirectoryView::from(&moved)).unwrap_or_default(),
                ))
            }
        }
        (&Method::POST, ["vfs", bucket, "_copy"]) => {
            let bucket = bucket.to_string();
            let body: MoveRequest = read_json(req).await?;
            let copy = state
                .engine
                .vfs
                .copy_file(&bucket, &body.source, &body.destination, &cancel)
                .await?;
            Ok(envelope::json(
                200,
                &serde_json::to_value(FileView::from(&copy)).unwrap_or_default(),
            ))
        }
        (&Method::PUT, ["vfs", bucket, path @ ..]) => {
            let bucket = bucket.to_string();
            let path = format!("/{}", path.join("/"));
            let mime = req
                .headers()
                .get("content-type")
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            let data = read_body(req).await?;
            let file = state
                .engine
                .vfs
                .upload_file(&bucket, &path, &data, mime.as_deref(), &cancel)
                .await?;
            Ok(envelope::json(
                200,
                &serde_json::to_value(FileView::from(&file)).unwrap_or_default(),
            ))
        }
        (&Method::GET, ["vfs", bucket, path @ ..]) => {
            let path = format!("/{}", path.join("/"));
            if trailing_slash || path == "/" {
                let recursive = query.get("recursive").map(String::as_str) == Some("true");
                let listing = state
                    .engine
                    .vfs
                    .list_directory(bucket, &path, recursive)
                    .await?;
                let type_filter = query.get("type").map(String::as_str);
                let directories: Vec<DirectoryView> = if type_filter == Some("file") {
                    Vec::new()
                } else {
                    listing.directories.iter().map(DirectoryView::from).collect()
                };
                let files: Vec<FileView> = if type_filter == Some("directory") {
                    Vec::new()
                } else {
                    listing.files.iter().map(FileView::from).collect()
                };
                Ok(envelope::json(
                    200,
                    &json!({ "path": path, "directories": directories, "files": files }),
                ))
            } else {
                let (file, data) = state
                    .engine
                    .vfs
                    .download_file(bucket, &path, &cancel)
                    .await?;
                Ok(envelope::bytes(200, &file.mime_type, data))
            }
        }
        (&Method::HEAD, ["vfs", bucket, path @ ..]) => {
            let file = state
                .engine
                .vfs
                .get_file(bucket, &format!("/{}", path.join("/")))
                .await?;
            let mut response = envelope::empty(200);
            let headers = response.headers_mut();
            if let Ok(v) = HeaderValue::from_str(&file.mime_type) {
                headers.insert("Content-Type", v);
            }
            if let Ok(v) = HeaderValue::from_str(&file.size.to_string()) {
                headers.insert("Content-Length", v);
            }
            Ok(response)
        }
        (&Method::DELETE, ["vfs", bucket, path @ ..]) => {
            let path = format!("/{}", path.join("/"));
            let recursive = query.get("recursive").map(String::as_str) == Some("true");

            if trailing_slash {
                state
                    .engine
                    .vfs
                    .delete_directory(bucket, &path, recursive, &cancel)
                    .await?;
            } else {
                // no trailing slash: a file if one exists, a directory otherwise
                match state.engine.vfs.delete_file(bucket, &path, &cancel).await {
                    Ok(()) => {}
                    Err(StorageError::PathNotFound(_)) => {
                        state
                            .engine
                            .vfs
                            .delete_directory(bucket, &path, recursive, &cancel)
                            .await?;
                    }
                    Err(e) => return Err(e),
                }
            }
            Ok(envelope::empty(204))
        }

        // ------------------------------------------------------------
        // Accounts
        // ------------------------------------------------------------
        (&Method::GET, ["accounts"]) => {
            let accounts = state.engine.accounts.list().await?;
            let views: Vec<AccountView> = accounts.iter().map(AccountView::from).collect();
            Ok(envelope::json(200, &json!({ "accounts": views })))
        }
        (&Method::POST, ["accounts"]) => {
            let body: CreateAccountRequest = read_json(req).await?;
            let account = state
                .engine
                .accounts
                .create(NewAccount {
                    display_name: body.display_name,
                    email: body.email,
                    client_id: body.client_id,
                    client_secret: body.client_secret,
                    tenant_id: body.tenant_id,
                    refresh_token: body.refresh_token,
                    access_token: body.access_token,
                    expires_in: body.expires_in,
                    priority: body.priority,
                })
                .await?;
            Ok(envelope::json(
                201,
                &serde_json::to_value(AccountView::from(&account)).unwrap_or_default(),
            ))
        }
        (&Method::GET, ["accounts", id]) => {
            let account = state.engine.accounts.get(&parse_account_id(id)?).await?;
            Ok(envelope::json(
                200,
                &serde_json::to_value(AccountView::from(&account)).unwrap_or_default(),
            ))
        }
        (&Method::PUT, ["accounts", id]) => {
            let id = parse_account_id(id)?;
            let body: UpdateAccountRequest = read_json(req).await?;
            let current = state.engine.accounts.get(&id).await?;

            let status = match body.status.as_deref() {
                Some(raw) => AccountStatus::parse(raw)
                    .map_err(|_| StorageError::InvalidRequest(format!("invalid status: {raw}")))?,
                None => current.status,
            };
            let account = state
                .engine
                .accounts
                .update_profile(
                    &id,
                    body.display_name.as_deref().unwrap_or(&current.display_name),
                    body.priority.unwrap_or(current.priority),
                    status,
                )
                .await?;
            Ok(envelope::json(
                200,
                &serde_json::to_value(AccountView::from(&account)).unwrap_or_default(),
            ))
        }
        (&Method::DELETE, ["accounts", id]) => {
            state.engine.accounts.delete(&parse_account_id(id)?).await?;
            Ok(envelope::empty(204))
        }
        (&Method::POST, ["accounts", id, "refresh"]) => {
            let account = state
                .engine
                .accounts
                .ensure_token_valid(&parse_account_id(id)?, &cancel)
                .await?;
            Ok(envelope::json(
                200,
                &serde_json::to_value(AccountView::from(&account)).unwrap_or_default(),
            ))
        }
        (&Method::POST, ["accounts", id, "sync"]) => {
            let account = state
                .engine
                .accounts
                .sync_space(&parse_account_id(id)?, &cancel)
                .await?;
            Ok(envelope::json(
                200,
                &serde_json::to_value(AccountView::from(&account)).unwrap_or_default(),
            ))
        }

        // ------------------------------------------------------------
        // OAuth consent flow
        // ------------------------------------------------------------
        (&Method::POST, ["oauth", "authorize-url"]) => {
            let body: AuthorizeUrlRequest = read_json(req).await?;
            let creds = OAuthCredentials {
                client_id: body.client_id,
                client_secret: body.client_secret,
                tenant_id: body.tenant_id,
            };
            let url = state
                .auth
                .authorize_url(&creds, &body.redirect_uri, &body.state);
            Ok(envelope::json(200, &json!({ "authorize_url": url })))
        }
        (&Method::POST, ["oauth", "callback"]) => {
            let body: OAuthCallbackRequest = read_json(req).await?;
            let creds = OAuthCredentials {
                client_id: body.client_id.clone(),
                client_secret: body.client_secret.clone(),
                tenant_id: body.tenant_id.clone(),
            };

            let grant = state
                .auth
                .exchange_code(&creds, &body.redirect_uri, &body.code, &cancel)
                .await
                .map_err(|e| StorageError::Upstream(format!("code exchange failed: {e}")))?;

            // probe the drive so the account row starts with owner identity
            let drive = state
                .remote
                .get_drive(&grant.access_token, &cancel)
                .await
                .map_err(|e| StorageError::Upstream(format!("drive probe failed: {e}")))?;

            let display_name = body
                .display_name
                .unwrap_or_else(|| drive.owner_name.clone());
            let email = drive
                .owner_email
                .clone()
                .unwrap_or_else(|| format!("{}@drive", drive.id));

            let account = state
                .engine
                .accounts
                .create_from_grant(display_name, email, creds, grant)
                .await?;

            // quota sync is best-effort; the account works without it
            let account = match state
                .engine
                .accounts
                .sync_space(&account.id, &cancel)
                .await
            {
                Ok(synced) => synced,
                Err(e) => {
                    warn!(account = %account.id, error = %e, "initial quota sync failed");
                    account
                }
            };

            Ok(envelope::json(
                201,
                &serde_json::to_value(AccountView::from(&account)).unwrap_or_default(),
            ))
        }

        _ => Err(StorageError::PathNotFound(uri_path)),
    }
}
