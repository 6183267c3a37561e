//! End-to-end tests over the HTTP surface
//!
//! A real server on an ephemeral port, backed by an in-memory metadata store
//! and the local blob backend (remote mode off, so no upstream traffic).

use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use driveshard_core::ports::{AuthProvider, RemoteStore};
use driveshard_core::Config;
use driveshard_drive::{DriveClient, OAuthFlow};
use driveshard_engine::Engine;
use driveshard_meta::DatabasePool;
use driveshard_server::{server, AppState};

struct TestServer {
    base: String,
    stop: CancellationToken,
    _blob_dir: tempfile::TempDir,
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.stop.cancel();
    }
}

async fn spawn_server(customize: impl FnOnce(&mut Config)) -> TestServer {
    let blob_dir = tempfile::tempdir().unwrap();
    let mut config = Config::default();
    config.upload.remote_enabled = false;
    config.upload.local_root = blob_dir.path().join("blobs");
    customize(&mut config);

    let pool = DatabasePool::in_memory().await.unwrap();
    // never reached with remote mode off
    let remote: Arc<dyn RemoteStore> = Arc::new(DriveClient::with_base_url("http://127.0.0.1:1"));
    let auth: Arc<dyn AuthProvider> = Arc::new(OAuthFlow::new());

    let engine = Engine::new(&config, &pool, Arc::clone(&remote), Arc::clone(&auth));
    let prefix = config.server.prefix.clone();
    let state = AppState::new(engine, pool, config, auth, remote);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let stop = CancellationToken::new();
    let stop_signal = stop.clone();
    tokio::spawn(async move {
        let _ = server::serve(state, listener, async move {
            stop_signal.cancelled().await;
        })
        .await;
    });

    TestServer {
        base: format!("http://{addr}{prefix}"),
        stop,
        _blob_dir: blob_dir,
    }
}

#[tokio::test]
async fn test_health_surface() {
    let server = spawn_server(|_| {}).await;
    let client = reqwest::Client::new();

    let health: serde_json::Value = client
        .get(format!("{}/health", server.base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["status"], "ok");

    let live: serde_json::Value = client
        .get(format!("{}/live", server.base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(live["alive"], true);

    let info: serde_json::Value = client
        .get(format!("{}/info", server.base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(info["name"], "driveshard");
}

#[tokio::test]
async fn test_object_lifecycle_over_http() {
    let server = spawn_server(|_| {}).await;
    let client = reqwest::Client::new();

    // create the bucket
    let response = client
        .put(format!("{}/buckets/my-data", server.base))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 201);

    // duplicate creation conflicts
    let response = client
        .put(format!("{}/buckets/my-data", server.base))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 409);

    // upload a small object
    let response = client
        .put(format!("{}/objects/my-data/hello.txt", server.base))
        .header("Content-Type", "text/plain")
        .body("hi")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let record: serde_json::Value = response.json().await.unwrap();
    assert_eq!(record["etag"], "49f68a5c8493ec2c0bf489821c21fc3b");
    assert_eq!(record["size"], 2);

    // download it back
    let response = client
        .get(format!("{}/objects/my-data/hello.txt", server.base))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(
        response.headers().get("etag").unwrap(),
        "\"49f68a5c8493ec2c0bf489821c21fc3b\""
    );
    assert_eq!(response.text().await.unwrap(), "hi");

    // metadata via HEAD
    let response = client
        .head(format!("{}/objects/my-data/hello.txt", server.base))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(response.headers().get("content-length").unwrap(), "2");

    // delete, then delete again
    let response = client
        .delete(format!("{}/objects/my-data/hello.txt", server.base))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 204);

    let response = client
        .delete(format!("{}/objects/my-data/hello.txt", server.base))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 404);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["error"]["code"], "OBJECT_NOT_FOUND");
}

#[tokio::test]
async fn test_vfs_tree_over_http() {
    let server = spawn_server(|_| {}).await;
    let client = reqwest::Client::new();

    client
        .put(format!("{}/buckets/demo", server.base))
        .send()
        .await
        .unwrap();

    // upload through a deep path
    let response = client
        .put(format!("{}/vfs/demo/a/b/c/file.txt", server.base))
        .body("x")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    // root listing shows `a` as a directory
    let listing: serde_json::Value = client
        .get(format!("{}/vfs/demo/?type=directory", server.base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(listing["directories"][0]["name"], "a");
    assert!(listing["files"].as_array().unwrap().is_empty());

    // leaf listing shows the file
    let listing: serde_json::Value = client
        .get(format!("{}/vfs/demo/a/b/c/", server.base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(listing["files"][0]["name"], "file.txt");

    // recursive listing of /a returns three directories and one file
    let listing: serde_json::Value = client
        .get(format!("{}/vfs/demo/a/?recursive=true", server.base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(listing["directories"].as_array().unwrap().len(), 3);
    assert_eq!(listing["files"].as_array().unwrap().len(), 1);

    // move the subtree
    let response = client
        .post(format!("{}/vfs/demo/_move", server.base))
        .json(&serde_json::json!({ "source": "/a", "destination": "/z" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    let response = client
        .get(format!("{}/vfs/demo/z/b/c/file.txt", server.base))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(response.text().await.unwrap(), "x");

    let response = client
        .get(format!("{}/vfs/demo/a/b/c/file.txt", server.base))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 404);
}

#[tokio::test]
async fn test_recursive_delete_over_http() {
    let server = spawn_server(|_| {}).await;
    let client = reqwest::Client::new();

    client
        .put(format!("{}/buckets/demo", server.base))
        .send()
        .await
        .unwrap();
    for name in ["f1", "f2"] {
        let response = client
            .put(format!("{}/vfs/demo/d/{name}", server.base))
            .body("xy")
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 200);
    }

    // refuses without the recursive flag
    let response = client
        .delete(format!("{}/vfs/demo/d/", server.base))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 409);

    let response = client
        .delete(format!("{}/vfs/demo/d/?recursive=true", server.base))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 204);

    // object rows are gone and the aggregates are back to zero
    let bucket: serde_json::Value = client
        .get(format!("{}/buckets/demo", server.base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(bucket["object_count"], 0);
    assert_eq!(bucket["total_size"], 0);
}

#[tokio::test]
async fn test_mkdir_and_copy_over_http() {
    let server = spawn_server(|_| {}).await;
    let client = reqwest::Client::new();

    client
        .put(format!("{}/buckets/demo", server.base))
        .send()
        .await
        .unwrap();

    let response = client
        .post(format!("{}/vfs/demo/_mkdir", server.base))
        .json(&serde_json::json!({ "path": "/made/by/hand" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 201);

    client
        .put(format!("{}/vfs/demo/made/orig.txt", server.base))
        .body("dup-me")
        .send()
        .await
        .unwrap();

    let response = client
        .post(format!("{}/vfs/demo/_copy", server.base))
        .json(&serde_json::json!({
            "source": "/made/orig.txt",
            "destination": "/made/by/copy.txt"
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    let copied = client
        .get(format!("{}/vfs/demo/made/by/copy.txt", server.base))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert_eq!(copied, "dup-me");
}

#[tokio::test]
async fn test_validation_error_envelope() {
    let server = spawn_server(|_| {}).await;
    let client = reqwest::Client::new();

    let response = client
        .put(format!("{}/buckets/ab", server.base))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["error"]["code"], "INVALID_BUCKET");
    assert!(body["error"]["message"].as_str().unwrap().contains("3-63"));
}

#[tokio::test]
async fn test_rate_limiting() {
    let server = spawn_server(|c| {
        c.rate_limit.capacity = 2;
        c.rate_limit.refill_per_sec = 0.0;
    })
    .await;
    let client = reqwest::Client::new();

    for _ in 0..2 {
        let response = client
            .get(format!("{}/buckets", server.base))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 200);
    }

    let response = client
        .get(format!("{}/buckets", server.base))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 429);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["error"]["code"], "RATE_LIMITED");

    // health probes bypass the limiter
    let response = client
        .get(format!("{}/health", server.base))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
}

#[tokio::test]
async fn test_cors_preflight() {
    let server = spawn_server(|_| {}).await;
    let client = reqwest::Client::new();

    let response = client
        .request(
            reqwest::Method::OPTIONS,
            format!("{}/buckets", server.base),
        )
        .header("Origin", "https://spa.example.com")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 204);
    assert_eq!(
        response
            .headers()
            .get("access-control-allow-origin")
            .unwrap(),
        "*"
    );
    assert!(response
        .headers()
        .get("access-control-allow-methods")
        .unwrap()
        .to_str()
        .unwrap()
        .contains("DELETE"));
}
