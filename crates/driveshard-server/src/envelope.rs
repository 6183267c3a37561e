//! Response envelopes
//!
//! Every error body has the shape
//! `{"error": {"code": "<CODE>", "message": "...", "details": {...}}}`.
//! Success bodies are plain JSON values.

use http_body_util::Full;
use hyper::body::Bytes;
use hyper::{Response, StatusCode};
use serde_json::Value;

use driveshard_core::StorageError;

/// Response body type used throughout the adapter
pub type Body = Full<Bytes>;

fn fallback() -> Response<Body> {
    Response::new(Full::new(Bytes::new()))
}

/// JSON response with an explicit status
pub fn json(status: u16, value: &Value) -> Response<Body> {
    let body = serde_json::to_vec(value).unwrap_or_else(|_| b"{}".to_vec());
    Response::builder()
        .status(StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR))
        .header("Content-Type", "application/json")
        .body(Full::new(Bytes::from(body)))
        .unwrap_or_else(|_| fallback())
}

/// Empty response (204-style)
pub fn empty(status: u16) -> Response<Body> {
    Response::builder()
        .status(StatusCode::from_u16(status).unwrap_or(StatusCode::NO_CONTENT))
        .body(Full::new(Bytes::new()))
        .unwrap_or_else(|_| fallback())
}

/// Raw byte response with a content type
pub fn bytes(status: u16, content_type: &str, payload: Vec<u8>) -> Response<Body> {
    Response::builder()
        .status(StatusCode::from_u16(status).unwrap_or(StatusCode::OK))
        .header("Content-Type", content_type)
        .header("Content-Length", payload.len().to_string())
        .body(Full::new(Bytes::from(payload)))
        .unwrap_or_else(|_| fallback())
}

/// Adapter-level error envelope with an explicit code
pub fn adapter_error(status: u16, code: &str, message: &str) -> Response<Body> {
    json(
        status,
        &serde_json::json!({
            "error": { "code": code, "message": message }
        }),
    )
}

/// Engine error mapped through the taxonomy
pub fn storage_error(err: &StorageError) -> Response<Body> {
    let mut error = serde_json::json!({
        "code": err.code(),
        "message": err.to_string(),
    });
    if let Some(details) = err.details() {
        error["details"] = details;
    }
    json(err.http_status(), &serde_json::json!({ "error": error }))
}
