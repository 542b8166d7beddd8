//! A mock Redmine instance for integration tests.
//!
//! Serves a handful of fixed endpoints on `127.0.0.1:0` and counts how often
//! attachment metadata is requested.

#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::{Path, Query, RawQuery, State};
use axum::http::header::{CONTENT_TYPE, LOCATION};
use axum::http::{HeaderMap, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{any, get, post};
use axum::{Json, Router};
use reqwest::Url;
use serde_json::{json, Value};

use redmine_mcp::config::Connection;
use redmine_mcp::redmine::RedmineClient;

pub const API_KEY: &str = "test_api_key_12345";

/// Attachment served by the mock: id, filename and content.
pub const ATTACHMENT_ID: u64 = 7;
pub const ATTACHMENT_NAME: &str = "report.txt";
pub const ATTACHMENT_CONTENT: &[u8] = b"quarterly numbers\n";

/// Attachment whose metadata lacks a filename.
pub const NAMELESS_ATTACHMENT_ID: u64 = 8;

/// Attachment whose content is empty.
pub const EMPTY_ATTACHMENT_ID: u64 = 9;

/// Attachment whose content happens to be JSON.
pub const JSON_ATTACHMENT_ID: u64 = 10;
pub const JSON_ATTACHMENT_CONTENT: &str = "{\"zeta\": 1,\n  \"alpha\": 2}\n";

#[derive(Clone, Default)]
pub struct Calls {
    metadata: Arc<AtomicUsize>,
    echo: Arc<AtomicUsize>,
}

impl Calls {
    pub fn metadata(&self) -> usize {
        self.metadata.load(Ordering::SeqCst)
    }

    pub fn echo(&self) -> usize {
        self.echo.load(Ordering::SeqCst)
    }
}

pub struct MockRedmine {
    pub addr: SocketAddr,
    pub calls: Calls,
}

impl MockRedmine {
    /// Starts the mock on an ephemeral port.
    pub async fn start() -> Self {
        let calls = Calls::default();
        let router = Router::new()
            .route("/echo.json", any(echo))
            .route("/moved.json", get(moved))
            .route("/plain", get(plain))
            .route("/empty", get(empty))
            .route("/missing.json", get(missing))
            .route("/broken", get(broken))
            .route("/slow.json", get(slow))
            .route("/uploads.json", post(upload))
            .route("/attachments/{file}", get(attachment_metadata))
            .route(
                "/attachments/download/{id}/{filename}",
                get(attachment_content),
            )
            .with_state(calls.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });

        Self { addr, calls }
    }

    pub fn base_url(&self) -> Url {
        Url::parse(&format!("http://{}/", self.addr)).unwrap()
    }

    pub fn client(&self) -> RedmineClient {
        self.client_with_timeout(Duration::from_secs(5))
    }

    pub fn client_with_timeout(&self, timeout: Duration) -> RedmineClient {
        client_for(self.base_url(), timeout)
    }
}

pub fn client_for(base_url: Url, timeout: Duration) -> RedmineClient {
    RedmineClient::new(&Connection {
        base_url,
        api_key: API_KEY.to_string(),
        timeout,
        request_instructions: String::new(),
    })
    .unwrap()
}

fn header(headers: &HeaderMap, name: &str) -> Value {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map_or(Value::Null, |v| Value::String(v.to_string()))
}

async fn echo(
    State(calls): State<Calls>,
    method: Method,
    headers: HeaderMap,
    RawQuery(query): RawQuery,
    body: Bytes,
) -> Json<Value> {
    calls.echo.fetch_add(1, Ordering::SeqCst);
    Json(json!({
        "method": method.as_str(),
        "api_key": header(&headers, "x-redmine-api-key"),
        "content_type": header(&headers, "content-type"),
        "query": query,
        "body": serde_json::from_slice::<Value>(&body).ok(),
    }))
}

/// Redirects to the URL given in `to`.
async fn moved(Query(query): Query<HashMap<String, String>>) -> Response {
    let target = query.get("to").cloned().unwrap_or_default();
    (StatusCode::FOUND, [(LOCATION, target)]).into_response()
}

async fn plain() -> &'static str {
    "plain text, not JSON"
}

async fn empty() -> StatusCode {
    StatusCode::NO_CONTENT
}

async fn missing() -> (StatusCode, Json<Value>) {
    (
        StatusCode::NOT_FOUND,
        Json(json!({"errors": ["The requested resource was not found"]})),
    )
}

async fn broken() -> (StatusCode, &'static str) {
    (StatusCode::BAD_GATEWAY, "upstream exploded")
}

async fn slow() -> Json<Value> {
    tokio::time::sleep(Duration::from_secs(3)).await;
    Json(json!({"late": true}))
}

async fn upload(
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
    body: Bytes,
) -> Response {
    if headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok()) != Some("application/octet-stream") {
        return StatusCode::UNSUPPORTED_MEDIA_TYPE.into_response();
    }

    (
        StatusCode::CREATED,
        Json(json!({
            "upload": {
                "token": "7167.ed1ccdb093229ca1bd0b043618d88743",
                "filename": query.get("filename"),
                "description": query.get("description"),
                "size": body.len(),
                "content": String::from_utf8_lossy(&body),
            }
        })),
    )
        .into_response()
}

async fn attachment_metadata(State(calls): State<Calls>, Path(file): Path<String>) -> Response {
    calls.metadata.fetch_add(1, Ordering::SeqCst);

    let id = file
        .strip_suffix(".json")
        .and_then(|id| id.parse::<u64>().ok());

    let attachment = match id {
        Some(ATTACHMENT_ID) => json!({"id": ATTACHMENT_ID, "filename": ATTACHMENT_NAME}),
        Some(NAMELESS_ATTACHMENT_ID) => json!({"id": NAMELESS_ATTACHMENT_ID}),
        Some(EMPTY_ATTACHMENT_ID) => json!({"id": EMPTY_ATTACHMENT_ID, "filename": "empty.bin"}),
        Some(JSON_ATTACHMENT_ID) => json!({"id": JSON_ATTACHMENT_ID, "filename": "data.json"}),
        _ => return (StatusCode::NOT_FOUND, Json(json!({"errors": ["Not found"]}))).into_response(),
    };

    Json(json!({"attachment": attachment})).into_response()
}

async fn attachment_content(Path((id, filename)): Path<(u64, String)>) -> Response {
    match (id, filename.as_str()) {
        (ATTACHMENT_ID, ATTACHMENT_NAME) => ATTACHMENT_CONTENT.to_vec().into_response(),
        (EMPTY_ATTACHMENT_ID, _) => Vec::<u8>::new().into_response(),
        (JSON_ATTACHMENT_ID, "data.json") => (
            [(CONTENT_TYPE, "application/json")],
            JSON_ATTACHMENT_CONTENT,
        )
            .into_response(),
        _ => StatusCode::NOT_FOUND.into_response(),
    }
}
