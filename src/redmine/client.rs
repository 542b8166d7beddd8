//! Forwards tool calls to the Redmine REST API.
//!
//! [`RedmineClient::request`] performs exactly one HTTP exchange and never
//! fails: every outcome, including transport errors, comes back as an
//! [`Envelope`]. There are no retries.

use std::time::Duration;

use reqwest::header::CONTENT_TYPE;
use reqwest::{Method, Url};
use serde_json::Value;
use tracing::{debug, warn};

use super::envelope::{Body, Envelope};
use super::error::ToolError;
use crate::config::Connection;

/// Header carrying the Redmine API key.
pub const API_KEY_HEADER: &str = "X-Redmine-API-Key";

/// Default content type for requests.
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// Content type for attachment transfers.
pub const OCTET_STREAM: &str = "application/octet-stream";

/// Request payload. At most one kind of body is ever sent.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Payload {
    /// No body.
    #[default]
    Empty,
    /// A JSON document.
    Json(Value),
    /// Raw bytes, sent as-is.
    Raw(Vec<u8>),
}

/// A single outbound request.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    /// Path relative to the base URL, e.g. `/issues.json`.
    pub path: String,
    /// HTTP method, case-insensitive.
    pub method: String,
    /// Query parameters, in order.
    pub query: Vec<(String, String)>,
    /// Request body.
    pub payload: Payload,
    /// `Content-Type` header value.
    pub content_type: String,
    /// Whether a successful response body should be parsed as JSON.
    pub decode_json: bool,
}

impl ApiRequest {
    /// Creates a request with no body and the JSON content type.
    #[must_use]
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            method: method.into(),
            query: Vec::new(),
            payload: Payload::Empty,
            content_type: JSON_CONTENT_TYPE.to_string(),
            decode_json: true,
        }
    }

    /// Creates a GET request.
    #[must_use]
    pub fn get(path: impl Into<String>) -> Self {
        Self::new("get", path)
    }

    /// Creates a POST request.
    #[must_use]
    pub fn post(path: impl Into<String>) -> Self {
        Self::new("post", path)
    }

    /// Appends a query parameter.
    #[must_use]
    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// Sets a JSON body, replacing any previous body.
    #[must_use]
    pub fn with_json(mut self, body: Value) -> Self {
        self.payload = Payload::Json(body);
        self
    }

    /// Sets a raw body and its content type, replacing any previous body.
    #[must_use]
    pub fn with_raw(mut self, body: Vec<u8>, content_type: impl Into<String>) -> Self {
        self.payload = Payload::Raw(body);
        self.content_type = content_type.into();
        self
    }

    /// Overrides the `Content-Type` header.
    #[must_use]
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = content_type.into();
        self
    }

    /// Keeps a successful response body as raw bytes, even if it is JSON.
    #[must_use]
    pub const fn raw_response(mut self) -> Self {
        self.decode_json = false;
        self
    }
}

/// HTTP client bound to one Redmine instance.
#[derive(Debug, Clone)]
pub struct RedmineClient {
    http: reqwest::Client,
    base_url: Url,
    api_key: String,
    timeout: Duration,
}

impl RedmineClient {
    /// Creates a client from resolved connection settings.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be initialised (for
    /// example, no TLS backend is available).
    pub fn new(connection: &Connection) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .timeout(connection.timeout)
            // Redirects come back as-is; the API key must never follow a Location header.
            .redirect(reqwest::redirect::Policy::none())
            .user_agent(concat!("redmine-mcp/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            base_url: connection.base_url.clone(),
            api_key: connection.api_key.clone(),
            timeout: connection.timeout,
        })
    }

    /// The base URL request paths are resolved against.
    #[must_use]
    pub const fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Resolves a request path against the base URL.
    ///
    /// Leading `/` are stripped first, so `/issues.json` and `issues.json`
    /// both land under the base URL's directory. Standard reference
    /// resolution applies after that: a base without a trailing `/` loses
    /// its last segment, and a path with its own scheme replaces the base.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::InvalidUrl`] if the result is not a valid URL.
    pub fn url_for(&self, path: &str) -> Result<Url, ToolError> {
        self.base_url
            .join(path.trim_start_matches('/'))
            .map_err(|e| ToolError::InvalidUrl {
                path: path.to_string(),
                reason: e.to_string(),
            })
    }

    /// Performs one HTTP exchange and normalises the outcome.
    pub async fn request(&self, request: ApiRequest) -> Envelope {
        match self.try_request(request).await {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(error = %e, "Redmine request failed before a response was received");
                Envelope::from_error(&e)
            }
        }
    }

    async fn try_request(&self, request: ApiRequest) -> Result<Envelope, ToolError> {
        let url = self.url_for(&request.path)?;
        let method = parse_method(&request.method)?;

        debug!(method = %method, url = %url, "Sending Redmine request");

        let mut builder = self
            .http
            .request(method.clone(), url.clone())
            .header(API_KEY_HEADER, &self.api_key)
            .header(CONTENT_TYPE, &request.content_type);

        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }

        builder = match request.payload {
            Payload::Empty => builder,
            Payload::Json(body) => builder.json(&body),
            Payload::Raw(bytes) => builder.body(bytes),
        };

        let response = builder
            .send()
            .await
            .map_err(|e| ToolError::from_transport(e, url.clone(), self.timeout))?;

        let status = response.status();
        let content = response
            .bytes()
            .await
            .map_err(|e| ToolError::from_transport(e, url.clone(), self.timeout))?;

        debug!(
            method = %method,
            url = %url,
            status = status.as_u16(),
            bytes = content.len(),
            "Redmine response received"
        );

        if status.is_client_error() || status.is_server_error() {
            let error = ToolError::Status { status, url };
            return Ok(Envelope::failure(
                status.as_u16(),
                Body::from_failure(&content),
                &error,
            ));
        }

        Ok(Envelope::success(
            status.as_u16(),
            Body::from_success(&content, request.decode_json),
        ))
    }
}

fn parse_method(raw: &str) -> Result<Method, ToolError> {
    let upper = raw.trim().to_ascii_uppercase();
    if upper.is_empty() {
        return Err(ToolError::InvalidMethod(raw.to_string()));
    }
    Method::from_bytes(upper.as_bytes()).map_err(|_| ToolError::InvalidMethod(raw.to_string()))
}
