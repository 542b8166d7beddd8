//! JSON-RPC 2.0 framing for the MCP stdio protocol.
//!
//! Incoming lines are parsed into a [`Message`] (request or notification).
//! Everything the server writes back is a [`Response`], which carries either
//! a `result` or an `error` member.
//!
//! # MCP-Specific Constraints
//!
//! - Request IDs must be strings or integers (never `null`)
//! - Messages are single-line JSON

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Protocol version offered when the client asks for one we don't know.
pub const MCP_PROTOCOL_VERSION: &str = "2025-03-26";

/// Protocol versions this server can speak, newest first.
pub const SUPPORTED_PROTOCOL_VERSIONS: &[&str] = &["2025-03-26", "2024-11-05"];

/// Server name for capability negotiation.
pub const SERVER_NAME: &str = "mcp-redmine";

/// Picks the protocol version to answer `initialize` with.
///
/// The client's version is echoed when supported, otherwise the newest
/// supported version is offered and the client decides whether to proceed.
#[must_use]
pub fn negotiate_version(requested: &str) -> &'static str {
    SUPPORTED_PROTOCOL_VERSIONS
        .iter()
        .find(|v| **v == requested)
        .copied()
        .unwrap_or(MCP_PROTOCOL_VERSION)
}

/// A JSON-RPC 2.0 request ID.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    /// Numeric request ID.
    Number(i64),
    /// String request ID.
    String(String),
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::String(s) => write!(f, "{s}"),
        }
    }
}

/// A request: expects exactly one [`Response`].
#[derive(Debug, Clone, Deserialize)]
pub struct Request {
    /// Request identifier, echoed in the response.
    pub id: RequestId,
    /// Method name.
    pub method: String,
    /// Parameters, `Null` when absent.
    #[serde(default)]
    pub params: Value,
}

impl Request {
    /// Deserialises `params` into `T`.
    ///
    /// # Errors
    ///
    /// Returns an invalid-params response when `params` is missing or has
    /// the wrong shape.
    pub fn parse_params<T: serde::de::DeserializeOwned>(&self) -> Result<T, Response> {
        if self.params.is_null() {
            return Err(Response::invalid_params(
                self.id.clone(),
                format!("Missing {} params", self.method),
            ));
        }
        serde_json::from_value(self.params.clone()).map_err(|e| {
            Response::invalid_params(self.id.clone(), format!("Invalid {} params: {e}", self.method))
        })
    }
}

/// A notification: no ID, no response.
#[derive(Debug, Clone, Deserialize)]
pub struct Notification {
    /// Method name.
    pub method: String,
    /// Parameters, `Null` when absent.
    #[serde(default)]
    pub params: Value,
}

/// One parsed line of input.
#[derive(Debug, Clone)]
pub enum Message {
    /// A request expecting a response.
    Request(Request),
    /// A notification (no response expected).
    Notification(Notification),
}

impl Message {
    /// Parses one JSON-RPC message.
    ///
    /// # Errors
    ///
    /// Returns the error response to send back: a parse error for invalid
    /// JSON, an invalid-request error for anything that is not a JSON-RPC
    /// 2.0 request or notification.
    pub fn parse(line: &str) -> Result<Self, Response> {
        let value: Value = serde_json::from_str(line).map_err(|_| Response::parse_error())?;

        let Some(object) = value.as_object() else {
            return Err(Response::invalid_request(None));
        };

        let id = object
            .get("id")
            .and_then(|id| serde_json::from_value::<RequestId>(id.clone()).ok());

        if object.get("jsonrpc").and_then(Value::as_str) != Some("2.0") {
            return Err(Response::invalid_request(id));
        }

        match (object.contains_key("id"), id) {
            (false, _) => serde_json::from_value(value)
                .map(Self::Notification)
                .map_err(|_| Response::invalid_request(None)),
            // An `id` that is present but null or of the wrong type.
            (true, None) => Err(Response::invalid_request(None)),
            (true, Some(id)) => {
                let request: Request = serde_json::from_value(value)
                    .map_err(|_| Response::invalid_request(Some(id.clone())))?;
                if request.method.is_empty() {
                    return Err(Response::invalid_request(Some(id)));
                }
                Ok(Self::Request(request))
            }
        }
    }

    /// The method name.
    #[must_use]
    pub fn method(&self) -> &str {
        match self {
            Self::Request(req) => &req.method,
            Self::Notification(notif) => &notif.method,
        }
    }
}

/// Standard JSON-RPC 2.0 error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// Invalid JSON was received by the server.
    ParseError,
    /// The JSON sent is not a valid Request object.
    InvalidRequest,
    /// The method does not exist or is not available.
    MethodNotFound,
    /// Invalid method parameters.
    InvalidParams,
    /// Internal JSON-RPC error.
    InternalError,
}

impl ErrorCode {
    /// Returns the numeric code for this error.
    #[must_use]
    pub const fn code(self) -> i32 {
        match self {
            Self::ParseError => -32700,
            Self::InvalidRequest => -32600,
            Self::MethodNotFound => -32601,
            Self::InvalidParams => -32602,
            Self::InternalError => -32603,
        }
    }
}

/// The `error` member of a failed response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorObject {
    /// Numeric error code.
    pub code: i32,
    /// Short description.
    pub message: String,
}

/// Either side of a response.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    /// Successful result.
    Result(Value),
    /// Failure.
    Error(ErrorObject),
}

/// A JSON-RPC 2.0 response, success or error.
#[derive(Debug, Clone, Serialize)]
pub struct Response {
    /// Always "2.0".
    pub jsonrpc: &'static str,
    /// The request this answers; `null` when it could not be determined.
    pub id: Option<RequestId>,
    /// The result or error.
    #[serde(flatten)]
    pub outcome: Outcome,
}

impl Response {
    /// A success response.
    #[must_use]
    pub const fn result(id: RequestId, result: Value) -> Self {
        Self {
            jsonrpc: "2.0",
            id: Some(id),
            outcome: Outcome::Result(result),
        }
    }

    /// An error response.
    #[must_use]
    pub fn error(id: Option<RequestId>, code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            outcome: Outcome::Error(ErrorObject {
                code: code.code(),
                message: message.into(),
            }),
        }
    }

    /// Invalid JSON; the ID cannot be known.
    #[must_use]
    pub fn parse_error() -> Self {
        Self::error(None, ErrorCode::ParseError, "Parse error")
    }

    /// Not a valid JSON-RPC request.
    #[must_use]
    pub fn invalid_request(id: Option<RequestId>) -> Self {
        Self::error(id, ErrorCode::InvalidRequest, "Invalid Request")
    }

    /// Unknown method.
    #[must_use]
    pub fn method_not_found(id: RequestId, method: &str) -> Self {
        Self::error(
            Some(id),
            ErrorCode::MethodNotFound,
            format!("Method not found: {method}"),
        )
    }

    /// Bad parameters.
    #[must_use]
    pub fn invalid_params(id: RequestId, message: impl Into<String>) -> Self {
        Self::error(Some(id), ErrorCode::InvalidParams, message)
    }

    /// Server-side failure.
    #[must_use]
    pub fn internal_error(id: RequestId, message: impl Into<String>) -> Self {
        Self::error(Some(id), ErrorCode::InternalError, message)
    }

    /// The error code, if this is an error response.
    #[must_use]
    pub const fn error_code(&self) -> Option<i32> {
        match &self.outcome {
            Outcome::Error(error) => Some(error.code),
            Outcome::Result(_) => None,
        }
    }

    /// The result value, if this is a success response.
    #[must_use]
    pub const fn result_value(&self) -> Option<&Value> {
        match &self.outcome {
            Outcome::Result(value) => Some(value),
            Outcome::Error(_) => None,
        }
    }
}
