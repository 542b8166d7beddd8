//! The uniform result of every Redmine-backed tool call.
//!
//! An [`Envelope`] always has three fields, serialised in this order:
//!
//! - `status_code`: the HTTP status, or `0` when no exchange took place
//! - `body`: parsed JSON, raw content, or `null`
//! - `error`: empty on success, otherwise `"<kind>: <message>"`
//!
//! Tool results are rendered as YAML with [`encode`]: keys keep their
//! insertion order, long lines are never folded and non-ASCII text is
//! emitted verbatim.

use std::path::Path;

use base64::{engine::general_purpose::STANDARD as BASE64_STANDARD, Engine as _};
use serde::{Serialize, Serializer};
use serde_json::{json, Value};

use super::error::ToolError;

/// Response content carried by an envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Body {
    /// A JSON document.
    Json(Value),
    /// Text from a failed response that was not JSON.
    Text(String),
    /// Content of a successful response that was not JSON (or was not
    /// meant to be decoded).
    Bytes(Vec<u8>),
}

impl Body {
    /// Interprets the content of a successful response.
    ///
    /// Empty content yields `None`. With `decode_json` set, JSON is parsed
    /// and anything else is kept as raw bytes.
    #[must_use]
    pub fn from_success(content: &[u8], decode_json: bool) -> Option<Self> {
        if content.is_empty() {
            return None;
        }
        if decode_json {
            if let Ok(value) = serde_json::from_slice(content) {
                return Some(Self::Json(value));
            }
        }
        Some(Self::Bytes(content.to_vec()))
    }

    /// Interprets the content of a failed (4xx/5xx) response.
    ///
    /// JSON is parsed, anything else is kept as (lossily decoded) text.
    #[must_use]
    pub fn from_failure(content: &[u8]) -> Option<Self> {
        if content.is_empty() {
            return None;
        }
        serde_json::from_slice(content).map_or_else(
            |_| Some(Self::Text(String::from_utf8_lossy(content).into_owned())),
            |value| Some(Self::Json(value)),
        )
    }

    /// Returns the parsed JSON, if this body is JSON.
    #[must_use]
    pub const fn as_json(&self) -> Option<&Value> {
        match self {
            Self::Json(value) => Some(value),
            _ => None,
        }
    }

    /// Returns the raw content, if this body was not decoded as JSON.
    #[must_use]
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Json(_) => None,
            Self::Text(text) => Some(text.as_bytes()),
            Self::Bytes(bytes) => Some(bytes),
        }
    }
}

impl Serialize for Body {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Json(value) => value.serialize(serializer),
            Self::Text(text) => serializer.serialize_str(text),
            Self::Bytes(bytes) => match std::str::from_utf8(bytes) {
                Ok(text) => serializer.serialize_str(text),
                Err(_) => serializer.serialize_str(&BASE64_STANDARD.encode(bytes)),
            },
        }
    }
}

/// The `{status_code, body, error}` result of a tool call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Envelope {
    /// HTTP status, `0` when no HTTP exchange occurred.
    pub status_code: u16,
    /// Response content, `None` when there was none.
    pub body: Option<Body>,
    /// Empty on success, otherwise `"<kind>: <message>"`.
    pub error: String,
}

impl Envelope {
    /// A successful exchange.
    #[must_use]
    pub const fn success(status_code: u16, body: Option<Body>) -> Self {
        Self {
            status_code,
            body,
            error: String::new(),
        }
    }

    /// A failed exchange that still produced a response.
    #[must_use]
    pub fn failure(status_code: u16, body: Option<Body>, error: &ToolError) -> Self {
        Self {
            status_code,
            body,
            error: error.tagged(),
        }
    }

    /// A failure before any status line was read.
    #[must_use]
    pub fn from_error(error: &ToolError) -> Self {
        Self::failure(0, None, error)
    }

    /// The result of a completed attachment download.
    #[must_use]
    pub fn saved(path: &Path, filename: &str) -> Self {
        Self::success(
            200,
            Some(Body::Json(json!({
                "saved_to": path.display().to_string(),
                "filename": filename,
            }))),
        )
    }

    /// Returns `true` when no error was recorded.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.error.is_empty()
    }

    /// Returns the body as JSON, if it is JSON.
    #[must_use]
    pub fn json(&self) -> Option<&Value> {
        self.body.as_ref().and_then(Body::as_json)
    }
}

/// Renders a tool result as YAML text.
///
/// # Errors
///
/// Returns an error if the value cannot be represented in YAML.
pub fn encode<T: Serialize + ?Sized>(value: &T) -> Result<String, serde_yaml::Error> {
    serde_yaml::to_string(value)
}
