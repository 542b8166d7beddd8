//! Per-call failures for Redmine tool operations.
//!
//! None of these escape a tool call. Each one is folded into an
//! [`Envelope`](super::Envelope) whose `error` field reads
//! `"<kind>: <message>"`, where `<kind>` comes from [`ToolError::kind`].

use std::path::PathBuf;
use std::time::Duration;

use reqwest::{StatusCode, Url};
use thiserror::Error;

/// A failed outbound request or local precondition.
#[derive(Error, Debug)]
pub enum ToolError {
    /// Redmine answered with a 4xx or 5xx status.
    #[error("{} error '{status}' for url '{url}'", status_class(.status))]
    Status {
        /// The status line received.
        status: StatusCode,
        /// The URL that was requested.
        url: Url,
    },

    /// The request did not complete within the configured timeout.
    #[error("request to '{url}' timed out after {}s", .timeout.as_secs())]
    Timeout {
        /// The URL that was requested.
        url: Url,
        /// The timeout that elapsed.
        timeout: Duration,
    },

    /// No connection could be established.
    #[error("failed to connect to '{url}': {source}")]
    Connect {
        /// The URL that was requested.
        url: Url,
        /// The underlying HTTP client error.
        #[source]
        source: reqwest::Error,
    },

    /// Any other transport failure (TLS, protocol, body read).
    #[error("request to '{url}' failed: {source}")]
    Transport {
        /// The URL that was requested.
        url: Url,
        /// The underlying HTTP client error.
        #[source]
        source: reqwest::Error,
    },

    /// The request path could not be resolved against the base URL.
    #[error("cannot build a URL from path '{path}': {reason}")]
    InvalidUrl {
        /// The path as supplied by the caller.
        path: String,
        /// Why resolution failed.
        reason: String,
    },

    /// The HTTP method is not a valid token.
    #[error("unsupported HTTP method '{0}'")]
    InvalidMethod(String),

    /// A local path was relative.
    #[error("Path must be fully qualified, got: {0}")]
    PathNotAbsolute(String),

    /// A local file to upload is missing.
    #[error("File does not exist: {0}")]
    FileNotFound(String),

    /// A download target is an existing directory.
    #[error("Path can't be a directory, got: {0}")]
    IsADirectory(String),

    /// Reading or writing a local file failed.
    #[error("failed to {action} '{}': {source}", .path.display())]
    Io {
        /// What was being attempted ("read", "write").
        action: &'static str,
        /// The file involved.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// Attachment metadata did not carry a filename.
    #[error("attachment {0} metadata has no 'attachment.filename'")]
    InvalidMetadata(u64),
}

impl ToolError {
    /// Short machine-oriented tag for this failure.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Status { .. } => "HTTPStatusError",
            Self::Timeout { .. } => "TimeoutError",
            Self::Connect { .. } => "ConnectError",
            Self::Transport { .. } => "TransportError",
            Self::InvalidUrl { .. } => "InvalidURL",
            Self::InvalidMethod(_) => "InvalidMethod",
            Self::PathNotAbsolute(_) => "PathNotAbsolute",
            Self::FileNotFound(_) => "FileNotFound",
            Self::IsADirectory(_) => "IsADirectory",
            Self::Io { .. } => "IOError",
            Self::InvalidMetadata(_) => "InvalidMetadata",
        }
    }

    /// Classifies a transport error from the HTTP client.
    #[must_use]
    pub fn from_transport(source: reqwest::Error, url: Url, timeout: Duration) -> Self {
        if source.is_timeout() {
            Self::Timeout { url, timeout }
        } else if source.is_connect() {
            Self::Connect { url, source }
        } else {
            Self::Transport { url, source }
        }
    }

    /// Renders the `"<kind>: <message>"` form stored in envelopes.
    #[must_use]
    pub fn tagged(&self) -> String {
        format!("{}: {self}", self.kind())
    }
}

fn status_class(status: &StatusCode) -> &'static str {
    if status.is_server_error() {
        "Server"
    } else if status.is_client_error() {
        "Client"
    } else {
        "Unexpected"
    }
}
