//! Redmine REST API access.
//!
//! - [`client`]: the HTTP forwarder every tool goes through
//! - [`envelope`]: the `{status_code, body, error}` result and its YAML form
//! - [`attachments`]: upload and two-phase download built on the forwarder
//! - [`error`]: per-call failure taxonomy

pub mod attachments;
pub mod client;
pub mod envelope;
pub mod error;

pub use attachments::resolve_local_path;
pub use client::{ApiRequest, Payload, RedmineClient, API_KEY_HEADER, OCTET_STREAM};
pub use envelope::{encode, Body, Envelope};
pub use error::ToolError;
