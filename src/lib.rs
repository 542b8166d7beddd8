//! redmine-mcp: MCP server for the Redmine REST API
//!
//! Exposes a Redmine instance to AI assistants as a handful of generic tools
//! instead of one tool per endpoint:
//!
//! - **Request forwarding**: any method and path, with the API key attached
//! - **API discovery**: path templates and operation definitions from the
//!   Redmine OpenAPI document
//! - **Attachments**: upload local files, download attachments to disk
//!
//! Every Redmine-backed tool answers with the same `{status_code, body,
//! error}` envelope, rendered as YAML.
//!
//! # Modules
//!
//! - [`config`] — Configuration loading and validation
//! - [`error`] — Startup error types
//! - [`redmine`] — HTTP forwarding, envelopes and attachments
//! - [`openapi`] — OpenAPI document lookups
//! - [`health`] — Liveness endpoint
//! - [`mcp`] — MCP protocol implementation

pub mod config;
pub mod error;
pub mod health;
pub mod mcp;
pub mod openapi;
pub mod redmine;
