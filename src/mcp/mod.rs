//! Model Context Protocol (MCP) server implementation.
//!
//! This module exposes the Redmine REST API as MCP tools. The server
//! communicates over stdio transport using JSON-RPC 2.0 messages.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────┐    ┌─────────────┐    ┌──────────────────┐
//! │ Transport  │───▶│   Server    │───▶│  RedmineClient   │──▶ Redmine
//! │  (stdio)   │    │ (lifecycle) │    │  PathCatalog     │
//! └────────────┘    └─────────────┘    └──────────────────┘
//! ```
//!
//! # Protocol Version
//!
//! Protocol versions 2025-03-26 and 2024-11-05 are accepted.

pub mod protocol;
pub mod server;
pub mod transport;

pub use protocol::{Message, Response, MCP_PROTOCOL_VERSION};
pub use server::{McpServer, ToolCallResult};
pub use transport::{LineTransport, StdioTransport};
