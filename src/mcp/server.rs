//! MCP server implementation for the Redmine REST API.
//!
//! This module implements the MCP server lifecycle:
//!
//! 1. **Initialisation**: Capability negotiation and version agreement
//! 2. **Operation**: Handling tool calls and other requests
//! 3. **Shutdown**: EOF on stdin, SIGINT or SIGTERM
//!
//! # Tools
//!
//! | Tool | Backing operation |
//! |------|-------------------|
//! | `redmine_request` | [`RedmineClient::request`] |
//! | `redmine_paths_list` | [`PathCatalog::list_paths`] |
//! | `redmine_paths_info` | [`PathCatalog::path_info`] |
//! | `redmine_upload` | [`RedmineClient::upload`] |
//! | `redmine_download` | [`RedmineClient::download`] |
//!
//! Every tool answers with a YAML document. Redmine-backed tools always
//! answer with an envelope, even when the request failed.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::io::{AsyncBufRead, AsyncWrite};
use tracing::{debug, error, info, warn};

use crate::mcp::protocol::{
    negotiate_version, ErrorCode, Message, Notification, Request, RequestId, Response,
    SERVER_NAME,
};
use crate::mcp::transport::{LineTransport, StdioTransport};
use crate::openapi::PathCatalog;
use crate::redmine::{encode, ApiRequest, RedmineClient};

/// Server state in the MCP lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    /// Waiting for initialize request.
    AwaitingInit,
    /// Initialize received, waiting for initialized notification.
    Initialising,
    /// Ready for normal operation.
    Running,
    /// Shutdown in progress.
    ShuttingDown,
}

/// Server information for initialisation response.
#[derive(Debug, Clone, Serialize)]
pub struct ServerInfo {
    /// Server name.
    pub name: String,
    /// Server version.
    pub version: String,
}

impl Default for ServerInfo {
    fn default() -> Self {
        Self {
            name: SERVER_NAME.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Client information received during initialisation.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientInfo {
    /// Client name.
    pub name: String,
    /// Client version.
    #[serde(default)]
    pub version: Option<String>,
}

/// Parameters for the initialize request.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeParams {
    /// Protocol version requested by client.
    pub protocol_version: String,
    /// Client capabilities.
    #[serde(default)]
    pub capabilities: Value,
    /// Client information.
    #[serde(default)]
    pub client_info: Option<ClientInfo>,
}

/// A tool definition for tools/list response.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDefinition {
    /// Unique tool name.
    pub name: String,
    /// Human-readable description.
    pub description: String,
    /// JSON Schema for the tool's input parameters.
    pub input_schema: Value,
}

/// Parameters for tools/call request.
#[derive(Debug, Clone, Deserialize)]
pub struct ToolCallParams {
    /// Name of the tool to call.
    pub name: String,
    /// Arguments for the tool.
    #[serde(default)]
    pub arguments: Value,
}

/// Content item in a tool call response.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ToolContent {
    /// Text content.
    Text {
        /// The text content.
        text: String,
    },
}

/// Result of a tool call.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCallResult {
    /// Content returned by the tool.
    pub content: Vec<ToolContent>,
    /// Whether the tool call resulted in an error.
    #[serde(skip_serializing_if = "is_false")]
    pub is_error: bool,
}

#[allow(clippy::trivially_copy_pass_by_ref)] // serde's skip_serializing_if requires fn(&T) -> bool
const fn is_false(b: &bool) -> bool {
    !*b
}

impl ToolCallResult {
    /// Creates a successful text result.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![ToolContent::Text { text: text.into() }],
            is_error: false,
        }
    }

    /// Creates an error text result.
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            content: vec![ToolContent::Text {
                text: message.into(),
            }],
            is_error: true,
        }
    }

    /// Encodes `value` as YAML into a successful text result.
    fn yaml<T: Serialize + ?Sized>(value: &T) -> Self {
        match encode(value) {
            Ok(text) => Self::text(text),
            Err(e) => {
                error!(error = %e, "Failed to encode tool result");
                Self::error("Internal error: failed to encode result")
            }
        }
    }

    /// The text of the first content item.
    #[must_use]
    pub fn first_text(&self) -> Option<&str> {
        self.content.first().map(|ToolContent::Text { text }| text.as_str())
    }
}

/// The MCP server for Redmine.
pub struct McpServer {
    /// Current server state.
    state: ServerState,
    /// Negotiated protocol version (set after initialisation).
    protocol_version: Option<String>,
    /// Forwarder for Redmine-backed tools.
    client: RedmineClient,
    /// OpenAPI lookups.
    catalog: PathCatalog,
    /// Extra text appended to the `redmine_request` description.
    request_instructions: String,
}

impl McpServer {
    /// Creates a new MCP server.
    #[must_use]
    pub fn new(client: RedmineClient, catalog: PathCatalog, request_instructions: String) -> Self {
        Self {
            state: ServerState::AwaitingInit,
            protocol_version: None,
            client,
            catalog,
            request_instructions,
        }
    }

    /// Returns the current server state.
    #[must_use]
    pub const fn state(&self) -> ServerState {
        self.state
    }

    /// Returns the negotiated protocol version, once initialised.
    #[must_use]
    pub fn protocol_version(&self) -> Option<&str> {
        self.protocol_version.as_deref()
    }

    /// Runs the server over stdio until EOF or a shutdown signal.
    ///
    /// # Errors
    ///
    /// Returns an error if transport I/O fails.
    pub async fn run(&mut self) -> std::io::Result<()> {
        let mut transport = StdioTransport::stdio();
        self.run_with_shutdown(&mut transport).await
    }

    /// Runs the main loop and handles shutdown.
    #[cfg(unix)]
    async fn run_with_shutdown(&mut self, transport: &mut StdioTransport) -> std::io::Result<()> {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigint = signal(SignalKind::interrupt())?;
        let mut sigterm = signal(SignalKind::terminate())?;

        loop {
            tokio::select! {
                _ = sigint.recv() => {
                    info!("Received SIGINT, initiating graceful shutdown");
                    self.state = ServerState::ShuttingDown;
                    return Ok(());
                }

                _ = sigterm.recv() => {
                    info!("Received SIGTERM, initiating graceful shutdown");
                    self.state = ServerState::ShuttingDown;
                    return Ok(());
                }

                line = transport.read_line() => {
                    if self.process(transport, line?).await? {
                        return Ok(());
                    }
                }
            }
        }
    }

    /// Runs the main loop and handles shutdown.
    #[cfg(windows)]
    async fn run_with_shutdown(&mut self, transport: &mut StdioTransport) -> std::io::Result<()> {
        let ctrl_c = tokio::signal::ctrl_c();
        tokio::pin!(ctrl_c);

        loop {
            tokio::select! {
                _ = &mut ctrl_c => {
                    info!("Received Ctrl+C, initiating graceful shutdown");
                    self.state = ServerState::ShuttingDown;
                    return Ok(());
                }

                line = transport.read_line() => {
                    if self.process(transport, line?).await? {
                        return Ok(());
                    }
                }
            }
        }
    }

    /// Runs the main loop over any transport until its input closes.
    ///
    /// # Errors
    ///
    /// Returns an error if transport I/O fails.
    pub async fn serve<R, W>(&mut self, transport: &mut LineTransport<R, W>) -> std::io::Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        loop {
            let line = transport.read_line().await?;
            if self.process(transport, line).await? {
                return Ok(());
            }
        }
    }

    /// Handles one read from the transport.
    ///
    /// Returns `true` if the server should shut down.
    async fn process<R, W>(
        &mut self,
        transport: &mut LineTransport<R, W>,
        line: Option<String>,
    ) -> std::io::Result<bool>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let Some(line) = line else {
            info!("Input closed, shutting down");
            self.state = ServerState::ShuttingDown;
            return Ok(true);
        };

        if line.trim().is_empty() {
            return Ok(false);
        }

        if let Some(response) = self.handle_line(&line).await {
            transport.write(&response).await?;
        }

        Ok(self.state == ServerState::ShuttingDown)
    }

    /// Handles one line of input, returning the response to send (if any).
    pub async fn handle_line(&mut self, line: &str) -> Option<Response> {
        match Message::parse(line) {
            Ok(Message::Request(req)) => Some(self.handle_request(req).await),
            Ok(Message::Notification(notif)) => {
                self.handle_notification(&notif);
                None
            }
            Err(response) => {
                warn!("Received malformed JSON-RPC message");
                Some(response)
            }
        }
    }

    /// Handles an incoming request.
    async fn handle_request(&mut self, req: Request) -> Response {
        debug!(id = %req.id, method = %req.method, "Handling request");

        let response = match req.method.as_str() {
            "initialize" => self.handle_initialize(&req),
            "tools/list" => self.handle_tools_list(&req),
            "tools/call" => self.handle_tools_call(&req).await,
            "ping" => Ok(Response::result(req.id.clone(), json!({}))),
            _ => Err(Response::method_not_found(req.id.clone(), &req.method)),
        };

        response.unwrap_or_else(|error| error)
    }

    /// Handles an incoming notification.
    fn handle_notification(&mut self, notif: &Notification) {
        if notif.method == "notifications/initialized" && self.state == ServerState::Initialising {
            info!("Client initialised, server running");
            self.state = ServerState::Running;
        } else {
            debug!(method = %notif.method, "Ignoring notification");
        }
    }

    /// Handles the initialize request.
    fn handle_initialize(&mut self, req: &Request) -> Result<Response, Response> {
        if self.state != ServerState::AwaitingInit {
            return Err(Response::error(
                Some(req.id.clone()),
                ErrorCode::InvalidRequest,
                "Server already initialised",
            ));
        }

        let params: InitializeParams = req.parse_params()?;
        let version = negotiate_version(&params.protocol_version);

        if let Some(client) = &params.client_info {
            info!(
                client = %client.name,
                client_version = client.version.as_deref().unwrap_or("unknown"),
                requested = %params.protocol_version,
                negotiated = version,
                "Client connected"
            );
        }

        self.protocol_version = Some(version.to_string());
        self.state = ServerState::Initialising;

        Ok(Response::result(
            req.id.clone(),
            json!({
                "protocolVersion": version,
                "capabilities": { "tools": {} },
                "serverInfo": ServerInfo::default(),
                "instructions": "Tools for the Redmine REST API. Use redmine_paths_list and \
                                 redmine_paths_info to discover endpoints, then redmine_request \
                                 to call them.",
            }),
        ))
    }

    /// Handles the tools/list request.
    fn handle_tools_list(&self, req: &Request) -> Result<Response, Response> {
        self.require_running(&req.id)?;

        Ok(Response::result(
            req.id.clone(),
            json!({ "tools": self.tool_definitions() }),
        ))
    }

    /// Handles the tools/call request.
    async fn handle_tools_call(&mut self, req: &Request) -> Result<Response, Response> {
        self.require_running(&req.id)?;

        let params: ToolCallParams = req.parse_params()?;
        let result = self.call_tool(&params.name, &params.arguments).await;

        let value = serde_json::to_value(&result).map_err(|e| {
            error!(error = %e, "Failed to serialise tool call result");
            Response::internal_error(
                req.id.clone(),
                "Internal error: failed to serialise result",
            )
        })?;

        Ok(Response::result(req.id.clone(), value))
    }

    /// Dispatches a tool call by name.
    pub async fn call_tool(&mut self, name: &str, arguments: &Value) -> ToolCallResult {
        info!(tool = name, "Tool call");

        match name {
            "redmine_request" => self.call_request(arguments).await,
            "redmine_paths_list" => self.call_paths_list(),
            "redmine_paths_info" => self.call_paths_info(arguments),
            "redmine_upload" => self.call_upload(arguments).await,
            "redmine_download" => self.call_download(arguments).await,
            _ => ToolCallResult::error(format!("Unknown tool: {name}")),
        }
    }

    /// Ensures the server is in the Running state.
    fn require_running(&self, id: &RequestId) -> Result<(), Response> {
        if self.state != ServerState::Running {
            return Err(Response::error(
                Some(id.clone()),
                ErrorCode::InvalidRequest,
                "Server not initialised",
            ));
        }
        Ok(())
    }

    /// Returns the list of available tools.
    #[must_use]
    pub fn tool_definitions(&self) -> Vec<ToolDefinition> {
        let mut request_description = String::from(
            "Make a request to the Redmine REST API.\n\n\
             Args:\n    \
             path: API endpoint path (e.g. '/issues.json')\n    \
             method: HTTP method to use (default: 'get')\n    \
             data: JSON request body (for POST/PUT)\n    \
             params: Query parameters\n\n\
             Returns:\n    \
             YAML with the response status_code, body and error message",
        );
        let instructions = self.request_instructions.trim();
        if !instructions.is_empty() {
            request_description.push_str("\n\n");
            request_description.push_str(instructions);
        }

        vec![
            ToolDefinition {
                name: "redmine_request".to_string(),
                description: request_description,
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "path": {
                            "type": "string",
                            "description": "API endpoint path (e.g. '/issues.json')"
                        },
                        "method": {
                            "type": "string",
                            "description": "HTTP method (default: 'get')",
                            "default": "get"
                        },
                        "data": {
                            "type": "object",
                            "description": "JSON request body for POST/PUT"
                        },
                        "params": {
                            "type": "object",
                            "description": "Query parameters; array values repeat the key"
                        }
                    },
                    "required": ["path"]
                }),
            },
            ToolDefinition {
                name: "redmine_paths_list".to_string(),
                description: "List the API path templates in the Redmine OpenAPI document \
                              (e.g. '/issues.json'). Use redmine_paths_info to get the full \
                              definition of a path."
                    .to_string(),
                input_schema: json!({
                    "type": "object",
                    "properties": {}
                }),
            },
            ToolDefinition {
                name: "redmine_paths_info".to_string(),
                description: "Get the OpenAPI operation definitions (parameters, request and \
                              response bodies) for the given path templates. Unknown templates \
                              are left out of the result."
                    .to_string(),
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "path_templates": {
                            "type": "array",
                            "items": { "type": "string" },
                            "description": "Path templates, e.g. ['/issues.json', '/projects.json']"
                        }
                    },
                    "required": ["path_templates"]
                }),
            },
            ToolDefinition {
                name: "redmine_upload".to_string(),
                description: "Upload a local file to Redmine. The response body contains the \
                              upload token to reference from an issue's 'uploads' list."
                    .to_string(),
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "file_path": {
                            "type": "string",
                            "description": "Fully qualified path of the file to upload"
                        },
                        "description": {
                            "type": "string",
                            "description": "Optional description for the file"
                        }
                    },
                    "required": ["file_path"]
                }),
            },
            ToolDefinition {
                name: "redmine_download".to_string(),
                description: "Download a Redmine attachment and save it to a local file. \
                              Returns the saved path and filename."
                    .to_string(),
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "attachment_id": {
                            "type": "integer",
                            "description": "ID of the attachment to download"
                        },
                        "save_path": {
                            "type": "string",
                            "description": "Fully qualified path the file is saved to"
                        },
                        "filename": {
                            "type": "string",
                            "description": "Optional attachment filename; looked up from the \
                                            attachment metadata when omitted"
                        }
                    },
                    "required": ["attachment_id", "save_path"]
                }),
            },
        ]
    }

    // ==================== Tool Handlers ====================

    /// Forwards an arbitrary request to Redmine.
    async fn call_request(&self, arguments: &Value) -> ToolCallResult {
        let path = match required_str(arguments, "path") {
            Ok(path) => path,
            Err(e) => return e,
        };
        let method = match optional_str(arguments, "method") {
            Ok(method) => method.unwrap_or("get"),
            Err(e) => return e,
        };
        let query = match query_pairs(arguments.get("params").unwrap_or(&Value::Null)) {
            Ok(query) => query,
            Err(e) => return e,
        };

        let mut request = ApiRequest::new(method, path);
        request.query = query;
        if let Some(data) = arguments.get("data").filter(|d| !d.is_null()) {
            request = request.with_json(data.clone());
        }

        ToolCallResult::yaml(&self.client.request(request).await)
    }

    /// Lists the OpenAPI path templates.
    fn call_paths_list(&self) -> ToolCallResult {
        ToolCallResult::yaml(self.catalog.list_paths())
    }

    /// Returns OpenAPI definitions for the requested templates.
    fn call_paths_info(&mut self, arguments: &Value) -> ToolCallResult {
        let Some(items) = arguments.get("path_templates").and_then(Value::as_array) else {
            return ToolCallResult::error(
                "Missing required parameter: path_templates (array of strings)",
            );
        };

        let mut templates = Vec::with_capacity(items.len());
        for item in items {
            let Some(template) = item.as_str() else {
                return ToolCallResult::error("path_templates must contain only strings");
            };
            templates.push(template.to_string());
        }

        ToolCallResult::yaml(self.catalog.path_info(&templates))
    }

    /// Uploads a local file.
    async fn call_upload(&self, arguments: &Value) -> ToolCallResult {
        let file_path = match required_str(arguments, "file_path") {
            Ok(path) => path,
            Err(e) => return e,
        };
        let description = match optional_str(arguments, "description") {
            Ok(description) => description,
            Err(e) => return e,
        };

        ToolCallResult::yaml(&self.client.upload(file_path, description).await)
    }

    /// Downloads an attachment to a local file.
    async fn call_download(&self, arguments: &Value) -> ToolCallResult {
        let attachment_id = match arguments.get("attachment_id") {
            Some(Value::Number(n)) => n.as_u64(),
            Some(Value::String(s)) => s.trim().parse().ok(),
            _ => None,
        };
        let Some(attachment_id) = attachment_id else {
            return ToolCallResult::error(
                "Missing required parameter: attachment_id (non-negative integer)",
            );
        };
        let save_path = match required_str(arguments, "save_path") {
            Ok(path) => path,
            Err(e) => return e,
        };
        let filename = match optional_str(arguments, "filename") {
            Ok(filename) => filename,
            Err(e) => return e,
        };

        ToolCallResult::yaml(
            &self
                .client
                .download(attachment_id, save_path, filename)
                .await,
        )
    }
}

/// Reads a required string argument.
fn required_str<'a>(arguments: &'a Value, name: &str) -> Result<&'a str, ToolCallResult> {
    arguments
        .get(name)
        .and_then(Value::as_str)
        .ok_or_else(|| ToolCallResult::error(format!("Missing required parameter: {name}")))
}

/// Reads an optional string argument; `null` counts as absent.
fn optional_str<'a>(arguments: &'a Value, name: &str) -> Result<Option<&'a str>, ToolCallResult> {
    match arguments.get(name) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(_) => Err(ToolCallResult::error(format!(
            "Parameter {name} must be a string"
        ))),
    }
}

/// Flattens a `params` object into query pairs.
///
/// Strings are used as-is, other scalars by their JSON text, arrays repeat
/// the key once per element and `null` values are dropped.
fn query_pairs(params: &Value) -> Result<Vec<(String, String)>, ToolCallResult> {
    let object = match params {
        Value::Null => return Ok(Vec::new()),
        Value::Object(object) => object,
        _ => return Err(ToolCallResult::error("Parameter params must be an object")),
    };

    let mut pairs = Vec::with_capacity(object.len());
    for (key, value) in object {
        match value {
            Value::Array(items) => {
                pairs.extend(
                    items
                        .iter()
                        .filter_map(query_value)
                        .map(|v| (key.clone(), v)),
                );
            }
            other => {
                if let Some(v) = query_value(other) {
                    pairs.push((key.clone(), v));
                }
            }
        }
    }
    Ok(pairs)
}

fn query_value(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}
