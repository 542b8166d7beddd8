//! Integration tests for MCP protocol handling.
//!
//! These tests verify the MCP server's JSON-RPC 2.0 protocol implementation,
//! including request/response handling, error responses, lifecycle management
//! and tool calls against a mock Redmine.

mod common;

use serde_json::{json, Value};
use tempfile::TempDir;

use common::{MockRedmine, ATTACHMENT_CONTENT, ATTACHMENT_ID};
use redmine_mcp::mcp::protocol::{ErrorCode, Message, RequestId, Response};
use redmine_mcp::mcp::server::{McpServer, ServerState};
use redmine_mcp::mcp::transport::LineTransport;
use redmine_mcp::openapi::{ApiDocument, PathCatalog};

const INITIALIZE: &str = r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{"protocolVersion":"2024-11-05","capabilities":{},"clientInfo":{"name":"test-client","version":"1.0.0"}}}"#;
const INITIALIZED: &str = r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#;

fn server_for(mock: &MockRedmine, instructions: &str) -> McpServer {
    McpServer::new(
        mock.client(),
        PathCatalog::new(ApiDocument::embedded().unwrap()),
        instructions.to_string(),
    )
}

async fn initialised(mock: &MockRedmine) -> McpServer {
    let mut server = server_for(mock, "");
    server.handle_line(INITIALIZE).await.unwrap();
    assert!(server.handle_line(INITIALIZED).await.is_none());
    assert_eq!(server.state(), ServerState::Running);
    server
}

fn result(response: &Response) -> &Value {
    response.result_value().expect("expected a result")
}

/// Calls a tool and returns its text and `isError` flag.
async fn call_tool(server: &mut McpServer, name: &str, arguments: Value) -> (String, bool) {
    let line = json!({
        "jsonrpc": "2.0",
        "id": 99,
        "method": "tools/call",
        "params": {"name": name, "arguments": arguments}
    })
    .to_string();
    let response = server.handle_line(&line).await.unwrap();
    let value = result(&response);
    let text = value["content"][0]["text"].as_str().unwrap().to_string();
    let is_error = value.get("isError").and_then(Value::as_bool).unwrap_or(false);
    (text, is_error)
}

fn yaml(text: &str) -> serde_yaml::Value {
    serde_yaml::from_str(text).unwrap()
}

// =============================================================================
// Protocol Parsing Tests
// =============================================================================

#[test]
fn test_parse_initialize_request() {
    let Message::Request(req) = Message::parse(INITIALIZE).unwrap() else {
        panic!("Expected Request");
    };
    assert_eq!(req.method, "initialize");
    assert_eq!(req.id, RequestId::Number(1));
}

#[test]
fn test_parse_notification() {
    let msg = Message::parse(INITIALIZED).unwrap();
    assert!(matches!(msg, Message::Notification(_)));
}

#[test]
fn test_parse_missing_jsonrpc_version() {
    let err = Message::parse(r#"{"id": 1, "method": "test"}"#).unwrap_err();
    assert_eq!(err.error_code(), Some(ErrorCode::InvalidRequest.code()));
}

// =============================================================================
// Lifecycle Tests
// =============================================================================

#[tokio::test]
async fn test_initialize_negotiates_version() {
    let mock = MockRedmine::start().await;
    let mut server = server_for(&mock, "");

    let response = server.handle_line(INITIALIZE).await.unwrap();
    let value = result(&response);
    assert_eq!(value["protocolVersion"], "2024-11-05");
    assert_eq!(value["serverInfo"]["name"], "mcp-redmine");
    assert!(value["capabilities"]["tools"].is_object());
    assert_eq!(server.state(), ServerState::Initialising);
    assert_eq!(server.protocol_version(), Some("2024-11-05"));
}

#[tokio::test]
async fn test_unknown_version_gets_latest() {
    let mock = MockRedmine::start().await;
    let mut server = server_for(&mock, "");

    let response = server
        .handle_line(r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{"protocolVersion":"1999-01-01"}}"#)
        .await
        .unwrap();
    assert_eq!(result(&response)["protocolVersion"], "2025-03-26");
}

#[tokio::test]
async fn test_second_initialize_is_rejected() {
    let mock = MockRedmine::start().await;
    let mut server = initialised(&mock).await;

    let response = server.handle_line(INITIALIZE).await.unwrap();
    assert_eq!(response.error_code(), Some(ErrorCode::InvalidRequest.code()));
}

#[tokio::test]
async fn test_tools_before_initialised_are_rejected() {
    let mock = MockRedmine::start().await;
    let mut server = server_for(&mock, "");

    let response = server
        .handle_line(r#"{"jsonrpc":"2.0","id":2,"method":"tools/list"}"#)
        .await
        .unwrap();
    assert_eq!(response.error_code(), Some(ErrorCode::InvalidRequest.code()));
}

#[tokio::test]
async fn test_ping_and_unknown_method() {
    let mock = MockRedmine::start().await;
    let mut server = initialised(&mock).await;

    let pong = server
        .handle_line(r#"{"jsonrpc":"2.0","id":"p","method":"ping"}"#)
        .await
        .unwrap();
    assert_eq!(result(&pong), &json!({}));
    assert_eq!(pong.id, Some(RequestId::String("p".to_string())));

    let unknown = server
        .handle_line(r#"{"jsonrpc":"2.0","id":3,"method":"resources/list"}"#)
        .await
        .unwrap();
    assert_eq!(unknown.error_code(), Some(ErrorCode::MethodNotFound.code()));
}

#[tokio::test]
async fn test_malformed_line_gets_parse_error() {
    let mock = MockRedmine::start().await;
    let mut server = server_for(&mock, "");

    let response = server.handle_line("{not json").await.unwrap();
    assert_eq!(response.error_code(), Some(ErrorCode::ParseError.code()));
    assert!(response.id.is_none());
}

#[tokio::test]
async fn test_serve_over_in_memory_transport() {
    let mock = MockRedmine::start().await;
    let mut server = server_for(&mock, "");

    let input = format!(
        "{INITIALIZE}\n{INITIALIZED}\n\n{}\n",
        r#"{"jsonrpc":"2.0","id":2,"method":"tools/list"}"#
    );
    let mut transport = LineTransport::new(input.as_bytes(), Vec::new());
    server.serve(&mut transport).await.unwrap();
    assert_eq!(server.state(), ServerState::ShuttingDown);

    let output = String::from_utf8(transport.into_writer()).unwrap();
    let responses: Vec<Value> = output
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();

    // One response per request; the notification and blank line get none.
    assert_eq!(responses.len(), 2);
    assert_eq!(responses[0]["id"], 1);
    assert_eq!(responses[1]["id"], 2);
    assert_eq!(responses[1]["result"]["tools"].as_array().unwrap().len(), 5);
}

// =============================================================================
// Tool Tests
// =============================================================================

#[tokio::test]
async fn test_tools_list_includes_instructions() {
    let mock = MockRedmine::start().await;
    let mut server = server_for(&mock, "Always set project_id=sandbox.\n");
    server.handle_line(INITIALIZE).await.unwrap();
    server.handle_line(INITIALIZED).await;

    let response = server
        .handle_line(r#"{"jsonrpc":"2.0","id":2,"method":"tools/list"}"#)
        .await
        .unwrap();
    let tools = result(&response)["tools"].as_array().unwrap();
    let request_tool = tools
        .iter()
        .find(|t| t["name"] == "redmine_request")
        .unwrap();
    assert!(request_tool["description"]
        .as_str()
        .unwrap()
        .ends_with("Always set project_id=sandbox."));
    assert_eq!(request_tool["inputSchema"]["required"], json!(["path"]));
}

#[tokio::test]
async fn test_redmine_request_returns_yaml_envelope() {
    let mock = MockRedmine::start().await;
    let mut server = initialised(&mock).await;

    let (text, is_error) = call_tool(
        &mut server,
        "redmine_request",
        json!({
            "path": "/echo.json",
            "method": "post",
            "data": {"issue": {"subject": "New issue"}},
            "params": {"include": ["journals", "watchers"], "limit": 5}
        }),
    )
    .await;

    assert!(!is_error);
    assert!(text.starts_with("status_code: 200\n"));
    let value = yaml(&text);
    assert_eq!(value["error"].as_str(), Some(""));
    assert_eq!(value["body"]["method"].as_str(), Some("POST"));
    assert_eq!(
        value["body"]["body"]["issue"]["subject"].as_str(),
        Some("New issue")
    );
    assert_eq!(
        value["body"]["query"].as_str(),
        Some("include=journals&include=watchers&limit=5")
    );
}

#[tokio::test]
async fn test_redmine_request_failure_is_data_not_error() {
    let mock = MockRedmine::start().await;
    let mut server = initialised(&mock).await;

    let (text, is_error) =
        call_tool(&mut server, "redmine_request", json!({"path": "/missing.json"})).await;

    assert!(!is_error);
    let value = yaml(&text);
    assert_eq!(value["status_code"].as_u64(), Some(404));
    assert!(value["error"]
        .as_str()
        .unwrap()
        .starts_with("HTTPStatusError: "));
}

#[tokio::test]
async fn test_redmine_request_requires_path() {
    let mock = MockRedmine::start().await;
    let mut server = initialised(&mock).await;

    let (text, is_error) = call_tool(&mut server, "redmine_request", json!({})).await;
    assert!(is_error);
    assert!(text.contains("path"));
}

#[tokio::test]
async fn test_paths_list_and_info() {
    let mock = MockRedmine::start().await;
    let mut server = initialised(&mock).await;

    let (text, is_error) = call_tool(&mut server, "redmine_paths_list", json!({})).await;
    assert!(!is_error);
    let paths: Vec<String> = serde_yaml::from_str(&text).unwrap();
    assert_eq!(paths[0], "/issues.json");
    assert!(paths.contains(&"/uploads.json".to_string()));

    let (text, is_error) = call_tool(
        &mut server,
        "redmine_paths_info",
        json!({"path_templates": ["/projects.json", "/does-not-exist.json", "/issues.json"]}),
    )
    .await;
    assert!(!is_error);
    let info: serde_yaml::Mapping = serde_yaml::from_str(&text).unwrap();
    let keys: Vec<&str> = info.keys().filter_map(serde_yaml::Value::as_str).collect();
    assert_eq!(keys, ["/projects.json", "/issues.json"]);
}

#[tokio::test]
async fn test_paths_info_rejects_non_array() {
    let mock = MockRedmine::start().await;
    let mut server = initialised(&mock).await;

    let (_, is_error) = call_tool(
        &mut server,
        "redmine_paths_info",
        json!({"path_templates": "/issues.json"}),
    )
    .await;
    assert!(is_error);
}

#[tokio::test]
async fn test_download_tool_accepts_string_id() {
    let mock = MockRedmine::start().await;
    let mut server = initialised(&mock).await;
    let dir = TempDir::new().unwrap();
    let target = dir.path().join("out.txt");

    let (text, is_error) = call_tool(
        &mut server,
        "redmine_download",
        json!({
            "attachment_id": ATTACHMENT_ID.to_string(),
            "save_path": target.to_str().unwrap()
        }),
    )
    .await;

    assert!(!is_error);
    let value = yaml(&text);
    assert_eq!(value["status_code"].as_u64(), Some(200));
    assert_eq!(value["body"]["filename"].as_str(), Some("report.txt"));
    assert_eq!(std::fs::read(&target).unwrap(), ATTACHMENT_CONTENT);
}

#[tokio::test]
async fn test_upload_tool_reports_precondition_in_envelope() {
    let mock = MockRedmine::start().await;
    let mut server = initialised(&mock).await;

    let (text, is_error) = call_tool(
        &mut server,
        "redmine_upload",
        json!({"file_path": "notes.txt"}),
    )
    .await;

    assert!(!is_error);
    let value = yaml(&text);
    assert_eq!(value["status_code"].as_u64(), Some(0));
    assert!(value["body"].is_null());
}

#[tokio::test]
async fn test_unknown_tool() {
    let mock = MockRedmine::start().await;
    let mut server = initialised(&mock).await;

    let (text, is_error) = call_tool(&mut server, "redmine_delete_everything", json!({})).await;
    assert!(is_error);
    assert_eq!(text, "Unknown tool: redmine_delete_everything");
}
