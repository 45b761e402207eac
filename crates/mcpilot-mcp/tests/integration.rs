//! Integration tests for the MCP client.
//!
//! These tests run the mock MCP server binary to verify the full protocol
//! flow over real pipes.

use std::time::Duration;

use mcpilot_mcp::{
    ClientTimeouts, McpClient, McpError, McpManager, StdioServerConfig, ToolCallResult,
};
use serde_json::json;

fn mock_config(name: &str) -> StdioServerConfig {
    StdioServerConfig::new(name, env!("CARGO_BIN_EXE_mock-mcp-server"))
}

fn short_timeouts() -> ClientTimeouts {
    ClientTimeouts {
        handshake: Duration::from_millis(500),
        list: Duration::from_millis(500),
        call: Duration::from_millis(300),
        call_watchdog: Duration::from_millis(100),
    }
}

#[tokio::test]
async fn test_start_and_list_tools() {
    let client = McpClient::start(&mock_config("mock")).await.unwrap();
    assert_eq!(client.capabilities()["tools"]["listChanged"], json!(false));

    let tools = client.list_tools().await;
    let names: Vec<_> = tools.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names, vec!["echo", "add", "env", "fail", "status"]);

    let add = client.tool("add").unwrap();
    assert_eq!(add.required_params(), vec!["a", "b"]);
    assert_eq!(add.description.as_deref(), Some("Add two numbers"));

    client.stop().await;
}

#[tokio::test]
async fn test_call_tool_success() {
    let client = McpClient::start(&mock_config("mock")).await.unwrap();

    let result = client.call_tool("add", json!({"a": 2, "b": 3})).await;
    match result {
        ToolCallResult::Success(value) => {
            assert_eq!(value["content"][0]["text"], json!("5"));
        }
        other => panic!("expected success, got {other:?}"),
    }

    client.stop().await;
}

#[tokio::test]
async fn test_call_tool_rpc_error_is_returned_verbatim() {
    let client = McpClient::start(&mock_config("mock")).await.unwrap();

    let result = client.call_tool("fail", json!({})).await;
    assert_eq!(
        result.to_value(),
        json!({"error": {"code": -32000, "message": "tool exploded"}})
    );

    client.stop().await;
}

#[tokio::test]
async fn test_handshake_sends_initialized_notification() {
    let client = McpClient::start(&mock_config("mock")).await.unwrap();

    let ToolCallResult::Success(status) = client.call_tool("status", json!({})).await else {
        panic!("status call failed");
    };
    assert_eq!(status["initialized"], json!(true));

    client.stop().await;
}

#[tokio::test]
async fn test_noisy_server_still_works() {
    let config = mock_config("noisy").with_arg("--noise");
    let client = McpClient::start(&config).await.unwrap();

    assert_eq!(client.list_tools().await.len(), 5);
    let result = client.call_tool("echo", json!({"message": "hi"})).await;
    assert_eq!(result.to_value()["content"][0]["text"], json!("hi"));

    client.stop().await;
}

#[tokio::test]
async fn test_server_request_is_rejected() {
    let config = mock_config("asker").with_arg("--ask-client");
    let client = McpClient::start(&config).await.unwrap();

    // Give the rejection a moment to reach the server.
    tokio::time::sleep(Duration::from_millis(100)).await;

    let ToolCallResult::Success(status) = client.call_tool("status", json!({})).await else {
        panic!("status call failed");
    };
    let reply = &status["client_reply"];
    assert_eq!(reply["id"], json!("srv-1"));
    assert_eq!(reply["error"]["code"], json!(-32601));
    assert_eq!(
        reply["error"]["message"],
        json!("Method roots/list not implemented in client")
    );

    client.stop().await;
}

#[tokio::test]
async fn test_env_overlay_and_cwd() {
    let dir = tempfile::tempdir().unwrap();
    let config = mock_config("env")
        .with_env_var("MOCK_GREETING", "hello")
        .with_cwd(dir.path());
    let client = McpClient::start(&config).await.unwrap();

    let ToolCallResult::Success(value) = client
        .call_tool("env", json!({"name": "MOCK_GREETING"}))
        .await
    else {
        panic!("env call failed");
    };
    assert_eq!(value["value"], json!("hello"));
    let cwd = value["cwd"].as_str().unwrap();
    let expected = dir.path().canonicalize().unwrap();
    assert_eq!(
        std::path::Path::new(cwd).canonicalize().unwrap(),
        expected
    );

    // PATH comes from the parent environment.
    let ToolCallResult::Success(value) = client.call_tool("env", json!({"name": "PATH"})).await
    else {
        panic!("env call failed");
    };
    assert!(value["value"].is_string());

    client.stop().await;
}

#[tokio::test]
async fn test_failed_initialize() {
    let config = mock_config("refuser").with_arg("--fail-init");
    let result = McpClient::start_with_timeouts(&config, short_timeouts()).await;
    assert!(matches!(result, Err(McpError::ServerError { code: -32603, .. })));
}

#[tokio::test]
async fn test_initialize_timeout() {
    let config = mock_config("silent").with_arg("--silent-init");
    let result = McpClient::start_with_timeouts(&config, short_timeouts()).await;
    assert!(matches!(result, Err(McpError::Timeout(_))));
}

#[tokio::test]
async fn test_tool_call_timeout() {
    let config = mock_config("slow").with_arg("--slow-tool").with_arg("echo:2000");
    let client = McpClient::start_with_timeouts(&config, short_timeouts())
        .await
        .unwrap();

    let started = std::time::Instant::now();
    let result = client.call_tool("echo", json!({"message": "late"})).await;
    assert!(matches!(result, ToolCallResult::Timeout(_)));
    assert!(started.elapsed() >= Duration::from_millis(300));
    assert!(started.elapsed() < Duration::from_millis(1500));

    client.stop().await;
}

#[tokio::test]
async fn test_call_after_stop() {
    let client = McpClient::start(&mock_config("mock")).await.unwrap();
    client.stop().await;
    client.stop().await;

    let result = client.call_tool("echo", json!({"message": "x"})).await;
    assert_eq!(result.to_value(), json!({"error": "Server not started"}));
}

#[tokio::test]
async fn test_manager_connects_good_servers_only() {
    let mut manager = McpManager::with_configs(vec![
        mock_config("first"),
        StdioServerConfig::new("missing", "nonexistent_command_12345"),
        mock_config("second").with_arg("--fail-init"),
        mock_config("third"),
    ])
    .with_timeouts(short_timeouts());

    assert_eq!(manager.connect_all().await, 2);
    assert!(manager.is_connected("first"));
    assert!(manager.is_connected("third"));
    assert!(!manager.is_connected("second"));

    let tools = manager.all_tools();
    assert_eq!(tools.len(), 2);
    assert_eq!(tools[0].0, "first");
    assert_eq!(tools[0].1.len(), 5);

    // Already-connected servers are not restarted.
    assert_eq!(manager.connect_all().await, 0);

    manager.shutdown_all().await;
    assert_eq!(manager.connected_count(), 0);
}
