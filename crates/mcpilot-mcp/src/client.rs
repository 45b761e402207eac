//! MCP client: handshake, tool discovery and tool calls on top of a
//! [`StdioTransport`].

use std::time::Duration;

use parking_lot::RwLock;
use serde_json::{Value, json};

use crate::connection::RequestOptions;
use crate::error::{McpError, Result};
use crate::protocol::{
    CallToolParams, InitializeParams, InitializeResult, JsonRpcError, ListToolsResult, ToolInfo,
    methods,
};
use crate::transport::{StdioServerConfig, StdioTransport};

/// Deadlines applied to each kind of request.
#[derive(Debug, Clone, Copy)]
pub struct ClientTimeouts {
    /// Deadline for the `initialize` handshake.
    pub handshake: Duration,
    /// Deadline for `tools/list`.
    pub list: Duration,
    /// Deadline for `tools/call`. Tools may run for a long time.
    pub call: Duration,
    /// Warn about a tool call still running after this long.
    pub call_watchdog: Duration,
}

impl Default for ClientTimeouts {
    fn default() -> Self {
        Self {
            handshake: Duration::from_secs(10),
            list: Duration::from_secs(10),
            call: Duration::from_secs(3600),
            call_watchdog: Duration::from_secs(5),
        }
    }
}

/// What a `tools/call` produced.
///
/// None of these are Rust errors from the caller's point of view: each one
/// becomes tool-result content the model can read.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolCallResult {
    /// The server's `result`, untouched.
    Success(Value),
    /// The server answered with a JSON-RPC error.
    RpcError(JsonRpcError),
    /// No answer before the deadline.
    Timeout(Duration),
    /// The request never made it, or the session died under it.
    Failed(String),
}

impl ToolCallResult {
    /// JSON payload handed back to the conversation.
    pub fn to_value(&self) -> Value {
        match self {
            Self::Success(value) => value.clone(),
            Self::RpcError(err) => json!({ "error": err }),
            Self::Timeout(after) => json!({
                "error": format!("Timeout waiting for tool result after {}s", after.as_secs())
            }),
            Self::Failed(reason) => json!({ "error": reason }),
        }
    }

    /// Whether the call succeeded at the protocol level.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }
}

/// A started, initialized MCP server.
pub struct McpClient {
    name: String,
    transport: StdioTransport,
    timeouts: ClientTimeouts,
    capabilities: Value,
    tools: RwLock<Vec<ToolInfo>>,
}

impl McpClient {
    /// Spawn the server and perform the `initialize` handshake.
    pub async fn start(config: &StdioServerConfig) -> Result<Self> {
        Self::start_with_timeouts(config, ClientTimeouts::default()).await
    }

    /// Like [`start`](Self::start) with explicit deadlines.
    ///
    /// On handshake failure the child is stopped before the error is
    /// returned; the caller gets nothing to reuse.
    pub async fn start_with_timeouts(
        config: &StdioServerConfig,
        timeouts: ClientTimeouts,
    ) -> Result<Self> {
        let transport = StdioTransport::spawn(config)?;

        match handshake(&transport, timeouts.handshake).await {
            Ok(init) => {
                tracing::info!(
                    server = %config.name,
                    remote = init.server_info.as_ref().map(|i| i.name.as_str()).unwrap_or("unknown"),
                    protocol = init.protocol_version.as_deref().unwrap_or("unknown"),
                    "MCP server initialized"
                );
                Ok(Self {
                    name: config.name.clone(),
                    transport,
                    timeouts,
                    capabilities: init.capabilities,
                    tools: RwLock::new(Vec::new()),
                })
            }
            Err(e) => {
                tracing::error!(server = %config.name, error = %e, "initialize failed");
                transport.stop().await;
                Err(e)
            }
        }
    }

    /// Server name as configured.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Capabilities the server advertised during the handshake.
    pub fn capabilities(&self) -> &Value {
        &self.capabilities
    }

    /// Tools returned by the last successful [`list_tools`](Self::list_tools).
    pub fn tools(&self) -> Vec<ToolInfo> {
        self.tools.read().clone()
    }

    /// Look up one cached tool by name.
    pub fn tool(&self, name: &str) -> Option<ToolInfo> {
        self.tools.read().iter().find(|t| t.name == name).cloned()
    }

    /// Ask the server for its tools.
    ///
    /// Any failure is logged and yields an empty list, so one misbehaving
    /// server cannot take the whole agent down.
    pub async fn list_tools(&self) -> Vec<ToolInfo> {
        match self.try_list_tools().await {
            Ok(tools) => {
                tracing::info!(server = %self.name, tool_count = tools.len(), "listed MCP tools");
                *self.tools.write() = tools.clone();
                tools
            }
            Err(e) => {
                tracing::error!(server = %self.name, error = %e, "tools/list failed");
                Vec::new()
            }
        }
    }

    async fn try_list_tools(&self) -> Result<Vec<ToolInfo>> {
        let response = self
            .transport
            .request(
                methods::TOOLS_LIST,
                Some(json!({})),
                RequestOptions::deadline(self.timeouts.list),
            )
            .await?;
        let result = response.into_result()?;
        let list: ListToolsResult = serde_json::from_value(result)
            .map_err(|e| McpError::protocol(format!("malformed tools/list result: {e}")))?;
        Ok(list.tools)
    }

    /// Call a tool. Never fails; see [`ToolCallResult`].
    pub async fn call_tool(&self, tool: &str, arguments: Value) -> ToolCallResult {
        if self.transport.is_stopped().await {
            return ToolCallResult::Failed("Server not started".to_string());
        }

        let params = CallToolParams {
            name: tool.to_string(),
            arguments,
        };
        let params = match serde_json::to_value(&params) {
            Ok(params) => params,
            Err(e) => return ToolCallResult::Failed(e.to_string()),
        };

        let opts = RequestOptions::deadline(self.timeouts.call)
            .with_watchdog(self.timeouts.call_watchdog);
        let outcome = match self
            .transport
            .request(methods::TOOLS_CALL, Some(params), opts)
            .await
        {
            Ok(response) => match response.into_result() {
                Ok(value) => ToolCallResult::Success(value),
                Err(err) => ToolCallResult::RpcError(err),
            },
            Err(McpError::Timeout(after)) => ToolCallResult::Timeout(after),
            Err(McpError::NotStarted) => ToolCallResult::Failed("Server not started".to_string()),
            Err(e) => ToolCallResult::Failed(e.to_string()),
        };

        match &outcome {
            ToolCallResult::Success(_) => {
                tracing::debug!(server = %self.name, %tool, "tool call succeeded")
            }
            other => tracing::warn!(server = %self.name, %tool, result = ?other, "tool call failed"),
        }
        outcome
    }

    /// Stop the server. Idempotent.
    pub async fn stop(&self) {
        self.transport.stop().await;
    }
}

async fn handshake(transport: &StdioTransport, deadline: Duration) -> Result<InitializeResult> {
    let params = serde_json::to_value(InitializeParams::default())?;
    let response = transport
        .request(
            methods::INITIALIZE,
            Some(params),
            RequestOptions::deadline(deadline),
        )
        .await?;
    let result = response.into_result()?;
    let init: InitializeResult = serde_json::from_value(result)
        .map_err(|e| McpError::protocol(format!("malformed initialize result: {e}")))?;

    transport.notify(methods::INITIALIZED, None).await?;
    Ok(init)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_timeouts() {
        let t = ClientTimeouts::default();
        assert_eq!(t.handshake, Duration::from_secs(10));
        assert_eq!(t.list, Duration::from_secs(10));
        assert_eq!(t.call, Duration::from_secs(3600));
        assert_eq!(t.call_watchdog, Duration::from_secs(5));
    }

    #[test]
    fn test_tool_call_result_payloads() {
        let ok = ToolCallResult::Success(json!({"content": [{"type": "text", "text": "hi"}]}));
        assert_eq!(ok.to_value()["content"][0]["text"], json!("hi"));
        assert!(ok.is_success());

        let rpc = ToolCallResult::RpcError(JsonRpcError {
            code: -32602,
            message: "bad params".into(),
            data: None,
        });
        assert_eq!(
            rpc.to_value(),
            json!({"error": {"code": -32602, "message": "bad params"}})
        );

        let timeout = ToolCallResult::Timeout(Duration::from_secs(3600));
        assert_eq!(
            timeout.to_value(),
            json!({"error": "Timeout waiting for tool result after 3600s"})
        );

        let failed = ToolCallResult::Failed("Server not started".into());
        assert_eq!(failed.to_value(), json!({"error": "Server not started"}));
        assert!(!failed.is_success());
    }

    #[tokio::test]
    async fn test_start_nonexistent_server() {
        let config = StdioServerConfig::new("missing", "nonexistent_command_12345");
        let result = McpClient::start(&config).await;
        assert!(matches!(result, Err(McpError::SpawnFailed(_))));
    }
}
