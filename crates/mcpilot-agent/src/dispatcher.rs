//! Routing model tool calls to tool servers.
//!
//! The model sees every tool as `<server>_<tool>`. [`ToolDispatcher`] splits
//! that name at the first underscore, checks the call against the tool's
//! declared `required` parameters, and forwards it to the owning
//! [`ToolServer`]. Every outcome, including routing failures, comes back as a
//! [`ToolReply`] so the conversation can carry on.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Value, json};

use mcpilot_llm::{Message, ToolDefinition, ToolInvocation};
use mcpilot_mcp::{McpClient, ToolCallResult, ToolInfo};

/// Separator between server and tool in qualified names.
pub const SERVER_TOOL_SEPARATOR: char = '_';

/// Something that owns a set of tools and can execute them.
#[async_trait]
pub trait ToolServer: Send + Sync {
    /// Server name, the prefix of its qualified tool names.
    fn name(&self) -> &str;

    /// Tools the server advertised.
    fn tools(&self) -> Vec<ToolInfo>;

    /// Look up one tool.
    fn tool(&self, name: &str) -> Option<ToolInfo> {
        self.tools().into_iter().find(|t| t.name == name)
    }

    /// Execute a tool.
    async fn call_tool(&self, tool: &str, arguments: Value) -> ToolCallResult;

    /// Release the server. Must be safe to call more than once.
    async fn stop(&self);
}

#[async_trait]
impl ToolServer for McpClient {
    fn name(&self) -> &str {
        McpClient::name(self)
    }

    fn tools(&self) -> Vec<ToolInfo> {
        McpClient::tools(self)
    }

    fn tool(&self, name: &str) -> Option<ToolInfo> {
        McpClient::tool(self, name)
    }

    async fn call_tool(&self, tool: &str, arguments: Value) -> ToolCallResult {
        McpClient::call_tool(self, tool, arguments).await
    }

    async fn stop(&self) {
        McpClient::stop(self).await
    }
}

/// A tool server shared between the dispatcher and its owner.
pub type SharedToolServer = Arc<dyn ToolServer>;

/// Build the qualified name the model sees.
pub fn qualified_name(server: &str, tool: &str) -> String {
    format!("{server}{SERVER_TOOL_SEPARATOR}{tool}")
}

/// Split a qualified name into `(server, tool)` at the first separator.
pub fn split_qualified_name(name: &str) -> Option<(&str, &str)> {
    name.split_once(SERVER_TOOL_SEPARATOR)
}

/// Why a call never reached a server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    /// The name has no server prefix.
    InvalidName,
    /// The prefix names no connected server.
    UnknownServer(String),
    /// A parameter the schema marks as required is absent.
    MissingParameter(String),
}

impl std::fmt::Display for DispatchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidName => write!(f, "Invalid function name format"),
            Self::UnknownServer(server) => write!(f, "Unknown server: {server}"),
            Self::MissingParameter(param) => write!(f, "Missing required parameter: {param}"),
        }
    }
}

/// Result of dispatching one invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolReply {
    /// Id of the invocation this answers.
    pub call_id: String,
    /// Qualified tool name as the model sent it.
    pub name: String,
    /// JSON payload for the model: the server's result or `{"error": ...}`.
    pub payload: Value,
    /// Whether the tool actually ran and succeeded.
    pub success: bool,
}

impl ToolReply {
    fn rejected(invocation: &ToolInvocation, error: DispatchError) -> Self {
        Self {
            call_id: invocation.id.clone(),
            name: invocation.name.clone(),
            payload: json!({ "error": error.to_string() }),
            success: false,
        }
    }

    /// The payload as JSON text.
    pub fn content(&self) -> String {
        self.payload.to_string()
    }

    /// The tool message recording this reply.
    pub fn to_message(&self) -> Message {
        Message::tool(&self.call_id, &self.name, self.content())
    }
}

/// Routes invocations to the servers that own them.
#[derive(Clone, Default)]
pub struct ToolDispatcher {
    servers: Vec<SharedToolServer>,
}

impl ToolDispatcher {
    /// Create a dispatcher over the given servers.
    pub fn new(servers: Vec<SharedToolServer>) -> Self {
        Self { servers }
    }

    /// Connected servers, in configuration order.
    pub fn servers(&self) -> &[SharedToolServer] {
        &self.servers
    }

    /// Find a server by name.
    pub fn server(&self, name: &str) -> Option<&SharedToolServer> {
        self.servers.iter().find(|s| s.name() == name)
    }

    /// Whether no servers are connected.
    pub fn is_empty(&self) -> bool {
        self.servers.is_empty()
    }

    /// The function catalog offered to the model.
    pub fn catalog(&self) -> Vec<ToolDefinition> {
        self.servers
            .iter()
            .flat_map(|server| {
                server
                    .tools()
                    .into_iter()
                    .map(|tool| tool_definition(server.name(), tool))
                    .collect::<Vec<_>>()
            })
            .collect()
    }

    /// Execute one invocation.
    pub async fn dispatch(&self, invocation: &ToolInvocation) -> ToolReply {
        let Some((server_name, tool_name)) = split_qualified_name(&invocation.name) else {
            tracing::warn!(name = %invocation.name, "tool name has no server prefix");
            return ToolReply::rejected(invocation, DispatchError::InvalidName);
        };

        let Some(server) = self.server(server_name) else {
            tracing::warn!(server = %server_name, "tool call for unknown server");
            return ToolReply::rejected(
                invocation,
                DispatchError::UnknownServer(server_name.to_string()),
            );
        };

        // Tools the server never listed are still attempted; the server has
        // the final say.
        if let Some(tool) = server.tool(tool_name)
            && let Some(missing) = tool
                .required_params()
                .into_iter()
                .find(|param| invocation.arguments.get(*param).is_none())
        {
            tracing::warn!(
                server = %server_name,
                tool = %tool_name,
                param = %missing,
                "tool call missing required parameter"
            );
            return ToolReply::rejected(
                invocation,
                DispatchError::MissingParameter(missing.to_string()),
            );
        }

        tracing::info!(
            server = %server_name,
            tool = %tool_name,
            id = %invocation.id,
            "calling tool"
        );
        let result = server
            .call_tool(tool_name, invocation.arguments.clone())
            .await;
        if !result.is_success() {
            tracing::warn!(server = %server_name, tool = %tool_name, ?result, "tool call failed");
        }

        ToolReply {
            call_id: invocation.id.clone(),
            name: invocation.name.clone(),
            payload: result.to_value(),
            success: result.is_success(),
        }
    }

    /// Stop every server.
    pub async fn shutdown(&self) {
        for server in &self.servers {
            server.stop().await;
        }
    }
}

impl std::fmt::Debug for ToolDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolDispatcher")
            .field(
                "servers",
                &self.servers.iter().map(|s| s.name()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

fn tool_definition(server: &str, tool: ToolInfo) -> ToolDefinition {
    let parameters = tool
        .input_schema
        .unwrap_or_else(|| json!({"type": "object", "properties": {}}));
    ToolDefinition::new(
        qualified_name(server, &tool.name),
        tool.description.unwrap_or_default(),
        parameters,
    )
}
