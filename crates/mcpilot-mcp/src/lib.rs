//! MCP (Model Context Protocol) client for mcpilot.
//!
//! Connects to tool servers running as child processes and speaks JSON-RPC
//! 2.0 with them over stdio, one JSON object per line.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  McpManager                                                 │
//! │  - Starts every configured server, skips the broken ones    │
//! └─────────────────────────────────────────────────────────────┘
//!                           │
//!                           ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │  McpClient                                                  │
//! │  - initialize handshake, tools/list, tools/call             │
//! └─────────────────────────────────────────────────────────────┘
//!                           │
//!                           ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │  StdioTransport                                             │
//! │  - Child process lifetime, graceful then forced stop        │
//! └─────────────────────────────────────────────────────────────┘
//!                           │
//!                           ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │  RpcConnection                                              │
//! │  - Newline framing, pending-response table, receive task    │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! use mcpilot_mcp::{McpClient, StdioServerConfig};
//!
//! let config = StdioServerConfig::new("files", "mcp-server-filesystem")
//!     .with_arg("~/notes");
//!
//! let client = McpClient::start(&config).await?;
//! for tool in client.list_tools().await {
//!     println!("{}: {:?}", tool.name, tool.description);
//! }
//!
//! let result = client.call_tool("read_file", json!({"path": "todo.md"})).await;
//! println!("{}", result.to_value());
//! client.stop().await;
//! ```

pub mod client;
pub mod connection;
pub mod error;
pub mod manager;
pub mod protocol;
pub mod transport;

pub use client::{ClientTimeouts, McpClient, ToolCallResult};
pub use connection::{RequestOptions, RpcConnection};
pub use error::{McpError, Result};
pub use manager::McpManager;
pub use protocol::{
    CallToolParams, IncomingMessage, InitializeParams, InitializeResult, JsonRpcError,
    JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, ListToolsResult, ServerInfo, ToolInfo,
};
pub use transport::{StdioServerConfig, StdioTransport};
