//! Agent core for mcpilot.
//!
//! Ties a [`ModelBackend`](mcpilot_llm::ModelBackend) to a set of MCP tool
//! servers:
//!
//! ```text
//! query ─► Agent ─► ModelBackend ─► ModelTurn
//!            ▲                         │ invocations
//!            │                         ▼
//!        tool messages ◄── ToolDispatcher ──► ToolServer (McpClient)
//! ```
//!
//! [`Agent::prompt`] answers without streaming and reports an
//! [`AgentOutcome`]; [`Agent::prompt_stream`] yields [`StreamChunk`]s as the
//! answer arrives.

pub mod agent;
pub mod conversation;
pub mod dispatcher;
pub mod error;
pub mod stream;
pub mod transcript;

pub use agent::{Agent, AgentOptions, AgentOutcome};
pub use conversation::{Conversation, DEFAULT_SYSTEM_PROMPT};
pub use dispatcher::{
    DispatchError, SERVER_TOOL_SEPARATOR, SharedToolServer, ToolDispatcher, ToolReply, ToolServer,
    qualified_name, split_qualified_name,
};
pub use error::{AgentError, Result};
pub use stream::{AgentStream, StreamChunk};
pub use transcript::append_transcript;
