//! Error types for the agent crate.

use thiserror::Error;

/// Result type alias using the agent error type.
pub type Result<T> = std::result::Result<T, AgentError>;

/// Error type for agent operations.
#[derive(Debug, Error)]
pub enum AgentError {
    /// None of the configured tool servers came up.
    #[error("No MCP servers could be started.")]
    NoServers,

    /// Model backend error.
    #[error("Model error: {0}")]
    Model(#[from] mcpilot_llm::LlmError),

    /// The model kept asking for tools past the configured limit.
    #[error("Maximum iterations exceeded: {0}")]
    MaxIterations(u32),

    /// The model stream broke after it had started.
    #[error("Stream error: {0}")]
    Stream(String),

    /// Transcript could not be written.
    #[error("Transcript error: {0}")]
    Transcript(#[from] std::io::Error),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
