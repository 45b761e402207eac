//! Conversation types shared by the backends and the agent.
//!
//! Messages serialize to the OpenAI chat-completions shape, which is both
//! what the HTTP backend sends and what the transcript log stores.

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ─────────────────────────────────────────────────────────────────────────────
// Messages
// ─────────────────────────────────────────────────────────────────────────────

/// One entry in the conversation history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum Message {
    /// Instructions for the model.
    System { content: String },
    /// A user query.
    User { content: String },
    /// A model turn, possibly requesting tool calls.
    Assistant {
        content: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        tool_calls: Vec<ToolInvocation>,
        /// Chain-of-thought text some reasoning models return. Never resent.
        #[serde(
            rename = "reasoning_content",
            default,
            skip_serializing_if = "Option::is_none"
        )]
        reasoning: Option<String>,
    },
    /// The result of one tool call.
    Tool {
        /// Id of the invocation this answers.
        tool_call_id: String,
        /// Qualified tool name.
        name: String,
        /// JSON-encoded result payload.
        content: String,
    },
}

impl Message {
    /// Create a system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self::System {
            content: content.into(),
        }
    }

    /// Create a user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self::User {
            content: content.into(),
        }
    }

    /// Create an assistant message without tool calls.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::Assistant {
            content: content.into(),
            tool_calls: Vec::new(),
            reasoning: None,
        }
    }

    /// Create a tool result message.
    pub fn tool(
        tool_call_id: impl Into<String>,
        name: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self::Tool {
            tool_call_id: tool_call_id.into(),
            name: name.into(),
            content: content.into(),
        }
    }

    /// Role name as it appears on the wire.
    pub fn role(&self) -> &'static str {
        match self {
            Self::System { .. } => "system",
            Self::User { .. } => "user",
            Self::Assistant { .. } => "assistant",
            Self::Tool { .. } => "tool",
        }
    }

    /// Text content of the message.
    pub fn content(&self) -> &str {
        match self {
            Self::System { content }
            | Self::User { content }
            | Self::Assistant { content, .. }
            | Self::Tool { content, .. } => content,
        }
    }

    /// Tool calls carried by an assistant message.
    pub fn tool_calls(&self) -> &[ToolInvocation] {
        match self {
            Self::Assistant { tool_calls, .. } => tool_calls,
            _ => &[],
        }
    }

    /// Drop reasoning text, if any. Returns whether anything was removed.
    pub fn strip_reasoning(&mut self) -> bool {
        match self {
            Self::Assistant { reasoning, .. } => reasoning.take().is_some(),
            _ => false,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tool Invocations
// ─────────────────────────────────────────────────────────────────────────────

/// A finished tool call requested by the model.
///
/// Serializes as `{"id", "type": "function", "function": {"name", "arguments"}}`
/// with `arguments` as a JSON string, the way chat-completions APIs expect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "WireToolCall", from = "WireToolCall")]
pub struct ToolInvocation {
    /// Id assigned by the model; tool results refer back to it.
    pub id: String,
    /// Qualified tool name, `<server>_<tool>`.
    pub name: String,
    /// Parsed arguments. Always an object.
    pub arguments: Value,
}

impl ToolInvocation {
    /// Create a new invocation.
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }

    /// Canonical JSON text of the arguments.
    pub fn arguments_json(&self) -> String {
        self.arguments.to_string()
    }
}

#[derive(Serialize, Deserialize)]
struct WireToolCall {
    id: String,
    #[serde(rename = "type", default = "function_type")]
    call_type: String,
    function: WireFunctionCall,
}

#[derive(Serialize, Deserialize)]
struct WireFunctionCall {
    name: String,
    #[serde(default)]
    arguments: String,
}

fn function_type() -> String {
    "function".to_string()
}

impl From<ToolInvocation> for WireToolCall {
    fn from(call: ToolInvocation) -> Self {
        Self {
            id: call.id,
            call_type: function_type(),
            function: WireFunctionCall {
                name: call.name,
                arguments: call.arguments.to_string(),
            },
        }
    }
}

impl From<WireToolCall> for ToolInvocation {
    fn from(wire: WireToolCall) -> Self {
        let arguments = serde_json::from_str::<Value>(&wire.function.arguments)
            .ok()
            .filter(Value::is_object)
            .unwrap_or_else(|| Value::Object(Default::default()));
        Self {
            id: wire.id,
            name: wire.function.name,
            arguments,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tool Catalog
// ─────────────────────────────────────────────────────────────────────────────

/// A callable function offered to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Qualified name, `<server>_<tool>`.
    pub name: String,
    /// What the tool does.
    pub description: String,
    /// JSON Schema of the arguments.
    pub parameters: Value,
}

impl ToolDefinition {
    /// Create a new tool definition.
    pub fn new(name: impl Into<String>, description: impl Into<String>, parameters: Value) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Requests and Turns
// ─────────────────────────────────────────────────────────────────────────────

/// Everything a backend needs to produce the next turn.
#[derive(Debug, Clone, Default)]
pub struct ModelRequest {
    /// Full conversation history.
    pub messages: Vec<Message>,
    /// Functions the model may call.
    pub tools: Vec<ToolDefinition>,
}

impl ModelRequest {
    /// Create a new request.
    pub fn new(messages: Vec<Message>, tools: Vec<ToolDefinition>) -> Self {
        Self { messages, tools }
    }
}

/// One complete model turn.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelTurn {
    /// Full assistant text.
    pub text: String,
    /// Finished tool calls, in slot order.
    pub invocations: Vec<ToolInvocation>,
    /// Reasoning text, for models that produce it.
    pub reasoning: Option<String>,
}

impl ModelTurn {
    /// A text-only turn.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }

    /// Add a tool call to the turn.
    pub fn with_invocation(mut self, invocation: ToolInvocation) -> Self {
        self.invocations.push(invocation);
        self
    }

    /// Whether the model asked for any tools.
    pub fn has_invocations(&self) -> bool {
        !self.invocations.is_empty()
    }

    /// The assistant message recording this turn.
    pub fn to_message(&self) -> Message {
        Message::Assistant {
            content: self.text.clone(),
            tool_calls: self.invocations.clone(),
            reasoning: self.reasoning.clone(),
        }
    }
}
