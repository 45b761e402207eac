//! Streaming output of an agent turn.

use std::pin::Pin;

use futures::Stream;
use serde::{Deserialize, Serialize};

// ─────────────────────────────────────────────────────────────────────────────
// Stream Chunk
// ─────────────────────────────────────────────────────────────────────────────

/// A chunk emitted while the agent answers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamChunk {
    /// Assistant text, in order.
    Text {
        /// The text delta.
        content: String,
    },
    /// A tool is about to run.
    ToolStart {
        /// Invocation id.
        id: String,
        /// Qualified tool name.
        name: String,
    },
    /// A tool finished.
    ToolEnd {
        /// Invocation id.
        id: String,
        /// Whether the tool succeeded.
        success: bool,
        /// Result payload as JSON text.
        content: String,
    },
    /// The answer is complete.
    Done {
        /// Model turns used.
        iterations: u32,
    },
    /// The answer ended early.
    Error {
        /// Error message.
        message: String,
    },
}

impl StreamChunk {
    /// Create a text chunk.
    pub fn text(content: impl Into<String>) -> Self {
        Self::Text {
            content: content.into(),
        }
    }

    /// Create a tool start chunk.
    pub fn tool_start(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self::ToolStart {
            id: id.into(),
            name: name.into(),
        }
    }

    /// Create a tool end chunk.
    pub fn tool_end(id: impl Into<String>, success: bool, content: impl Into<String>) -> Self {
        Self::ToolEnd {
            id: id.into(),
            success,
            content: content.into(),
        }
    }

    /// Create a done chunk.
    pub fn done(iterations: u32) -> Self {
        Self::Done { iterations }
    }

    /// Create an error chunk.
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    /// Whether this chunk ends the stream.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done { .. } | Self::Error { .. })
    }
}

/// A boxed stream of chunks borrowing the agent.
pub type AgentStream<'a> = Pin<Box<dyn Stream<Item = StreamChunk> + Send + 'a>>;

/// Text forwarded so far for one model turn.
///
/// Deltas are passed through as they arrive; when the finished turn reports
/// its full text, only the part not yet forwarded is released.
#[derive(Debug, Default)]
pub(crate) struct ForwardedText {
    sent: String,
}

impl ForwardedText {
    /// Record a delta on its way to the caller.
    pub(crate) fn forward(&mut self, delta: &str) {
        self.sent.push_str(delta);
    }

    /// The unforwarded tail of `full`, if any.
    ///
    /// Returns `None` when `full` does not extend what was already sent;
    /// resending it would duplicate text.
    pub(crate) fn remainder<'a>(&self, full: &'a str) -> Option<&'a str> {
        full.strip_prefix(self.sent.as_str())
            .filter(|rest| !rest.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_chunk_wire_shape() {
        let chunk = StreamChunk::tool_end("c1", true, "{}");
        assert_eq!(
            serde_json::to_value(&chunk).unwrap(),
            json!({"type": "tool_end", "id": "c1", "success": true, "content": "{}"})
        );
        assert!(StreamChunk::done(1).is_terminal());
        assert!(StreamChunk::error("x").is_terminal());
        assert!(!StreamChunk::text("x").is_terminal());
    }

    #[test]
    fn test_remainder() {
        let mut fwd = ForwardedText::default();
        assert_eq!(fwd.remainder("Hello"), Some("Hello"));

        fwd.forward("Hel");
        assert_eq!(fwd.remainder("Hello"), Some("lo"));

        fwd.forward("lo");
        assert_eq!(fwd.remainder("Hello"), None);
        assert_eq!(fwd.remainder("Goodbye"), None);
    }
}
