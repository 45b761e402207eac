//! Conversation history.

use mcpilot_llm::Message;

/// Default system prompt.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful assistant.";

/// Ordered message history for one agent.
///
/// Append-only; the one exception is [`Conversation::strip_reasoning`].
#[derive(Debug, Clone, Default)]
pub struct Conversation {
    messages: Vec<Message>,
}

impl Conversation {
    /// A conversation seeded with a system prompt.
    pub fn new(system_prompt: impl Into<String>) -> Self {
        Self {
            messages: vec![Message::system(system_prompt)],
        }
    }

    /// Append a message.
    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    /// All messages, oldest first.
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Number of messages, including the system prompt.
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Whether the conversation has no messages at all.
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// The most recent message.
    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// Remove reasoning text from every assistant message.
    ///
    /// Returns how many messages were changed.
    pub fn strip_reasoning(&mut self) -> usize {
        self.messages
            .iter_mut()
            .map(Message::strip_reasoning)
            .filter(|stripped| *stripped)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seeded_with_system_prompt() {
        let conv = Conversation::new(DEFAULT_SYSTEM_PROMPT);
        assert_eq!(conv.len(), 1);
        assert_eq!(conv.messages()[0].role(), "system");
        assert_eq!(conv.messages()[0].content(), "You are a helpful assistant.");
    }

    #[test]
    fn test_strip_reasoning_touches_only_assistant_messages() {
        let mut conv = Conversation::new("sys");
        conv.push(Message::user("q"));
        conv.push(Message::Assistant {
            content: "a".into(),
            tool_calls: vec![],
            reasoning: Some("because".into()),
        });
        conv.push(Message::assistant("b"));

        assert_eq!(conv.strip_reasoning(), 1);
        assert_eq!(conv.strip_reasoning(), 0);
        assert_eq!(conv.len(), 4);
        assert_eq!(conv.last().map(Message::content), Some("b"));
    }
}
