//! The conversation loop.
//!
//! [`Agent`] keeps the history, asks the model for the next turn, runs any
//! tool calls through the [`ToolDispatcher`], and repeats until the model
//! answers without calling a tool.

use std::path::PathBuf;
use std::sync::Arc;

use futures::StreamExt;

use mcpilot_llm::{
    Message, ModelRequest, ModelTurn, SharedBackend, StreamEvent, ToolDefinition, TurnAccumulator,
};
use mcpilot_mcp::{ClientTimeouts, McpManager, StdioServerConfig};

use crate::conversation::{Conversation, DEFAULT_SYSTEM_PROMPT};
use crate::dispatcher::{SharedToolServer, ToolDispatcher};
use crate::error::{AgentError, Result};
use crate::stream::{AgentStream, ForwardedText, StreamChunk};
use crate::transcript::append_transcript;

// ─────────────────────────────────────────────────────────────────────────────
// Options and Outcome
// ─────────────────────────────────────────────────────────────────────────────

/// Agent settings.
#[derive(Debug, Clone)]
pub struct AgentOptions {
    /// First message of every conversation.
    pub system_prompt: String,
    /// Where to append the transcript on shutdown.
    pub transcript_path: Option<PathBuf>,
    /// Upper bound on model turns per query.
    pub max_iterations: Option<u32>,
    /// Timeouts for tool server requests.
    pub timeouts: ClientTimeouts,
}

impl Default for AgentOptions {
    fn default() -> Self {
        Self {
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            transcript_path: None,
            max_iterations: None,
            timeouts: ClientTimeouts::default(),
        }
    }
}

impl AgentOptions {
    /// Set the system prompt.
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    /// Set the transcript file.
    pub fn with_transcript_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.transcript_path = Some(path.into());
        self
    }

    /// Set the iteration limit.
    pub fn with_max_iterations(mut self, max: u32) -> Self {
        self.max_iterations = Some(max);
        self
    }

    /// Set tool server timeouts.
    pub fn with_timeouts(mut self, timeouts: ClientTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }
}

/// How a query ended.
#[derive(Debug)]
pub enum AgentOutcome {
    /// The model gave a final answer.
    Completed { text: String },
    /// Something failed; `text` is the best answer available.
    Degraded { text: String, cause: AgentError },
}

impl AgentOutcome {
    /// The answer text.
    pub fn text(&self) -> &str {
        match self {
            Self::Completed { text } | Self::Degraded { text, .. } => text,
        }
    }

    /// Whether the query ended early.
    pub fn is_degraded(&self) -> bool {
        matches!(self, Self::Degraded { .. })
    }

    /// Why the query ended early.
    pub fn cause(&self) -> Option<&AgentError> {
        match self {
            Self::Completed { .. } => None,
            Self::Degraded { cause, .. } => Some(cause),
        }
    }

    /// Take the answer text.
    pub fn into_text(self) -> String {
        match self {
            Self::Completed { text } | Self::Degraded { text, .. } => text,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Agent
// ─────────────────────────────────────────────────────────────────────────────

/// A model plus a set of tool servers, with one running conversation.
pub struct Agent {
    backend: SharedBackend,
    dispatcher: ToolDispatcher,
    catalog: Vec<ToolDefinition>,
    conversation: Conversation,
    options: AgentOptions,
    closed: bool,
}

impl Agent {
    /// Create an agent over servers that are already running.
    pub fn new(servers: Vec<SharedToolServer>, backend: SharedBackend, options: AgentOptions) -> Self {
        let dispatcher = ToolDispatcher::new(servers);
        let catalog = dispatcher.catalog();
        let conversation = Conversation::new(options.system_prompt.clone());

        tracing::info!(
            backend = backend.name(),
            servers = dispatcher.servers().len(),
            tools = catalog.len(),
            "agent ready"
        );

        Self {
            backend,
            dispatcher,
            catalog,
            conversation,
            options,
            closed: false,
        }
    }

    /// Start every configured server and build an agent over the ones that
    /// came up.
    pub async fn connect(
        servers: Vec<StdioServerConfig>,
        backend: SharedBackend,
        options: AgentOptions,
    ) -> Result<Self> {
        let mut manager = McpManager::with_configs(servers).with_timeouts(options.timeouts);
        if manager.connect_all().await == 0 {
            return Err(AgentError::NoServers);
        }

        let servers = manager
            .clients()
            .iter()
            .map(|client| Arc::clone(client) as SharedToolServer)
            .collect();
        Ok(Self::new(servers, backend, options))
    }

    /// The conversation so far.
    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    /// The function catalog offered to the model.
    pub fn catalog(&self) -> &[ToolDefinition] {
        &self.catalog
    }

    /// The tool dispatcher.
    pub fn dispatcher(&self) -> &ToolDispatcher {
        &self.dispatcher
    }

    /// The agent settings.
    pub fn options(&self) -> &AgentOptions {
        &self.options
    }

    fn next_request(&mut self) -> ModelRequest {
        let stripped = self.conversation.strip_reasoning();
        if stripped > 0 {
            tracing::trace!(stripped, "removed reasoning from history");
        }
        ModelRequest::new(self.conversation.messages().to_vec(), self.catalog.clone())
    }

    fn over_limit(&self, iteration: u32) -> Option<AgentError> {
        self.options
            .max_iterations
            .filter(|max| iteration > *max)
            .map(AgentError::MaxIterations)
    }

    /// Answer one query without streaming.
    ///
    /// The answer is the text of the last model turn. Never fails: errors
    /// end the loop early and come back as [`AgentOutcome::Degraded`].
    pub async fn prompt(&mut self, query: &str) -> AgentOutcome {
        self.conversation.push(Message::user(query));
        let mut last_text = String::new();
        let mut iteration = 0u32;

        loop {
            iteration += 1;
            if let Some(cause) = self.over_limit(iteration) {
                tracing::warn!(iteration, "iteration limit reached");
                return AgentOutcome::Degraded {
                    text: last_text,
                    cause,
                };
            }

            let request = self.next_request();
            tracing::debug!(
                iteration,
                messages = request.messages.len(),
                tools = request.tools.len(),
                "calling model"
            );

            let turn = match self.backend.complete(&request).await {
                Ok(turn) => turn,
                Err(e) => {
                    let cause = AgentError::from(e);
                    tracing::error!(iteration, error = %cause, "model call failed");
                    return AgentOutcome::Degraded {
                        text: cause.to_string(),
                        cause,
                    };
                }
            };

            last_text.clone_from(&turn.text);
            self.conversation.push(turn.to_message());

            if !turn.has_invocations() {
                tracing::info!(iterations = iteration, "query complete");
                return AgentOutcome::Completed { text: last_text };
            }

            self.run_tools(&turn).await;
        }
    }

    async fn run_tools(&mut self, turn: &ModelTurn) {
        // Sequential: history order must match invocation order.
        for invocation in &turn.invocations {
            let reply = self.dispatcher.dispatch(invocation).await;
            self.conversation.push(reply.to_message());
        }
    }

    /// Answer one query, streaming text and tool activity as it happens.
    ///
    /// The stream always ends with [`StreamChunk::Done`] or
    /// [`StreamChunk::Error`].
    pub fn prompt_stream<'a>(&'a mut self, query: &str) -> AgentStream<'a> {
        self.conversation.push(Message::user(query));
        let agent = self;

        Box::pin(async_stream::stream! {
            let mut iteration = 0u32;

            loop {
                iteration += 1;
                if let Some(cause) = agent.over_limit(iteration) {
                    tracing::warn!(iteration, "iteration limit reached");
                    yield StreamChunk::error(cause.to_string());
                    return;
                }

                let request = agent.next_request();
                tracing::debug!(
                    iteration,
                    messages = request.messages.len(),
                    tools = request.tools.len(),
                    "calling model (streaming)"
                );

                let mut events = match agent.backend.complete_stream(&request).await {
                    Ok(events) => events,
                    Err(e) => {
                        let cause = AgentError::from(e);
                        tracing::error!(iteration, error = %cause, "model call failed");
                        yield StreamChunk::error(cause.to_string());
                        return;
                    }
                };

                let mut forwarded = ForwardedText::default();
                let mut partial = TurnAccumulator::new();
                let mut finished: Option<ModelTurn> = None;

                while let Some(event) = events.next().await {
                    match event {
                        Ok(StreamEvent::TextDelta(delta)) => {
                            forwarded.forward(&delta);
                            partial.push_text(&delta);
                            yield StreamChunk::text(delta);
                        }
                        Ok(StreamEvent::ReasoningDelta(delta)) => partial.push_reasoning(&delta),
                        Ok(StreamEvent::ToolCallDelta(fragment)) => partial.push_fragment(&fragment),
                        Ok(StreamEvent::Done(turn)) => {
                            finished = Some(turn);
                            break;
                        }
                        Err(e) => {
                            let cause = AgentError::Stream(e.to_string());
                            tracing::error!(iteration, error = %cause, "model stream failed");
                            yield StreamChunk::error(cause.to_string());
                            return;
                        }
                    }
                }

                // A stream that ends without Done still yields whatever was
                // assembled from its deltas.
                let turn = finished.unwrap_or_else(|| partial.finish());
                if let Some(rest) = forwarded.remainder(&turn.text) {
                    yield StreamChunk::text(rest);
                }
                agent.conversation.push(turn.to_message());

                if !turn.has_invocations() {
                    tracing::info!(iterations = iteration, "query complete");
                    yield StreamChunk::done(iteration);
                    return;
                }

                for invocation in &turn.invocations {
                    yield StreamChunk::tool_start(&invocation.id, &invocation.name);
                    let reply = agent.dispatcher.dispatch(invocation).await;
                    yield StreamChunk::tool_end(&reply.call_id, reply.success, reply.content());
                    agent.conversation.push(reply.to_message());
                }
            }
        })
    }

    /// Write the transcript, if configured, and stop every server.
    ///
    /// Only the first call does anything.
    pub async fn shutdown(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;

        if let Some(path) = &self.options.transcript_path
            && let Err(e) = append_transcript(path, self.conversation.messages(), &self.catalog)
        {
            tracing::warn!(path = %path.display(), error = %e, "could not write transcript");
        }

        self.dispatcher.shutdown().await;
        tracing::info!("agent shut down");
    }
}

impl std::fmt::Debug for Agent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Agent")
            .field("backend", &self.backend.name())
            .field("dispatcher", &self.dispatcher)
            .field("messages", &self.conversation.len())
            .field("options", &self.options)
            .finish()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
