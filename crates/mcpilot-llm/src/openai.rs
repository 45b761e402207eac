//! OpenAI-compatible chat-completions backend.
//!
//! Defaults target DeepSeek's reasoning model, but any service speaking the
//! `/chat/completions` dialect with function calling works.

use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use eventsource_stream::Eventsource;
use futures::{Stream, StreamExt};
use reqwest::{Client, Response, header};
use serde::{Deserialize, Serialize};

use crate::assembler::{ToolCallFragment, TurnAccumulator};
use crate::backend::{ModelBackend, SharedBackend, StreamEvent, TurnStream, with_retry};
use crate::error::{LlmError, Result, parse_retry_after};
use crate::types::{Message, ModelRequest, ModelTurn, ToolDefinition, ToolInvocation};

/// Default DeepSeek API base URL.
pub const DEFAULT_BASE_URL: &str = "https://api.deepseek.com";

/// Default model.
pub const DEFAULT_MODEL: &str = "deepseek-reasoner";

/// Default timeout for requests.
const DEFAULT_TIMEOUT_SECS: u64 = 300;

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Configuration for the OpenAI-compatible backend.
#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    /// API key for authentication.
    pub api_key: Option<String>,

    /// Base URL for the API, without the `/chat/completions` suffix.
    pub base_url: String,

    /// Model to request.
    pub model: String,

    /// Request timeout.
    pub timeout: Duration,

    /// Maximum retries for transient errors.
    pub max_retries: u32,

    /// Initial backoff duration for retries.
    pub retry_backoff: Duration,

    /// Name for this backend instance.
    pub name: String,
}

impl OpenAiConfig {
    /// Config for DeepSeek with the default model.
    pub fn deepseek(api_key: impl Into<String>) -> Self {
        Self {
            api_key: Some(api_key.into()),
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            max_retries: 2,
            retry_backoff: Duration::from_millis(500),
            name: "deepseek".to_string(),
        }
    }

    /// Set a custom base URL.
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Set the model.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Set the backend name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set max retries.
    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    /// Set the initial retry backoff.
    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Backend
// ─────────────────────────────────────────────────────────────────────────────

/// OpenAI-compatible API backend.
pub struct OpenAiBackend {
    client: Client,
    config: OpenAiConfig,
}

impl OpenAiBackend {
    /// Create a backend with the given configuration.
    pub fn new(config: OpenAiConfig) -> Result<Self> {
        if config.api_key.as_deref().is_none_or(str::is_empty) {
            return Err(LlmError::Config("API key is not set".to_string()));
        }

        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| LlmError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client, config })
    }

    /// The configuration in use.
    pub fn config(&self) -> &OpenAiConfig {
        &self.config
    }

    fn completions_url(&self) -> String {
        format!(
            "{}/chat/completions",
            self.config.base_url.trim_end_matches('/')
        )
    }

    fn add_headers(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let builder = builder.header(header::CONTENT_TYPE, "application/json");

        if let Some(ref api_key) = self.config.api_key {
            builder.header(header::AUTHORIZATION, format!("Bearer {}", api_key))
        } else {
            builder
        }
    }

    fn to_chat_request(&self, request: &ModelRequest, stream: bool) -> ChatRequest {
        // Reasoning is output-only; providers reject it on input.
        let messages = request
            .messages
            .iter()
            .cloned()
            .map(|mut m| {
                m.strip_reasoning();
                m
            })
            .collect();

        let tools: Vec<ChatTool> = request.tools.iter().map(ChatTool::from).collect();
        let tool_choice = (!tools.is_empty()).then_some("auto");

        ChatRequest {
            model: self.config.model.clone(),
            messages,
            tools,
            tool_choice,
            stream,
        }
    }

    async fn send(&self, body: &ChatRequest) -> Result<Response> {
        let response = self
            .add_headers(self.client.post(self.completions_url()))
            .json(body)
            .send()
            .await?;

        if response.status().is_success() {
            Ok(response)
        } else {
            Err(Self::handle_error_response(response).await)
        }
    }

    async fn handle_response(response: Response) -> Result<ModelTurn> {
        let body = response.text().await?;
        let parsed: ChatResponse =
            serde_json::from_str(&body).map_err(|e| LlmError::Serialization(e.to_string()))?;
        parsed.into_turn()
    }

    async fn handle_error_response(response: Response) -> LlmError {
        let status = response.status();
        let retry_after = response
            .headers()
            .get(header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_retry_after);
        let body = response.text().await.unwrap_or_default();

        let message = serde_json::from_str::<ErrorResponse>(&body)
            .map(|e| e.error.message)
            .unwrap_or_else(|_| format!("HTTP {}: {}", status, body));

        match status.as_u16() {
            401 | 403 => LlmError::Auth(message),
            429 => LlmError::rate_limit(message, retry_after),
            500..=599 => LlmError::Backend(format!("Server error: {}", message)),
            _ => LlmError::Backend(message),
        }
    }
}

#[async_trait]
impl ModelBackend for OpenAiBackend {
    async fn complete(&self, request: &ModelRequest) -> Result<ModelTurn> {
        let body = self.to_chat_request(request, false);

        tracing::debug!(
            backend = %self.config.name,
            model = %body.model,
            messages = body.messages.len(),
            tools = body.tools.len(),
            "Sending chat completion request"
        );

        with_retry(
            self.config.max_retries,
            self.config.retry_backoff,
            &self.config.name,
            || async {
                let response = self.send(&body).await?;
                Self::handle_response(response).await
            },
        )
        .await
    }

    async fn complete_stream(&self, request: &ModelRequest) -> Result<TurnStream> {
        let body = self.to_chat_request(request, true);

        tracing::debug!(
            backend = %self.config.name,
            model = %body.model,
            messages = body.messages.len(),
            tools = body.tools.len(),
            "Sending streaming chat completion request"
        );

        // Only the connection is retried; a stream that breaks midway is
        // reported to the caller.
        let response = with_retry(
            self.config.max_retries,
            self.config.retry_backoff,
            &self.config.name,
            || self.send(&body),
        )
        .await?;

        Ok(parse_sse_stream(response.bytes_stream()))
    }

    fn name(&self) -> &str {
        &self.config.name
    }
}

/// Create a shared OpenAI-compatible backend.
pub fn create_shared_backend(config: OpenAiConfig) -> Result<SharedBackend> {
    Ok(Arc::new(OpenAiBackend::new(config)?))
}

// ─────────────────────────────────────────────────────────────────────────────
// API Types
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<Message>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<ChatTool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<&'static str>,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct ChatTool {
    #[serde(rename = "type")]
    tool_type: &'static str,
    function: ToolDefinition,
}

impl From<&ToolDefinition> for ChatTool {
    fn from(def: &ToolDefinition) -> Self {
        Self {
            tool_type: "function",
            function: def.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

impl ChatResponse {
    fn into_turn(self) -> Result<ModelTurn> {
        let choice = self
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::InvalidResponse("response has no choices".to_string()))?;

        Ok(ModelTurn {
            text: choice.message.content.unwrap_or_default(),
            invocations: choice.message.tool_calls.unwrap_or_default(),
            reasoning: choice.message.reasoning_content.filter(|r| !r.is_empty()),
        })
    }
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
    reasoning_content: Option<String>,
    tool_calls: Option<Vec<ToolInvocation>>,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

// ─────────────────────────────────────────────────────────────────────────────
// SSE Streaming
// ─────────────────────────────────────────────────────────────────────────────

fn parse_sse_stream(
    byte_stream: impl Stream<Item = reqwest::Result<Bytes>> + Send + 'static,
) -> TurnStream {
    let events = byte_stream
        .eventsource()
        .map(|event| event.map(|e| e.data).map_err(|e| e.to_string()));

    Box::pin(futures::stream::unfold(
        SseState {
            events: Box::pin(events),
            pending: VecDeque::new(),
            turn: Some(TurnAccumulator::new()),
            finished: false,
        },
        |mut state| async move {
            loop {
                if let Some(event) = state.pending.pop_front() {
                    return Some((event, state));
                }
                if state.finished {
                    return None;
                }

                match state.events.next().await {
                    Some(Ok(data)) => state.handle_data(&data),
                    Some(Err(e)) => {
                        state.finished = true;
                        state.pending.push_back(Err(LlmError::Network(e)));
                    }
                    None => {
                        state.finish_turn();
                        state.finished = true;
                    }
                }
            }
        },
    ))
}

struct SseState {
    events: Pin<Box<dyn Stream<Item = std::result::Result<String, String>> + Send>>,
    pending: VecDeque<Result<StreamEvent>>,
    turn: Option<TurnAccumulator>,
    finished: bool,
}

impl SseState {
    fn handle_data(&mut self, data: &str) {
        let data = data.trim();
        if data.is_empty() {
            return;
        }
        if data == "[DONE]" {
            self.finish_turn();
            self.finished = true;
            return;
        }

        let chunk = match serde_json::from_str::<StreamChunk>(data) {
            Ok(chunk) => chunk,
            Err(e) => {
                tracing::debug!(error = %e, "skipping unparseable stream chunk");
                return;
            }
        };
        let Some(choice) = chunk.choices.into_iter().next() else {
            return;
        };

        if let Some(delta) = choice.delta {
            self.handle_delta(delta);
        }
        if choice.finish_reason.is_some() {
            self.finish_turn();
        }
    }

    fn handle_delta(&mut self, delta: StreamDelta) {
        // Chunks arriving after the turn finished are ignored.
        let Some(turn) = self.turn.as_mut() else {
            return;
        };

        if let Some(reasoning) = delta.reasoning_content.filter(|r| !r.is_empty()) {
            turn.push_reasoning(&reasoning);
            self.pending
                .push_back(Ok(StreamEvent::ReasoningDelta(reasoning)));
        }
        if let Some(content) = delta.content.filter(|c| !c.is_empty()) {
            turn.push_text(&content);
            self.pending.push_back(Ok(StreamEvent::TextDelta(content)));
        }
        for call in delta.tool_calls.unwrap_or_default() {
            let (name, arguments) = call
                .function
                .map(|f| (f.name, f.arguments))
                .unwrap_or_default();
            let fragment = ToolCallFragment {
                index: call.index.unwrap_or(0),
                id: call.id,
                name,
                arguments,
            };
            turn.push_fragment(&fragment);
            self.pending
                .push_back(Ok(StreamEvent::ToolCallDelta(fragment)));
        }
    }

    fn finish_turn(&mut self) {
        if let Some(turn) = self.turn.take() {
            self.pending.push_back(Ok(StreamEvent::Done(turn.finish())));
        }
    }
}

#[derive(Debug, Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    delta: Option<StreamDelta>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamDelta {
    content: Option<String>,
    reasoning_content: Option<String>,
    tool_calls: Option<Vec<StreamToolCall>>,
}

#[derive(Debug, Deserialize)]
struct StreamToolCall {
    index: Option<usize>,
    id: Option<String>,
    function: Option<StreamFunction>,
}

#[derive(Debug, Deserialize)]
struct StreamFunction {
    name: Option<String>,
    arguments: Option<String>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
