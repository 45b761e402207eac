//! Model backend trait and the scripted mock used in tests.

use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::Stream;
use parking_lot::Mutex;

use crate::assembler::{ToolCallFragment, TurnAccumulator};
use crate::error::{LlmError, Result};
use crate::types::{ModelRequest, ModelTurn};

// ─────────────────────────────────────────────────────────────────────────────
// Shared Retry Logic
// ─────────────────────────────────────────────────────────────────────────────

/// Execute an async operation with exponential backoff retry.
///
/// Retries only on transient errors. A `Retry-After` hint from the provider
/// replaces the computed backoff for that attempt.
pub async fn with_retry<F, Fut, T>(
    max_retries: u32,
    initial_backoff: Duration,
    backend_name: &str,
    mut f: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let mut backoff = initial_backoff;
    let mut attempt = 0;

    loop {
        match f().await {
            Ok(result) => return Ok(result),
            Err(e) if !e.is_retryable() || attempt >= max_retries => return Err(e),
            Err(e) => {
                let wait = e.retry_after().unwrap_or(backoff);
                attempt += 1;
                tracing::warn!(
                    backend = backend_name,
                    attempt,
                    max_retries,
                    backoff_ms = wait.as_millis() as u64,
                    error = %e,
                    "Request failed, retrying"
                );
                tokio::time::sleep(wait).await;
                backoff *= 2;
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Streaming Types
// ─────────────────────────────────────────────────────────────────────────────

/// A streamed model turn.
pub type TurnStream = Pin<Box<dyn Stream<Item = Result<StreamEvent>> + Send + 'static>>;

/// Events emitted while a turn streams in.
///
/// A well-formed stream ends with exactly one [`StreamEvent::Done`] whose
/// turn carries the full text and the assembled tool calls.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// A piece of assistant text.
    TextDelta(String),
    /// A piece of reasoning text.
    ReasoningDelta(String),
    /// A piece of a tool call.
    ToolCallDelta(ToolCallFragment),
    /// The turn is complete.
    Done(ModelTurn),
}

// ─────────────────────────────────────────────────────────────────────────────
// Model Backend Trait
// ─────────────────────────────────────────────────────────────────────────────

/// A language model that can take a conversation plus a tool catalog and
/// produce the next assistant turn.
#[async_trait]
pub trait ModelBackend: Send + Sync {
    /// Produce the whole turn at once.
    async fn complete(&self, request: &ModelRequest) -> Result<ModelTurn>;

    /// Produce the turn as a stream of events ending in `Done`.
    async fn complete_stream(&self, request: &ModelRequest) -> Result<TurnStream>;

    /// Get the name of this backend.
    fn name(&self) -> &str;
}

/// A backend that can be shared across tasks.
pub type SharedBackend = Arc<dyn ModelBackend>;

// ─────────────────────────────────────────────────────────────────────────────
// Mock Backend
// ─────────────────────────────────────────────────────────────────────────────

/// One scripted reply for [`MockBackend`].
#[derive(Debug, Clone)]
pub enum MockResponse {
    /// A finished turn. Streaming splits its text and tool calls into chunks.
    Turn(ModelTurn),
    /// Raw streamed pieces, run through the tool-call assembler to build
    /// the final turn.
    Fragments {
        text: Vec<String>,
        tool_calls: Vec<ToolCallFragment>,
    },
    /// Fail the request outright.
    Error(String),
    /// Stream some text, then fail mid-stream.
    BrokenStream { text: Vec<String>, error: String },
}

impl From<ModelTurn> for MockResponse {
    fn from(turn: ModelTurn) -> Self {
        Self::Turn(turn)
    }
}

/// A backend that replays scripted responses in order.
///
/// Every request is recorded so tests can inspect what the model was sent.
#[derive(Debug)]
pub struct MockBackend {
    name: String,
    chunk_size: usize,
    responses: Mutex<Vec<MockResponse>>,
    request_log: Mutex<Vec<ModelRequest>>,
}

impl MockBackend {
    /// Create a mock backend with the given responses.
    ///
    /// If more requests arrive than responses were scripted, the extra
    /// requests fail.
    pub fn new(responses: Vec<MockResponse>) -> Self {
        Self {
            name: "mock".to_string(),
            chunk_size: 4,
            responses: Mutex::new(responses),
            request_log: Mutex::new(Vec::new()),
        }
    }

    /// Create a mock backend from plain turns.
    pub fn with_turns(turns: Vec<ModelTurn>) -> Self {
        Self::new(turns.into_iter().map(MockResponse::Turn).collect())
    }

    /// Create a mock backend with a single text response.
    pub fn with_text(text: impl Into<String>) -> Self {
        Self::with_turns(vec![ModelTurn::text(text)])
    }

    /// Streamed text and arguments are cut into pieces of this many chars.
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Get all requests that were made to this backend.
    pub fn requests(&self) -> Vec<ModelRequest> {
        self.request_log.lock().clone()
    }

    /// Get the number of requests made.
    pub fn request_count(&self) -> usize {
        self.request_log.lock().len()
    }

    fn next_response(&self, request: &ModelRequest) -> Result<MockResponse> {
        self.request_log.lock().push(request.clone());
        let mut responses = self.responses.lock();
        if responses.is_empty() {
            return Err(LlmError::Internal(
                "MockBackend: no more responses available".to_string(),
            ));
        }
        Ok(responses.remove(0))
    }

    fn stream_turn(&self, turn: ModelTurn) -> Vec<Result<StreamEvent>> {
        let mut events: Vec<Result<StreamEvent>> = chunk(&turn.text, self.chunk_size)
            .into_iter()
            .map(|piece| Ok(StreamEvent::TextDelta(piece)))
            .collect();

        for (index, call) in turn.invocations.iter().enumerate() {
            events.push(Ok(StreamEvent::ToolCallDelta(ToolCallFragment::start(
                index, &call.id, &call.name,
            ))));
            for piece in chunk(&call.arguments_json(), self.chunk_size) {
                events.push(Ok(StreamEvent::ToolCallDelta(ToolCallFragment::args(
                    index, piece,
                ))));
            }
        }

        events.push(Ok(StreamEvent::Done(turn)));
        events
    }
}

fn chunk(text: &str, size: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    chars.chunks(size).map(|c| c.iter().collect()).collect()
}

fn accumulate(text: &[String], tool_calls: &[ToolCallFragment]) -> ModelTurn {
    let mut acc = TurnAccumulator::new();
    for piece in text {
        acc.push_text(piece);
    }
    for fragment in tool_calls {
        acc.push_fragment(fragment);
    }
    acc.finish()
}

#[async_trait]
impl ModelBackend for MockBackend {
    async fn complete(&self, request: &ModelRequest) -> Result<ModelTurn> {
        match self.next_response(request)? {
            MockResponse::Turn(turn) => Ok(turn),
            MockResponse::Fragments { text, tool_calls } => Ok(accumulate(&text, &tool_calls)),
            MockResponse::Error(message) | MockResponse::BrokenStream { error: message, .. } => {
                Err(LlmError::Backend(message))
            }
        }
    }

    async fn complete_stream(&self, request: &ModelRequest) -> Result<TurnStream> {
        let events = match self.next_response(request)? {
            MockResponse::Turn(turn) => self.stream_turn(turn),
            MockResponse::Fragments { text, tool_calls } => {
                let turn = accumulate(&text, &tool_calls);
                text.into_iter()
                    .map(|t| Ok(StreamEvent::TextDelta(t)))
                    .chain(
                        tool_calls
                            .into_iter()
                            .map(|f| Ok(StreamEvent::ToolCallDelta(f))),
                    )
                    .chain(std::iter::once(Ok(StreamEvent::Done(turn))))
                    .collect()
            }
            MockResponse::Error(message) => return Err(LlmError::Backend(message)),
            MockResponse::BrokenStream { text, error } => text
                .into_iter()
                .map(|t| Ok(StreamEvent::TextDelta(t)))
                .chain(std::iter::once(Err(LlmError::Network(error))))
                .collect(),
        };

        Ok(Box::pin(futures::stream::iter(events)))
    }

    fn name(&self) -> &str {
        &self.name
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
