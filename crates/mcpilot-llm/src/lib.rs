//! Model access for mcpilot.
//!
//! This crate owns the conversation types, the [`ModelBackend`] trait, the
//! OpenAI-compatible HTTP backend, and the assembler that rebuilds tool calls
//! from streamed fragments.
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │  ModelBackend trait                     │
//! │  - complete() -> ModelTurn              │
//! │  - complete_stream() -> TurnStream      │
//! └─────────────────────────────────────────┘
//!          │                      │
//!          ▼                      ▼
//!   ┌─────────────┐        ┌─────────────┐
//!   │OpenAiBackend│        │ MockBackend │
//!   └─────────────┘        └─────────────┘
//!          │                      │
//!          └──────► TurnAccumulator ◄───┘
//!                  (ArgumentAssembler)
//! ```

pub mod assembler;
pub mod backend;
pub mod error;
pub mod openai;
pub mod types;

pub use assembler::{
    ArgumentAssembler, ToolCallFragment, TurnAccumulator, append_arguments, parse_arguments,
};
pub use backend::{
    MockBackend, MockResponse, ModelBackend, SharedBackend, StreamEvent, TurnStream, with_retry,
};
pub use error::{LlmError, Result};
pub use openai::{OpenAiBackend, OpenAiConfig, create_shared_backend};
pub use types::{Message, ModelRequest, ModelTurn, ToolDefinition, ToolInvocation};
