//! Reassembly of streamed tool calls.
//!
//! Chat-completions streams deliver each tool call as a series of deltas
//! keyed by a slot index: the id and name usually come first, the JSON
//! arguments trickle in split at arbitrary character boundaries.
//! [`ArgumentAssembler`] collects those deltas per slot and turns them into
//! [`ToolInvocation`]s once the turn ends.
//!
//! Argument reassembly is edge-based, not a JSON parser: a fragment opening
//! with `{` starts the object, a fragment closing with `}` is dropped if the
//! text already ends with one, anything else is appended. Finalization then
//! applies one repair pass and falls back to `{}`. Arguments whose nested
//! objects close across separate fragments can be mangled by this; see
//! DESIGN.md.

use serde_json::{Map, Value};

use crate::types::{ModelTurn, ToolInvocation};

/// One streamed delta for a tool call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolCallFragment {
    /// Which concurrent call in this turn the delta belongs to.
    pub index: usize,
    /// Call id, usually only on the first delta.
    pub id: Option<String>,
    /// Piece of the tool name.
    pub name: Option<String>,
    /// Piece of the JSON arguments text.
    pub arguments: Option<String>,
}

impl ToolCallFragment {
    /// Fragment that opens slot `index` with an id and a name.
    pub fn start(index: usize, id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            index,
            id: Some(id.into()),
            name: Some(name.into()),
            arguments: None,
        }
    }

    /// Fragment carrying only arguments text for slot `index`.
    pub fn args(index: usize, arguments: impl Into<String>) -> Self {
        Self {
            index,
            arguments: Some(arguments.into()),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Default)]
struct PartialCall {
    id: String,
    name: String,
    arguments: String,
}

/// Collects [`ToolCallFragment`]s for one turn.
#[derive(Debug, Clone, Default)]
pub struct ArgumentAssembler {
    slots: Vec<PartialCall>,
}

impl ArgumentAssembler {
    /// Create an empty assembler.
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one fragment.
    pub fn push(&mut self, fragment: &ToolCallFragment) {
        if fragment.index >= self.slots.len() {
            self.slots
                .resize_with(fragment.index + 1, PartialCall::default);
        }
        let slot = &mut self.slots[fragment.index];

        if let Some(id) = fragment.id.as_deref().filter(|id| !id.is_empty()) {
            slot.id = id.to_string();
        }
        if let Some(name) = fragment.name.as_deref() {
            slot.name.push_str(name);
        }
        if let Some(args) = fragment.arguments.as_deref().filter(|a| !a.is_empty()) {
            append_arguments(&mut slot.arguments, args);
        }
    }

    /// Number of slots seen so far, finished or not.
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// Finished invocations, in slot order.
    ///
    /// Slots that never received both an id and a name are dropped; streams
    /// sometimes open placeholder slots they never fill.
    pub fn finish(self) -> Vec<ToolInvocation> {
        self.slots
            .into_iter()
            .filter(|slot| !slot.id.is_empty() && !slot.name.is_empty())
            .map(|slot| {
                let arguments = parse_arguments(&slot.arguments);
                ToolInvocation {
                    id: slot.id,
                    name: slot.name,
                    arguments,
                }
            })
            .collect()
    }
}

/// Append one arguments fragment to the accumulated text.
pub fn append_arguments(acc: &mut String, fragment: &str) {
    if fragment.starts_with('{') && acc.is_empty() {
        acc.push_str(fragment);
    } else if fragment.ends_with('}') && !acc.is_empty() {
        // A second closing fragment repeats the end of the object.
        if !acc.ends_with('}') {
            acc.push_str(fragment);
        }
    } else {
        acc.push_str(fragment);
    }
}

/// Parse accumulated arguments text into a JSON object.
///
/// Empty text is `{}`. Text that does not parse gets one repair attempt
/// (trailing commas stripped, braces added where missing); if that also
/// fails the result is `{}`.
pub fn parse_arguments(raw: &str) -> Value {
    let text = raw.trim();
    if text.is_empty() {
        return empty_object();
    }
    if let Some(value) = parse_object(text) {
        return value;
    }

    let mut repaired = text.trim_end_matches(',').to_string();
    if !repaired.starts_with('{') {
        repaired.insert(0, '{');
    }
    if !repaired.ends_with('}') {
        repaired.push('}');
    }

    match parse_object(&repaired) {
        Some(value) => {
            tracing::debug!(raw = %text, "repaired tool call arguments");
            value
        }
        None => {
            tracing::warn!(raw = %text, "unparseable tool call arguments, using {{}}");
            empty_object()
        }
    }
}

fn parse_object(text: &str) -> Option<Value> {
    serde_json::from_str::<Value>(text)
        .ok()
        .filter(Value::is_object)
}

fn empty_object() -> Value {
    Value::Object(Map::new())
}

/// Builds a [`ModelTurn`] out of streamed pieces.
#[derive(Debug, Clone, Default)]
pub struct TurnAccumulator {
    text: String,
    reasoning: String,
    assembler: ArgumentAssembler,
}

impl TurnAccumulator {
    /// Create an empty accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add assistant text.
    pub fn push_text(&mut self, delta: &str) {
        self.text.push_str(delta);
    }

    /// Add reasoning text.
    pub fn push_reasoning(&mut self, delta: &str) {
        self.reasoning.push_str(delta);
    }

    /// Add a tool call fragment.
    pub fn push_fragment(&mut self, fragment: &ToolCallFragment) {
        self.assembler.push(fragment);
    }

    /// Text received so far.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// The complete turn.
    pub fn finish(self) -> ModelTurn {
        ModelTurn {
            text: self.text,
            invocations: self.assembler.finish(),
            reasoning: (!self.reasoning.is_empty()).then_some(self.reasoning),
        }
    }
}
