//! Append-only JSONL transcript of finished sessions.

use std::io::Write;
use std::path::Path;

use chrono::Utc;
use serde::Serialize;

use mcpilot_llm::{Message, ToolDefinition};

use crate::error::Result;

#[derive(Serialize)]
struct TranscriptEntry<'a> {
    timestamp: String,
    messages: &'a [Message],
    functions: &'a [ToolDefinition],
}

/// Append one line holding the conversation and the tool catalog.
///
/// Parent directories are created as needed.
pub fn append_transcript(
    path: &Path,
    messages: &[Message],
    functions: &[ToolDefinition],
) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    let entry = TranscriptEntry {
        timestamp: Utc::now().to_rfc3339(),
        messages,
        functions,
    };
    let mut line = serde_json::to_string(&entry)?;
    line.push('\n');

    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)?;
    file.write_all(line.as_bytes())?;

    tracing::debug!(path = %path.display(), messages = messages.len(), "transcript appended");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};

    #[test]
    fn test_appends_one_line_per_call() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs").join("nested").join("chat.jsonl");

        let messages = vec![Message::system("sys"), Message::user("hi")];
        let functions = vec![ToolDefinition::new("files_read", "Read", json!({}))];

        append_transcript(&path, &messages, &functions).unwrap();
        append_transcript(&path, &messages[..1], &[]).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<Value> = text
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["messages"][1], json!({"role": "user", "content": "hi"}));
        assert_eq!(lines[0]["functions"][0]["name"], json!("files_read"));
        assert!(lines[0]["timestamp"].as_str().unwrap().contains('T'));
        assert_eq!(lines[1]["functions"], json!([]));
    }

    #[test]
    fn test_unwritable_path_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, "x").unwrap();

        let result = append_transcript(&blocker.join("chat.jsonl"), &[], &[]);
        assert!(result.is_err());
    }
}
