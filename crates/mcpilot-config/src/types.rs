//! Configuration types.
//!
//! The same structure is accepted as JSON or TOML:
//!
//! ```json
//! {
//!   "mcpServers": {
//!     "files": { "command": "npx", "args": ["-y", "@modelcontextprotocol/server-filesystem", "~/notes"] },
//!     "remote": { "url": "http://localhost:8000/sse" }
//!   },
//!   "model": { "name": "deepseek-reasoner" },
//!   "agent": { "transcript_path": "~/.local/share/mcpilot/messages.jsonl" }
//! }
//! ```

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use mcpilot_mcp::StdioServerConfig;

use crate::error::{ConfigError, Result};

/// Environment variable holding the model API key.
pub const API_KEY_ENV: &str = "DS_API_KEY";

/// Environment variable overriding the model base URL.
pub const BASE_URL_ENV: &str = "DS_BASE_URL";

/// Default model base URL.
pub const DEFAULT_BASE_URL: &str = "https://api.deepseek.com";

/// Default model name.
pub const DEFAULT_MODEL: &str = "deepseek-reasoner";

/// Default system prompt.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful assistant.";

// ─────────────────────────────────────────────────────────────────────────────
// Root
// ─────────────────────────────────────────────────────────────────────────────

/// Root configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct McpilotConfig {
    /// Tool servers by name. Started in name order.
    #[serde(rename = "mcpServers", default)]
    pub mcp_servers: BTreeMap<String, ServerEntry>,

    /// Model settings.
    #[serde(default)]
    pub model: ModelConfig,

    /// Agent settings.
    #[serde(default)]
    pub agent: AgentConfig,

    /// Log file settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl McpilotConfig {
    /// Parse JSON text.
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|source| ConfigError::ParseJson {
            path: "<string>".to_string(),
            source,
        })
    }

    /// Parse TOML text.
    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|source| ConfigError::ParseToml {
            path: "<string>".to_string(),
            source,
        })
    }

    /// Apply `DS_API_KEY` / `DS_BASE_URL` from the process environment.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply model overrides from an arbitrary variable lookup.
    ///
    /// Empty values are ignored.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let lookup = |key: &str| lookup(key).filter(|v| !v.is_empty());
        if let Some(key) = lookup(API_KEY_ENV) {
            self.model.api_key = Some(key);
        }
        if let Some(url) = lookup(BASE_URL_ENV) {
            self.model.base_url = Some(url);
        }
    }

    /// Stdio servers ready to spawn.
    ///
    /// URL (SSE) servers are not supported and are skipped with a warning.
    pub fn stdio_servers(&self) -> Vec<StdioServerConfig> {
        self.mcp_servers
            .iter()
            .filter_map(|(name, entry)| match entry {
                ServerEntry::Stdio(stdio) => Some(stdio.to_server_config(name)),
                ServerEntry::Url(remote) => {
                    tracing::warn!(
                        server = %name,
                        url = %remote.url,
                        "SSE servers are not supported, skipping"
                    );
                    None
                }
            })
            .collect()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Servers
// ─────────────────────────────────────────────────────────────────────────────

/// One entry of the `mcpServers` map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ServerEntry {
    /// A server spawned as a child process.
    Stdio(StdioEntry),
    /// A server reached over the network.
    Url(UrlEntry),
}

/// A child-process server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StdioEntry {
    /// Program to run.
    pub command: String,
    /// Arguments. `~` is expanded when the server starts.
    #[serde(default)]
    pub args: Vec<String>,
    /// Variables added to the inherited environment.
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    /// Working directory. `~` is expanded.
    #[serde(default)]
    pub cwd: Option<String>,
}

impl StdioEntry {
    /// Convert to a spawnable server config named `name`.
    pub fn to_server_config(&self, name: &str) -> StdioServerConfig {
        let mut config =
            StdioServerConfig::new(name, &self.command).with_args(self.args.clone());
        for (key, value) in &self.env {
            config = config.with_env_var(key, value);
        }
        if let Some(cwd) = &self.cwd {
            config = config.with_cwd(shellexpand::tilde(cwd).into_owned());
        }
        config
    }
}

/// A network server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UrlEntry {
    /// Endpoint URL.
    pub url: String,
}

// ─────────────────────────────────────────────────────────────────────────────
// Model
// ─────────────────────────────────────────────────────────────────────────────

/// Model backend settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Model name.
    pub name: String,
    /// API base URL. Defaults to DeepSeek.
    pub base_url: Option<String>,
    /// API key. Prefer `DS_API_KEY` over writing it here.
    pub api_key: Option<String>,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
    /// Retries for transient failures.
    pub max_retries: u32,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            name: DEFAULT_MODEL.to_string(),
            base_url: None,
            api_key: None,
            timeout_secs: 300,
            max_retries: 2,
        }
    }
}

impl ModelConfig {
    /// Base URL, falling back to the default.
    pub fn base_url(&self) -> &str {
        self.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL)
    }

    /// Request timeout.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Agent
// ─────────────────────────────────────────────────────────────────────────────

/// Agent settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// First message of every conversation.
    pub system_prompt: String,
    /// JSONL transcript file, appended on exit.
    pub transcript_path: Option<String>,
    /// Upper bound on model turns per query.
    pub max_iterations: Option<u32>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            transcript_path: None,
            max_iterations: None,
        }
    }
}

impl AgentConfig {
    /// Transcript path with `~` expanded.
    pub fn transcript_path(&self) -> Option<PathBuf> {
        self.transcript_path
            .as_deref()
            .map(|p| PathBuf::from(shellexpand::tilde(p).into_owned()))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Logging
// ─────────────────────────────────────────────────────────────────────────────

/// Log file settings. Console logging is controlled from the command line.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Directory for daily JSON log files. No file logging when unset.
    pub dir: Option<String>,
}

impl LoggingConfig {
    /// Log directory with `~` expanded.
    pub fn dir(&self) -> Option<PathBuf> {
        self.dir
            .as_deref()
            .map(|p| PathBuf::from(shellexpand::tilde(p).into_owned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const JSON: &str = r#"{
        "mcpServers": {
            "files": {
                "command": "mcp-files",
                "args": ["--root", "~/notes"],
                "env": {"LOG": "1"},
                "cwd": "/tmp"
            },
            "remote": {"url": "http://localhost:8000/sse"}
        },
        "agent": {"max_iterations": 8}
    }"#;

    #[test]
    fn test_parse_json_with_defaults() {
        let config = McpilotConfig::from_json(JSON).unwrap();

        assert_eq!(config.mcp_servers.len(), 2);
        assert!(matches!(config.mcp_servers["remote"], ServerEntry::Url(_)));
        assert_eq!(config.model.name, "deepseek-reasoner");
        assert_eq!(config.model.base_url(), "https://api.deepseek.com");
        assert_eq!(config.model.timeout(), Duration::from_secs(300));
        assert_eq!(config.model.max_retries, 2);
        assert_eq!(config.agent.system_prompt, "You are a helpful assistant.");
        assert_eq!(config.agent.max_iterations, Some(8));
        assert!(config.logging.dir().is_none());
    }

    #[test]
    fn test_parse_toml() {
        let config = McpilotConfig::from_toml(
            r#"
[mcpServers.files]
command = "mcp-files"
args = ["--root", "/srv"]

[model]
name = "deepseek-chat"
base_url = "http://localhost:9000"

[agent]
system_prompt = "Be terse."
transcript_path = "/var/log/mcpilot.jsonl"

[logging]
dir = "/var/log/mcpilot"
"#,
        )
        .unwrap();

        assert_eq!(config.model.name, "deepseek-chat");
        assert_eq!(config.model.base_url(), "http://localhost:9000");
        assert_eq!(config.agent.system_prompt, "Be terse.");
        assert_eq!(
            config.agent.transcript_path(),
            Some(PathBuf::from("/var/log/mcpilot.jsonl"))
        );
        assert_eq!(config.logging.dir(), Some(PathBuf::from("/var/log/mcpilot")));
        assert!(matches!(config.mcp_servers["files"], ServerEntry::Stdio(_)));
    }

    #[test]
    fn test_entry_without_command_or_url_is_rejected() {
        let err = McpilotConfig::from_json(r#"{"mcpServers": {"x": {"args": []}}}"#);
        assert!(matches!(err, Err(ConfigError::ParseJson { .. })));
    }

    #[test]
    fn test_stdio_servers_skip_url_entries() {
        let config = McpilotConfig::from_json(JSON).unwrap();
        let servers = config.stdio_servers();

        assert_eq!(servers.len(), 1);
        let files = &servers[0];
        assert_eq!(files.name, "files");
        assert_eq!(files.command, "mcp-files");
        assert_eq!(files.args, vec!["--root", "~/notes"]);
        assert_eq!(files.env.get("LOG").map(String::as_str), Some("1"));
        assert_eq!(files.cwd, Some(PathBuf::from("/tmp")));
    }

    #[test]
    fn test_env_overrides() {
        let mut config = McpilotConfig::default();
        config.model.api_key = Some("from-file".into());

        let vars: HashMap<&str, &str> = [
            ("DS_API_KEY", "from-env"),
            ("DS_BASE_URL", ""),
        ]
        .into_iter()
        .collect();
        config.apply_overrides(|k| vars.get(k).map(|v| v.to_string()));

        assert_eq!(config.model.api_key.as_deref(), Some("from-env"));
        assert_eq!(config.model.base_url(), DEFAULT_BASE_URL);
    }
}
