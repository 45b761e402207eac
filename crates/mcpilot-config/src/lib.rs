//! Configuration for mcpilot.
//!
//! A single JSON or TOML file names the tool servers to spawn (`mcpServers`),
//! the model endpoint, and agent settings. See [`discovery`] for where the
//! file is looked for and [`types`] for its shape.

pub mod discovery;
pub mod error;
pub mod types;

pub use discovery::{
    LoadedConfig, load_config, load_config_file, load_config_with_options, load_dotenv,
    user_config_dir,
};
pub use error::{ConfigError, Result};
pub use types::{
    API_KEY_ENV, AgentConfig, BASE_URL_ENV, DEFAULT_BASE_URL, DEFAULT_MODEL,
    DEFAULT_SYSTEM_PROMPT, LoggingConfig, McpilotConfig, ModelConfig, ServerEntry, StdioEntry,
    UrlEntry,
};
