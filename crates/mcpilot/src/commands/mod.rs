//! CLI command handlers.

pub mod ask;
pub mod chat;
pub mod servers;

use anyhow::{Context as _, Result};

use mcpilot_agent::{Agent, AgentOptions};
use mcpilot_config::{API_KEY_ENV, McpilotConfig};
use mcpilot_llm::{OpenAiConfig, SharedBackend, create_shared_backend};

/// Shared context for all commands.
#[derive(Debug, Clone)]
pub struct Context {
    /// Loaded configuration, environment overrides applied.
    pub config: McpilotConfig,
    /// Verbose output enabled.
    pub verbose: bool,
}

impl Context {
    /// Build the model backend from the `model` section.
    pub fn backend(&self) -> Result<SharedBackend> {
        let model = &self.config.model;
        let api_key = model.api_key.clone().unwrap_or_default();
        let config = OpenAiConfig::deepseek(api_key)
            .with_base_url(model.base_url())
            .with_model(&model.name)
            .with_timeout(model.timeout())
            .with_max_retries(model.max_retries);

        create_shared_backend(config)
            .with_context(|| format!("cannot create model backend (is {API_KEY_ENV} set?)"))
    }

    /// Agent settings from the `agent` section.
    pub fn agent_options(&self) -> AgentOptions {
        let agent = &self.config.agent;
        let mut options = AgentOptions::default().with_system_prompt(&agent.system_prompt);
        if let Some(path) = agent.transcript_path() {
            options = options.with_transcript_path(path);
        }
        if let Some(max) = agent.max_iterations {
            options = options.with_max_iterations(max);
        }
        options
    }

    /// Start the configured servers and build an agent over them.
    pub async fn connect_agent(&self) -> Result<Agent> {
        let backend = self.backend()?;
        let agent = Agent::connect(self.config.stdio_servers(), backend, self.agent_options())
            .await?;
        tracing::info!(
            servers = agent.dispatcher().servers().len(),
            tools = agent.catalog().len(),
            "agent ready"
        );
        Ok(agent)
    }
}
