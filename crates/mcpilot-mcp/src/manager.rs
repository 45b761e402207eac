//! Lifecycle management for several MCP servers at once.

use std::sync::Arc;

use crate::client::{ClientTimeouts, McpClient};
use crate::protocol::ToolInfo;
use crate::transport::StdioServerConfig;

/// Starts, tracks and stops a set of MCP servers.
///
/// Servers keep the order they were configured in, which is also the order
/// their tools are reported in.
#[derive(Default)]
pub struct McpManager {
    configs: Vec<StdioServerConfig>,
    clients: Vec<Arc<McpClient>>,
    timeouts: ClientTimeouts,
}

impl McpManager {
    /// Create a new empty manager.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a manager with the given server configurations.
    pub fn with_configs(configs: Vec<StdioServerConfig>) -> Self {
        let mut manager = Self::new();
        for config in configs {
            manager.add_server(config);
        }
        manager
    }

    /// Override the deadlines used by every client started afterwards.
    pub fn with_timeouts(mut self, timeouts: ClientTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Add a server configuration, replacing any with the same name.
    pub fn add_server(&mut self, config: StdioServerConfig) {
        tracing::debug!(server = %config.name, "adding MCP server configuration");
        self.configs.retain(|c| c.name != config.name);
        self.configs.push(config);
    }

    /// Start every configured server that is not running yet and fetch its
    /// tool list.
    ///
    /// Servers that fail to start are logged and skipped. Returns the number
    /// of servers started by this call.
    pub async fn connect_all(&mut self) -> usize {
        let mut connected = 0;

        for config in &self.configs {
            if self.is_connected(&config.name) {
                tracing::debug!(server = %config.name, "server already connected, skipping");
                continue;
            }

            match McpClient::start_with_timeouts(config, self.timeouts).await {
                Ok(client) => {
                    client.list_tools().await;
                    self.clients.push(Arc::new(client));
                    connected += 1;
                    tracing::info!(server = %config.name, "MCP server connected");
                }
                Err(e) => {
                    tracing::warn!(server = %config.name, error = %e, "could not start MCP server");
                }
            }
        }

        tracing::info!(
            connected,
            total = self.configs.len(),
            "MCP server connection complete"
        );
        connected
    }

    /// Whether a server with this name is running.
    pub fn is_connected(&self, name: &str) -> bool {
        self.clients.iter().any(|c| c.name() == name)
    }

    /// Get a connected client by name.
    pub fn get_client(&self, name: &str) -> Option<Arc<McpClient>> {
        self.clients.iter().find(|c| c.name() == name).cloned()
    }

    /// All connected clients, in configuration order.
    pub fn clients(&self) -> &[Arc<McpClient>] {
        &self.clients
    }

    /// Cached tools per connected server.
    pub fn all_tools(&self) -> Vec<(String, Vec<ToolInfo>)> {
        self.clients
            .iter()
            .map(|c| (c.name().to_string(), c.tools()))
            .collect()
    }

    /// Get the number of configured servers.
    pub fn config_count(&self) -> usize {
        self.configs.len()
    }

    /// Get the number of connected servers.
    pub fn connected_count(&self) -> usize {
        self.clients.len()
    }

    /// Stop every connected server and forget it. Configurations are kept.
    pub async fn shutdown_all(&mut self) {
        tracing::info!(
            server_count = self.clients.len(),
            "shutting down all MCP servers"
        );
        for client in self.clients.drain(..) {
            client.stop().await;
        }
    }
}

impl std::fmt::Debug for McpManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("McpManager")
            .field(
                "configured",
                &self.configs.iter().map(|c| &c.name).collect::<Vec<_>>(),
            )
            .field(
                "connected",
                &self.clients.iter().map(|c| c.name()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_manager_empty() {
        let manager = McpManager::new();
        assert_eq!(manager.config_count(), 0);
        assert_eq!(manager.connected_count(), 0);
    }

    #[test]
    fn test_add_server_replaces_same_name() {
        let mut manager = McpManager::with_configs(vec![
            StdioServerConfig::new("a", "cmd1"),
            StdioServerConfig::new("b", "cmd2"),
        ]);
        manager.add_server(StdioServerConfig::new("a", "cmd3"));
        assert_eq!(manager.config_count(), 2);
        assert!(format!("{manager:?}").contains("\"b\", \"a\""));
    }

    #[tokio::test]
    async fn test_connect_all_skips_failures() {
        let mut manager = McpManager::with_configs(vec![
            StdioServerConfig::new("broken", "nonexistent_command_12345"),
        ]);
        assert_eq!(manager.connect_all().await, 0);
        assert_eq!(manager.connected_count(), 0);
        assert!(manager.get_client("broken").is_none());
        manager.shutdown_all().await;
    }
}
