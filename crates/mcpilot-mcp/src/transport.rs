//! Child-process transport: spawns the server and owns its lifetime.

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use serde_json::Value;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;

use crate::connection::{RequestOptions, RpcConnection};
use crate::error::{McpError, Result};
use crate::protocol::{JsonRpcResponse, methods};

/// Pause after the shutdown notification before closing stdin.
const SHUTDOWN_GRACE: Duration = Duration::from_millis(500);
/// How long to wait for the child after each termination step.
const EXIT_WAIT: Duration = Duration::from_secs(1);

/// How to launch a stdio server.
#[derive(Debug, Clone)]
pub struct StdioServerConfig {
    /// Unique name for this server; prefixes its tools.
    pub name: String,
    /// Command to spawn.
    pub command: String,
    /// Arguments to pass to the command.
    pub args: Vec<String>,
    /// Variables layered over the inherited environment.
    pub env: HashMap<String, String>,
    /// Working directory for the child.
    pub cwd: Option<PathBuf>,
}

impl StdioServerConfig {
    /// Create a new server config.
    pub fn new(name: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            command: command.into(),
            args: Vec::new(),
            env: HashMap::new(),
            cwd: None,
        }
    }

    /// Set all arguments.
    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    /// Add a single argument.
    pub fn with_arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Add a single environment variable.
    pub fn with_env_var(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Set the working directory.
    pub fn with_cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    /// Arguments with `~` expanded to the home directory.
    pub fn expanded_args(&self) -> Vec<String> {
        self.args
            .iter()
            .map(|arg| {
                if arg.contains('~') {
                    shellexpand::tilde(arg).into_owned()
                } else {
                    arg.clone()
                }
            })
            .collect()
    }
}

/// A running server process plus the JSON-RPC session on its stdio.
pub struct StdioTransport {
    name: String,
    connection: RpcConnection,
    child: tokio::sync::Mutex<Option<Child>>,
    stderr_task: parking_lot::Mutex<Option<JoinHandle<()>>>,
    stopped: tokio::sync::Mutex<bool>,
}

impl StdioTransport {
    /// Spawn the configured command with piped stdio.
    ///
    /// The child inherits this process's environment with `config.env` on
    /// top. Its stderr is forwarded to the log at debug level.
    pub fn spawn(config: &StdioServerConfig) -> Result<Self> {
        let mut cmd = Command::new(&config.command);
        cmd.args(config.expanded_args())
            .envs(&config.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(cwd) = &config.cwd {
            cmd.current_dir(cwd);
        }

        let mut child = cmd.spawn().map_err(|e| {
            McpError::spawn_failed(format!("failed to spawn '{}': {}", config.command, e))
        })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| McpError::spawn_failed("failed to capture stdin"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| McpError::spawn_failed("failed to capture stdout"))?;

        let stderr_task = child.stderr.take().map(|stderr| {
            let name = config.name.clone();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    tracing::debug!(server = %name, "stderr: {}", line);
                }
            })
        });

        tracing::debug!(
            server = %config.name,
            command = %config.command,
            pid = child.id(),
            "spawned MCP server"
        );

        let connection = RpcConnection::spawn(&config.name, Box::new(stdout), Box::new(stdin));

        Ok(Self {
            name: config.name.clone(),
            connection,
            child: tokio::sync::Mutex::new(Some(child)),
            stderr_task: parking_lot::Mutex::new(stderr_task),
            stopped: tokio::sync::Mutex::new(false),
        })
    }

    /// Server name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Send a request and wait for the response.
    pub async fn request(
        &self,
        method: &str,
        params: Option<Value>,
        opts: RequestOptions,
    ) -> Result<JsonRpcResponse> {
        self.connection.request(method, params, opts).await
    }

    /// Send a notification.
    pub async fn notify(&self, method: &str, params: Option<Value>) -> Result<()> {
        self.connection.notify(method, params).await
    }

    /// Whether [`stop`](Self::stop) has run.
    pub async fn is_stopped(&self) -> bool {
        *self.stopped.lock().await
    }

    /// Tear the session down. Safe to call more than once or concurrently;
    /// only the first call does any work.
    ///
    /// Order: cancel the receive task, send a best-effort `shutdown`
    /// notification, close stdin so the server sees end-of-input, wait, then
    /// kill if the process is still around. Failures are logged.
    pub async fn stop(&self) {
        let mut stopped = self.stopped.lock().await;
        if *stopped {
            return;
        }
        *stopped = true;

        tracing::info!(server = %self.name, "stopping MCP server");

        self.connection.cancel_receiver().await;

        match self.connection.notify(methods::SHUTDOWN, None).await {
            Ok(()) => tokio::time::sleep(SHUTDOWN_GRACE).await,
            Err(e) => tracing::debug!(server = %self.name, error = %e, "shutdown notification not sent"),
        }

        if let Err(e) = self.connection.close_writer().await {
            tracing::debug!(server = %self.name, error = %e, "closing stdin failed");
        }

        if let Some(mut child) = self.child.lock().await.take() {
            terminate(&self.name, &mut child).await;
        }

        let stderr_task = self.stderr_task.lock().take();
        if let Some(task) = stderr_task {
            task.abort();
        }
    }
}

/// Wait for a graceful exit, then force it.
async fn terminate(name: &str, child: &mut Child) {
    match tokio::time::timeout(EXIT_WAIT, child.wait()).await {
        Ok(Ok(status)) => {
            tracing::debug!(server = %name, %status, "server exited");
            return;
        }
        Ok(Err(e)) => tracing::warn!(server = %name, error = %e, "waiting for server failed"),
        Err(_) => tracing::debug!(server = %name, "server still running, killing"),
    }

    if let Err(e) = child.start_kill() {
        tracing::warn!(server = %name, error = %e, "kill failed");
        return;
    }
    match tokio::time::timeout(EXIT_WAIT, child.wait()).await {
        Ok(Ok(status)) => tracing::debug!(server = %name, %status, "server killed"),
        Ok(Err(e)) => tracing::warn!(server = %name, error = %e, "waiting for killed server failed"),
        Err(_) => tracing::warn!(server = %name, "server did not exit after kill"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_config_builder() {
        let config = StdioServerConfig::new("files", "mcp-server-files")
            .with_arg("--root")
            .with_arg("/tmp")
            .with_env_var("LOG", "1")
            .with_cwd("/var");

        assert_eq!(config.name, "files");
        assert_eq!(config.args, vec!["--root", "/tmp"]);
        assert_eq!(config.env.get("LOG").map(String::as_str), Some("1"));
        assert_eq!(config.cwd, Some(PathBuf::from("/var")));
    }

    #[test]
    fn test_tilde_expansion_only_touches_tilde_args() {
        let config = StdioServerConfig::new("fs", "srv")
            .with_arg("~/data")
            .with_arg("--flag");
        let args = config.expanded_args();
        assert!(!args[0].starts_with('~'));
        assert!(args[0].ends_with("/data"));
        assert_eq!(args[1], "--flag");
    }

    #[tokio::test]
    async fn test_spawn_nonexistent_command() {
        let config = StdioServerConfig::new("missing", "nonexistent_command_12345");
        let result = StdioTransport::spawn(&config);
        assert!(matches!(result, Err(McpError::SpawnFailed(_))));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_stop_is_idempotent() {
        // `cat` echoes our frames back, which the receive loop treats as
        // server requests; all that matters here is that it exits on EOF.
        let transport = StdioTransport::spawn(&StdioServerConfig::new("cat", "cat")).unwrap();
        transport.stop().await;
        assert!(transport.is_stopped().await);
        transport.stop().await;

        let err = transport.notify("anything", None).await.unwrap_err();
        assert!(matches!(err, McpError::NotStarted));
    }
}
