//! CLI integration tests for the mcpilot command-line interface.
//!
//! None of these need a model endpoint or a real MCP server.

use std::path::{Path, PathBuf};

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

/// Get a command for the mcpilot binary, isolated from the caller's
/// environment and working directory.
fn mcpilot(dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("mcpilot").unwrap();
    cmd.current_dir(dir)
        .env_remove("MCPILOT_CONFIG")
        .env_remove("DS_API_KEY")
        .env_remove("DS_BASE_URL")
        .env_remove("RUST_LOG");
    cmd
}

fn write_config(dir: &TempDir, name: &str, contents: &str) -> PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, contents).unwrap();
    path
}

// ─────────────────────────────────────────────────────────────────────────────
// Help and Version
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_help_lists_subcommands() {
    let dir = TempDir::new().unwrap();
    mcpilot(dir.path())
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("ask"))
        .stdout(predicate::str::contains("chat"))
        .stdout(predicate::str::contains("servers"))
        .stdout(predicate::str::contains("--config"));
}

#[test]
fn test_version_displays() {
    let dir = TempDir::new().unwrap();
    mcpilot(dir.path())
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("mcpilot"));
}

#[test]
fn test_ask_requires_query() {
    let dir = TempDir::new().unwrap();
    mcpilot(dir.path())
        .arg("ask")
        .assert()
        .failure()
        .stderr(predicate::str::contains("required"));
}

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_missing_config_file() {
    let dir = TempDir::new().unwrap();
    mcpilot(dir.path())
        .args(["--config", "nope.json", "servers"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to load configuration"));
}

#[test]
fn test_unsupported_config_format() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, "mcpilot.yaml", "mcpServers: {}");
    mcpilot(dir.path())
        .arg("--config")
        .arg(&path)
        .arg("servers")
        .assert()
        .failure()
        .stderr(predicate::str::contains("unsupported config format"));
}

#[test]
fn test_servers_with_only_url_entries() {
    let dir = TempDir::new().unwrap();
    write_config(
        &dir,
        "mcpilot.json",
        r#"{"mcpServers": {"remote": {"url": "http://localhost:1/sse"}}}"#,
    );
    // Discovered from the working directory.
    mcpilot(dir.path())
        .arg("servers")
        .assert()
        .success()
        .stdout(predicate::str::contains("No stdio MCP servers configured."));
}

#[test]
fn test_servers_reports_failed_start() {
    let dir = TempDir::new().unwrap();
    let path = write_config(
        &dir,
        "mcpilot.toml",
        r#"
[mcpServers.ghost]
command = "/nonexistent/mcp-server"
"#,
    );
    mcpilot(dir.path())
        .arg("--config")
        .arg(&path)
        .args(["-v", "servers"])
        .assert()
        .success()
        .stdout(predicate::str::contains("ghost"))
        .stdout(predicate::str::contains("failed to start"))
        .stderr(predicate::str::contains("1 of 1 servers failed to start"));
}

// ─────────────────────────────────────────────────────────────────────────────
// Ask
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_ask_without_api_key() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, "mcpilot.json", "{}");
    mcpilot(dir.path())
        .arg("--config")
        .arg(&path)
        .args(["ask", "hello"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("DS_API_KEY"));
}

#[test]
fn test_ask_api_key_from_dotenv() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, "mcpilot.json", "{}");
    std::fs::write(dir.path().join(".env"), "DS_API_KEY=sk-from-dotenv\n").unwrap();

    // The key is found, so the run gets as far as starting servers.
    mcpilot(dir.path())
        .arg("--config")
        .arg(&path)
        .args(["ask", "hello"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("No MCP servers could be started."));
}

#[test]
fn test_ask_with_no_servers() {
    let dir = TempDir::new().unwrap();
    let path = write_config(
        &dir,
        "mcpilot.json",
        r#"{"mcpServers": {"ghost": {"command": "/nonexistent/mcp-server"}}}"#,
    );
    mcpilot(dir.path())
        .env("DS_API_KEY", "sk-test")
        .arg("--config")
        .arg(&path)
        .args(["ask", "what", "time", "is", "it"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("No MCP servers could be started."));
}
