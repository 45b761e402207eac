//! mcpilot - a tool-using chat agent over stdio MCP servers.
//!
//! Main entry point for the mcpilot CLI.

use std::path::{Path, PathBuf};

use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

mod commands;

use commands::{ask, chat, servers};

// ─────────────────────────────────────────────────────────────────────────────
// CLI Structure
// ─────────────────────────────────────────────────────────────────────────────

/// mcpilot - chat with a model that can call tools on stdio MCP servers
#[derive(Parser)]
#[command(name = "mcpilot")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Config file (.json or .toml). Discovered when omitted.
    #[arg(short, long, global = true, env = "MCPILOT_CONFIG")]
    pub config: Option<PathBuf>,

    /// More log output (-v info, -vv debug)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Ask a one-shot question
    Ask(ask::AskArgs),

    /// Enter interactive chat mode (REPL)
    Chat(chat::ChatArgs),

    /// Connect to the configured servers and list their tools
    Servers(servers::ServersArgs),
}

// ─────────────────────────────────────────────────────────────────────────────
// Main
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let loaded = mcpilot_config::load_config(cli.config.as_deref())
        .context("failed to load configuration")?;

    // Held until exit so buffered file logs are flushed.
    let _guard = init_logging(cli.verbose, loaded.config.logging.dir().as_deref())?;
    tracing::debug!(path = %loaded.source.display(), "using config");

    let ctx = commands::Context {
        config: loaded.config,
        verbose: cli.verbose > 0,
    };

    match cli.command {
        Commands::Ask(args) => ask::run(args, &ctx).await,
        Commands::Chat(args) => chat::run(args, &ctx).await,
        Commands::Servers(args) => servers::run(args, &ctx).await,
    }
}

/// Console logging to stderr, plus daily JSON files when `log_dir` is set.
///
/// `RUST_LOG` replaces the verbosity-derived console filter.
fn init_logging(verbose: u8, log_dir: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let console_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let console = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_writer(std::io::stderr)
        .with_filter(console_filter);

    let (file, guard) = match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("failed to create log directory {}", dir.display()))?;
            let appender = tracing_appender::rolling::daily(dir, "mcpilot.log");
            let (non_blocking, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .json()
                .with_writer(non_blocking)
                .with_filter(EnvFilter::new(
                    "mcpilot=debug,mcpilot_agent=debug,mcpilot_llm=debug,mcpilot_mcp=debug,mcpilot_config=debug,info",
                ));
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(console)
        .with(file)
        .init();

    Ok(guard)
}
