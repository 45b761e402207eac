//! Servers command - connect to every configured server and list its tools.

use anyhow::Result;
use clap::Args;
use console::Style;

use mcpilot_agent::qualified_name;
use mcpilot_mcp::{McpManager, ToolInfo};

use super::Context;

/// Arguments for the servers command.
#[derive(Args, Debug)]
pub struct ServersArgs {
    /// Print each tool's input schema
    #[arg(long)]
    pub schemas: bool,
}

/// Run the servers command.
pub async fn run(args: ServersArgs, ctx: &Context) -> Result<()> {
    let configs = ctx.config.stdio_servers();
    if configs.is_empty() {
        println!("No stdio MCP servers configured.");
        return Ok(());
    }

    let names: Vec<String> = configs.iter().map(|c| c.name.clone()).collect();
    let mut manager = McpManager::with_configs(configs);
    manager.connect_all().await;

    let green = Style::new().green();
    let red = Style::new().red();
    let dim = Style::new().dim();

    for (name, tools) in manager.all_tools() {
        println!(
            "{} {} {}",
            green.apply_to("●"),
            name,
            dim.apply_to(format!("({} tools)", tools.len()))
        );
        for tool in &tools {
            print_tool(&name, tool, args.schemas, &dim)?;
        }
    }
    for name in names.iter().filter(|n| !manager.is_connected(n)) {
        println!("{} {} {}", red.apply_to("●"), name, dim.apply_to("(failed to start)"));
    }

    let failed = manager.config_count() - manager.connected_count();
    manager.shutdown_all().await;

    if failed > 0 && ctx.verbose {
        eprintln!(
            "{}",
            dim.apply_to(format!(
                "{failed} of {} servers failed to start; rerun with -vv for details.",
                names.len()
            ))
        );
    }
    Ok(())
}

fn print_tool(server: &str, tool: &ToolInfo, schemas: bool, dim: &Style) -> Result<()> {
    let description = tool.description.as_deref().unwrap_or("");
    println!(
        "    {}  {}",
        qualified_name(server, &tool.name),
        dim.apply_to(description)
    );
    if schemas && let Some(schema) = &tool.input_schema {
        for line in serde_json::to_string_pretty(schema)?.lines() {
            println!("      {}", dim.apply_to(line));
        }
    }
    Ok(())
}
