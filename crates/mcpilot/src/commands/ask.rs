//! Ask command - one-shot question to the agent.

use anyhow::Result;
use clap::Args;
use console::Style;

use super::Context;

/// Arguments for the ask command.
#[derive(Args, Debug)]
pub struct AskArgs {
    /// The question or prompt to send
    #[arg(required = true, num_args = 1..)]
    pub query: Vec<String>,
}

/// Run the ask command.
pub async fn run(args: AskArgs, ctx: &Context) -> Result<()> {
    let query = args.query.join(" ");
    let mut agent = ctx.connect_agent().await?;
    let dim = Style::new().dim();

    if ctx.verbose {
        let names: Vec<&str> = agent
            .dispatcher()
            .servers()
            .iter()
            .map(|s| s.name())
            .collect();
        eprintln!("{}", dim.apply_to(format!("Servers: {}", names.join(", "))));
    }

    let outcome = agent.prompt(&query).await;
    agent.shutdown().await;

    println!("{}", outcome.text());

    if let Some(cause) = outcome.cause() {
        anyhow::bail!("answer incomplete ({cause})");
    }
    Ok(())
}
