//! Chat command - interactive REPL with streamed answers.

use std::io::Write;

use anyhow::Result;
use clap::Args;
use console::{Style, style};
use futures::StreamExt;
use rustyline::error::ReadlineError;
use rustyline::history::DefaultHistory;
use rustyline::{Config, Editor};

use mcpilot_agent::{Agent, StreamChunk};

use super::Context;

/// Arguments for the chat command.
#[derive(Args, Debug)]
pub struct ChatArgs {
    /// Print tool results as they arrive
    #[arg(long)]
    pub show_tool_output: bool,
}

/// Run the chat command (REPL).
pub async fn run(args: ChatArgs, ctx: &Context) -> Result<()> {
    let agent = ctx.connect_agent().await?;
    let mut repl = Repl::new(agent, args.show_tool_output)?;
    let result = repl.run().await;
    repl.agent.shutdown().await;
    result
}

/// REPL state.
struct Repl {
    agent: Agent,
    editor: Editor<(), DefaultHistory>,
    show_tool_output: bool,
}

/// Whether an input line ends the session.
fn is_exit_command(line: &str) -> bool {
    matches!(line, "exit" | "quit" | "/quit")
}

impl Repl {
    fn new(agent: Agent, show_tool_output: bool) -> Result<Self> {
        let config = Config::builder()
            .history_ignore_space(true)
            .auto_add_history(true)
            .build();

        Ok(Self {
            agent,
            editor: Editor::with_config(config)?,
            show_tool_output,
        })
    }

    async fn run(&mut self) -> Result<()> {
        self.print_welcome();
        let prompt = format!("{} ", style("you>").cyan().bold());

        loop {
            match self.editor.readline(&prompt) {
                Ok(line) => {
                    let line = line.trim();
                    if line.is_empty() {
                        continue;
                    }
                    if is_exit_command(line) {
                        break;
                    }
                    self.send_message(line).await?;
                }
                Err(ReadlineError::Interrupted) => {
                    // Ctrl+C drops the current line only.
                    print_dim("(Interrupted - type exit or press Ctrl+D to quit)");
                }
                Err(ReadlineError::Eof) => {
                    println!();
                    break;
                }
                Err(e) => {
                    print_error(&format!("Input error: {}", e));
                    break;
                }
            }
        }

        print_dim("Goodbye!");
        Ok(())
    }

    /// Send a message and print the answer as it streams.
    async fn send_message(&mut self, message: &str) -> Result<()> {
        let show_tool_output = self.show_tool_output;
        let mut stream = self.agent.prompt_stream(message);
        let mut mid_line = false;

        while let Some(chunk) = stream.next().await {
            match chunk {
                StreamChunk::Text { content } => {
                    print!("{}", content);
                    std::io::stdout().flush()?;
                    mid_line = !content.ends_with('\n');
                }
                StreamChunk::ToolStart { name, .. } => {
                    if mid_line {
                        println!();
                        mid_line = false;
                    }
                    print_dim(&format!("[Running: {}]", name));
                }
                StreamChunk::ToolEnd {
                    success, content, ..
                } => {
                    let status = if success { "done" } else { "failed" };
                    print_dim(&format!("[{}]", status));
                    if show_tool_output {
                        print_dim(&content);
                    }
                }
                StreamChunk::Done { .. } => {
                    if mid_line {
                        println!();
                    }
                    println!();
                }
                StreamChunk::Error { message } => {
                    if mid_line {
                        println!();
                    }
                    print_error(&message);
                }
            }
        }

        Ok(())
    }

    fn print_welcome(&self) {
        let dim = Style::new().dim();
        println!();
        println!("{}", style("mcpilot chat").bold().cyan());
        println!("{}", dim.apply_to("─".repeat(40)));
        println!(
            "{}",
            dim.apply_to(format!(
                "{} tools from {} servers.",
                self.agent.catalog().len(),
                self.agent.dispatcher().servers().len()
            ))
        );
        println!(
            "{}",
            dim.apply_to("Type your message and press Enter. exit or Ctrl+D quits.")
        );
        println!();
    }
}

fn print_dim(msg: &str) {
    let dim = Style::new().dim();
    println!("{}", dim.apply_to(msg));
}

fn print_error(msg: &str) {
    let red = Style::new().red();
    println!("{} {}", red.apply_to("Error:"), msg);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_commands() {
        for line in ["exit", "quit", "/quit"] {
            assert!(is_exit_command(line), "{line}");
        }
        assert!(!is_exit_command("/q"));
        assert!(!is_exit_command("exit now"));
        assert!(!is_exit_command("hello"));
    }
}
