//! Mock MCP server for integration testing.
//!
//! Speaks newline-delimited JSON-RPC on stdin/stdout and serves a handful of
//! tools.
//!
//! Usage:
//!   mock-mcp-server [--noise] [--ask-client] [--fail-init] [--silent-init]
//!                   [--slow-tool TOOL:MS]
//!
//! Options:
//!   --noise            Print non-JSON junk and notifications around replies
//!   --ask-client       Send a server-to-client request after initialize
//!   --fail-init        Answer initialize with an error
//!   --silent-init      Never answer initialize
//!   --slow-tool T:MS   Add MS delay when tool T is called

use std::env;
use std::io::{BufRead, Write};
use std::thread;
use std::time::Duration;

use serde_json::{Value, json};

#[derive(Default)]
struct ServerConfig {
    noise: bool,
    ask_client: bool,
    fail_init: bool,
    silent_init: bool,
    slow_tools: Vec<(String, u64)>,
}

impl ServerConfig {
    fn from_args() -> Self {
        let args: Vec<String> = env::args().skip(1).collect();
        let mut config = Self::default();

        let mut iter = args.iter();
        while let Some(arg) = iter.next() {
            match arg.as_str() {
                "--noise" => config.noise = true,
                "--ask-client" => config.ask_client = true,
                "--fail-init" => config.fail_init = true,
                "--silent-init" => config.silent_init = true,
                "--slow-tool" => {
                    if let Some((tool, ms)) = iter.next().and_then(|v| v.split_once(':'))
                        && let Ok(ms) = ms.parse()
                    {
                        config.slow_tools.push((tool.to_string(), ms));
                    }
                }
                _ => {}
            }
        }
        config
    }

    fn tool_delay(&self, tool_name: &str) -> u64 {
        self.slow_tools
            .iter()
            .find(|(tool, _)| tool == tool_name)
            .map(|(_, ms)| *ms)
            .unwrap_or(0)
    }
}

fn emit(out: &mut impl Write, value: &Value) {
    writeln!(out, "{}", value).unwrap();
    out.flush().unwrap();
}

fn main() {
    let config = ServerConfig::from_args();
    let stdin = std::io::stdin();
    let mut stdout = std::io::stdout();

    let mut initialized_seen = false;
    let mut client_reply: Option<Value> = None;

    for line in stdin.lock().lines() {
        let Ok(line) = line else { return };
        let Ok(message) = serde_json::from_str::<Value>(&line) else {
            continue;
        };

        let method = message.get("method").and_then(Value::as_str).map(str::to_owned);
        let id = message.get("id").cloned();

        let Some(method) = method else {
            // A reply from the client to our own request.
            client_reply = Some(message);
            continue;
        };

        let Some(id) = id else {
            match method.as_str() {
                "notifications/initialized" => initialized_seen = true,
                "shutdown" => return,
                _ => {}
            }
            continue;
        };

        if config.noise {
            writeln!(stdout, "mock server log: handling {method}").unwrap();
            emit(
                &mut stdout,
                &json!({"jsonrpc": "2.0", "method": "notifications/message", "params": {"level": "info"}}),
            );
        }

        let reply = match method.as_str() {
            "initialize" if config.silent_init => continue,
            "initialize" if config.fail_init => Err(json!({
                "code": -32603,
                "message": "initialization refused"
            })),
            "initialize" => Ok(json!({
                "protocolVersion": "2024-11-05",
                "capabilities": { "tools": { "listChanged": false } },
                "serverInfo": { "name": "mock-mcp-server", "version": "1.0.0" }
            })),
            "tools/list" => Ok(tool_list()),
            "tools/call" => {
                let params = message.get("params").cloned().unwrap_or(json!({}));
                call_tool(&params, &config, initialized_seen, client_reply.as_ref())
            }
            other => Err(json!({
                "code": -32601,
                "message": format!("Method not found: {other}")
            })),
        };

        let response = match reply {
            Ok(result) => json!({"jsonrpc": "2.0", "id": id, "result": result}),
            Err(error) => json!({"jsonrpc": "2.0", "id": id, "error": error}),
        };
        emit(&mut stdout, &response);

        if config.ask_client && method == "initialize" {
            emit(
                &mut stdout,
                &json!({"jsonrpc": "2.0", "id": "srv-1", "method": "roots/list", "params": {}}),
            );
        }
    }
}

fn tool_list() -> Value {
    json!({
        "tools": [
            {
                "name": "echo",
                "description": "Echo back the input",
                "inputSchema": {
                    "type": "object",
                    "properties": { "message": { "type": "string" } },
                    "required": ["message"]
                }
            },
            {
                "name": "add",
                "description": "Add two numbers",
                "inputSchema": {
                    "type": "object",
                    "properties": {
                        "a": { "type": "number" },
                        "b": { "type": "number" }
                    },
                    "required": ["a", "b"]
                }
            },
            {
                "name": "env",
                "description": "Report an environment variable and the working directory",
                "inputSchema": {
                    "type": "object",
                    "properties": { "name": { "type": "string" } }
                }
            },
            {
                "name": "fail",
                "description": "Always answers with a JSON-RPC error"
            },
            {
                "name": "status",
                "description": "Report what the server has seen from the client"
            }
        ]
    })
}

fn text(body: impl Into<String>) -> Value {
    json!({ "content": [{ "type": "text", "text": body.into() }] })
}

fn call_tool(
    params: &Value,
    config: &ServerConfig,
    initialized_seen: bool,
    client_reply: Option<&Value>,
) -> Result<Value, Value> {
    let tool_name = params.get("name").and_then(Value::as_str).unwrap_or("");
    let args = params.get("arguments").cloned().unwrap_or(json!({}));

    let delay = config.tool_delay(tool_name);
    if delay > 0 {
        thread::sleep(Duration::from_millis(delay));
    }

    match tool_name {
        "echo" => Ok(text(
            args.get("message").and_then(Value::as_str).unwrap_or(""),
        )),
        "add" => {
            let a = args.get("a").and_then(Value::as_f64).unwrap_or(0.0);
            let b = args.get("b").and_then(Value::as_f64).unwrap_or(0.0);
            Ok(text(format!("{}", a + b)))
        }
        "env" => {
            let name = args.get("name").and_then(Value::as_str).unwrap_or("HOME");
            Ok(json!({
                "value": env::var(name).ok(),
                "cwd": env::current_dir().ok().map(|p| p.display().to_string()),
            }))
        }
        "fail" => Err(json!({ "code": -32000, "message": "tool exploded" })),
        "status" => Ok(json!({
            "initialized": initialized_seen,
            "client_reply": client_reply,
        })),
        other => Ok(json!({
            "content": [{ "type": "text", "text": format!("Unknown tool: {other}") }],
            "isError": true
        })),
    }
}
