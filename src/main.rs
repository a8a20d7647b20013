//! Stdio request loop (spec §4.I): a newline-delimited JSON-RPC framer over
//! standard input/output, exactly one peer, backed by the connection
//! manager and tool registry as explicit dependencies (spec §9 "global
//! mutable state... treat it as an explicit dependency").

use std::io::Write as _;

use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use chrome_devtools_mcp::manager::ConnectionManager;
use chrome_devtools_mcp::registry::Registry;
use chrome_devtools_mcp::rpc::{Request, Response};

fn init_logging() {
    let debug = std::env::var("DEBUG").map(|v| v == "1" || v.eq_ignore_ascii_case("true")).unwrap_or(false);
    let filter = if debug {
        tracing_subscriber::EnvFilter::new("debug")
    } else {
        tracing_subscriber::EnvFilter::new("warn")
    };
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}

#[tokio::main]
async fn main() {
    init_logging();

    let mut manager = ConnectionManager::new();
    let registry = Registry::new();

    let stdin = tokio::io::stdin();
    let mut lines = BufReader::new(stdin).lines();
    let mut stdout = tokio::io::stdout();

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => {
                tracing::info!("stdin closed, shutting down");
                std::process::exit(0);
            }
            Err(err) => {
                tracing::error!("fatal error reading stdin: {err}");
                std::process::exit(1);
            }
        };

        if line.trim().is_empty() {
            continue;
        }

        let request: Request = match serde_json::from_str(&line) {
            Ok(req) => req,
            Err(err) => {
                tracing::warn!("failed to parse request: {err}");
                continue;
            }
        };

        let Some(id) = request.id.clone() else {
            // Notifications carry no id and expect no response.
            continue;
        };

        let response = handle(&registry, &mut manager, &request, id).await;
        let text = match serde_json::to_string(&response) {
            Ok(text) => text,
            Err(err) => {
                tracing::error!("failed to serialize response: {err}");
                continue;
            }
        };

        if stdout.write_all(text.as_bytes()).await.is_err() || stdout.write_all(b"\n").await.is_err() {
            tracing::error!("fatal error writing stdout");
            let _ = std::io::stdout().flush();
            std::process::exit(1);
        }
        let _ = stdout.flush().await;
    }
}

async fn handle(registry: &Registry, manager: &mut ConnectionManager, request: &Request, id: Value) -> Response {
    match request.method.as_str() {
        "tools/list" => {
            let tools = registry.list();
            Response::success(id, serde_json::json!({ "tools": tools }))
        }
        "tools/call" => {
            let name = request.params.get("name").and_then(Value::as_str).unwrap_or_default();
            let empty = serde_json::json!({});
            let args = request.params.get("arguments").unwrap_or(&empty);
            let result = registry.dispatch(manager, name, args).await;
            match serde_json::to_value(&result) {
                Ok(value) => Response::success(id, value),
                Err(err) => Response::failure(id, -32603, format!("internal error: {err}")),
            }
        }
        other => Response::failure(id, -32601, format!("method not found: {other}")),
    }
}
