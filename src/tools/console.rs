//! `get_console_logs` tool (spec §4.G).

use std::time::SystemTime;

use serde_json::Value;

use crate::compressor::{self, format_variations};
use crate::context::relative_time;
use crate::manager::ConnectionManager;
use crate::state::ConsoleMessage;

use super::{connection_id, opt_bool, opt_u64, HandlerResult};

fn matches_level(msg: &ConsoleMessage, filter: &str) -> bool {
    filter == "all" || msg.level == filter
}

pub async fn get_console_logs(manager: &ConnectionManager, args: &Value) -> HandlerResult {
    let id = connection_id(args);
    let filter_level = args.get("filter_level").and_then(Value::as_str).unwrap_or("all").to_string();
    let limit = opt_u64(args, "limit", 3) as usize;
    let expand_errors = opt_bool(args, "expand_errors", false);

    let conn = manager.get_connection_or_throw(id.as_deref())?;
    let mut guard = conn.lock().await;

    let now = SystemTime::now();
    let change_status = match guard.last_query {
        None => "first_query".to_string(),
        Some((last_query_time, recorded_epoch)) => {
            if recorded_epoch < guard.navigation_epoch {
                "reloaded".to_string()
            } else if guard.last_hmr.map(|t| t > last_query_time).unwrap_or(false) {
                "hmr_updated".to_string()
            } else {
                "unchanged".to_string()
            }
        }
    };

    let mut out = String::from("PAGE STATE\n");
    out.push_str(&format!("Navigation epoch: {}\n", guard.navigation_epoch));
    out.push_str(&format!("Last navigation: {}\n", relative_time(guard.last_navigation)));
    if let Some(last_hmr) = guard.last_hmr {
        out.push_str(&format!("Last HMR update: {} (count: {})\n", relative_time(last_hmr), guard.hmr_update_count));
    }
    match change_status.as_str() {
        "reloaded" => out.push_str("[PAGE RELOADED since your last query]\n"),
        "hmr_updated" => out.push_str("[PAGE HOT-RELOADED since your last query]\n"),
        "first_query" => {}
        _ => {}
    }

    out.push_str("\nCONSOLE MESSAGES\n");

    let filtered: Vec<ConsoleMessage> = guard.console.iter().filter(|m| matches_level(m, &filter_level)).cloned().collect();

    if expand_errors {
        let tail: Vec<&ConsoleMessage> = filtered.iter().rev().take(limit).collect();
        for msg in tail.into_iter().rev() {
            out.push_str(&format!("[{}] {} ({})\n", msg.level, msg.text, relative_time(msg.timestamp)));
            if msg.level == "error" {
                if let Some(stack) = &msg.stack_trace {
                    out.push_str(&format!("  stack:\n{}\n", indent(stack)));
                } else if !msg.stack_locations.is_empty() {
                    for loc in &msg.stack_locations {
                        out.push_str(&format!("  at {} ({}:{})\n", loc.function_name, loc.url, loc.line_number));
                    }
                }
            }
        }
    } else {
        let compressed = compressor::compress(&filtered);
        let tail = &compressed[compressed.len().saturating_sub(limit)..];
        for block in tail {
            let msg = &block.pattern[0];
            if block.pattern.len() == 1 {
                if block.count == 1 {
                    out.push_str(&format!("[{}] {}\n", msg.level, msg.text));
                } else {
                    out.push_str(&format!("[{}] {} x{}\n", msg.level, msg.text, block.count));
                }
            } else {
                let joined = block.pattern.iter().map(|m| m.text.as_str()).collect::<Vec<_>>().join(" | ");
                out.push_str(&format!("[{}] ({}) x{}\n", msg.level, joined, block.count));
            }
            if let Some(variations) = format_variations(&block.variations) {
                out.push_str(&format!("  Variations: {variations}\n"));
            }
        }
    }

    guard.last_query = Some((now, guard.navigation_epoch));

    Ok(super::guarded(out, None))
}

fn indent(text: &str) -> String {
    text.lines().map(|l| format!("    {l}")).collect::<Vec<_>>().join("\n")
}
