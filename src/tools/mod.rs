//! Tool handlers (spec §4.G): one function per tool contract, each a pure
//! `(manager, args) -> ToolResult` built on top of the connection manager's
//! single-enforcer API (§4.F) and the response formatter (§4.B).
//!
//! Grounded on chromiumoxide's `Page` convenience methods (`src/page.rs` in
//! the teacher: `find_element`, `click`, `evaluate`) generalised from
//! "one page, one call" to "named connection, arg-driven dispatch".

pub mod connection;
pub mod console;
pub mod debugger;
pub mod elements;
pub mod navigation;

use serde_json::Value;

use crate::cdp::runtime::EvaluateParams;
use crate::conn::Transport;
use crate::error::ToolError;
use crate::formatter::{self, ToolResult};

pub type HandlerResult = Result<ToolResult, ToolError>;

// ---- argument parsing --------------------------------------------------
//
// Tool arguments arrive as untyped JSON (spec §9 "dynamic arg shapes");
// these helpers are the single decoder every handler narrows through.

pub fn connection_id(args: &Value) -> Option<String> {
    args.get("connection_id").and_then(Value::as_str).map(str::to_string)
}

pub fn require_str<'a>(args: &'a Value, key: &str) -> Result<&'a str, ToolError> {
    args.get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| ToolError::execution(format!("missing required argument '{key}'")))
}

pub fn opt_str<'a>(args: &'a Value, key: &str) -> Option<&'a str> {
    args.get(key).and_then(Value::as_str)
}

pub fn opt_u64(args: &Value, key: &str, default: u64) -> u64 {
    args.get(key).and_then(Value::as_u64).unwrap_or(default)
}

pub fn opt_u32(args: &Value, key: &str, default: u32) -> u32 {
    args.get(key).and_then(Value::as_u64).map(|n| n as u32).unwrap_or(default)
}

pub fn opt_bool(args: &Value, key: &str, default: bool) -> bool {
    args.get(key).and_then(Value::as_bool).unwrap_or(default)
}

/// Narrows an `action`/`direction`/`state` discriminator field; invalid
/// values are an `EXECUTION` error, per spec §9.
pub fn require_enum<'a>(args: &'a Value, key: &str, allowed: &[&str]) -> Result<&'a str, ToolError> {
    let value = require_str(args, key)?;
    if allowed.contains(&value) {
        Ok(value)
    } else {
        Err(ToolError::execution(format!(
            "invalid {key} '{value}', expected one of {}",
            allowed.join(", ")
        )))
    }
}

// ---- shared CDP helpers -------------------------------------------------

/// Runs a one-shot `Runtime.evaluate` expression expected to return a
/// `JSON.stringify`'d string, and hands back that raw JSON text.
pub async fn evaluate_json(transport: &Transport, script: String) -> Result<String, ToolError> {
    let returns = transport
        .execute(EvaluateParams::new(script), None)
        .await
        .map_err(ToolError::from)?;
    match returns.result.value {
        Some(serde_json::Value::String(s)) => Ok(s),
        Some(other) => Ok(other.to_string()),
        None => Err(ToolError::execution(
            returns.result.description.unwrap_or_else(|| "evaluate returned no value".to_string()),
        )),
    }
}

/// Wraps `text` through the size guard (spec §4.A), attaching narrowing
/// advice built from `elements` when the payload is structured element data.
pub fn guarded(text: String, elements: Option<&[formatter::ElementSummary]>) -> ToolResult {
    formatter::guard_size(text, elements)
}
