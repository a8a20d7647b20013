//! Tool registry & dispatcher (spec §4.H): builds the active name→handler
//! map from the `USE_LEGACY_TOOLS` feature toggle, validates it at startup,
//! and turns any [`ToolError`] the handlers raise into the uniform
//! `{text, isError, _toolName, _errorType, _recoverable}` response shape.

use serde_json::{json, Value};

use crate::error::ToolError;
use crate::manager::ConnectionManager;
use crate::rpc::{CallToolResult, ToolDefinition};
use crate::tools::{connection, console, debugger, elements, navigation};

/// Which mutually-exclusive action/verb tool set is active (spec §4.G).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolSet {
    Smart,
    Legacy,
}

impl ToolSet {
    pub fn from_env() -> Self {
        let legacy = std::env::var("USE_LEGACY_TOOLS")
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);
        if legacy {
            ToolSet::Legacy
        } else {
            ToolSet::Smart
        }
    }
}

const SHARED_NAMES: &[&str] = &[
    "query_elements",
    "click_element",
    "fill_element",
    "navigate",
    "get_console_logs",
    "inspect_element",
    "chrome_list_connections",
    "chrome_switch_connection",
    "chrome_disconnect",
];

const SMART_NAMES: &[&str] = &[
    "chrome",
    "target",
    "enable_debug_tools",
    "breakpoint",
    "step",
    "execution",
    "call_stack",
    "evaluate",
    "pause_on_exceptions",
];

const LEGACY_NAMES: &[&str] = &[
    "chrome_connect",
    "chrome_launch",
    "list_targets",
    "switch_target",
    "debugger_enable",
    "debugger_set_breakpoint",
    "debugger_remove_breakpoint",
    "debugger_get_call_stack",
    "debugger_evaluate_on_call_frame",
    "debugger_step_over",
    "debugger_step_into",
    "debugger_step_out",
    "debugger_resume",
    "debugger_pause",
    "debugger_set_pause_on_exceptions",
];

pub struct Registry {
    pub set: ToolSet,
}

impl Registry {
    /// Builds the registry and validates (spec §4.H "fail fast") that every
    /// name in the active set has a matching dispatch arm.
    pub fn new() -> Self {
        let set = ToolSet::from_env();
        let registry = Self { set };
        registry.validate();
        registry
    }

    fn active_names(&self) -> Vec<&'static str> {
        let mut names: Vec<&'static str> = SHARED_NAMES.to_vec();
        match self.set {
            ToolSet::Smart => names.extend_from_slice(SMART_NAMES),
            ToolSet::Legacy => names.extend_from_slice(LEGACY_NAMES),
        }
        names
    }

    fn validate(&self) {
        for name in self.active_names() {
            if tool_schema(name).is_none() {
                panic!("tool '{name}' is registered but has no schema/handler");
            }
        }
    }

    pub fn list(&self) -> Vec<ToolDefinition> {
        self.active_names()
            .into_iter()
            .filter_map(|name| tool_schema(name).map(|(description, input_schema)| ToolDefinition { name, description, input_schema }))
            .collect()
    }

    pub async fn dispatch(&self, manager: &mut ConnectionManager, name: &str, args: &Value) -> CallToolResult {
        if !self.active_names().contains(&name) {
            return render_error(name, &ToolError::unknown(format!("unknown tool '{name}'")));
        }

        let result = run(manager, name, args).await;
        match result {
            Ok(tool_result) => {
                if tool_result.is_error {
                    CallToolResult::err(tool_result.text, name.to_string(), crate::error::ErrorKind::Unknown.as_str(), false)
                } else {
                    CallToolResult::ok(tool_result.text)
                }
            }
            Err(err) => render_error(name, &err),
        }
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

fn render_error(name: &str, err: &ToolError) -> CallToolResult {
    let mut text = err.message.clone();
    if let Some(hint) = err.kind.hint() {
        text.push_str(&format!("\nSuggestion: {hint}."));
    }
    if err.kind.recoverable() {
        tracing::warn!(tool = name, kind = err.kind.as_str(), "{}", err.message);
    } else {
        tracing::error!(tool = name, kind = err.kind.as_str(), "{}", err.message);
    }
    CallToolResult::err(text, name.to_string(), err.kind.as_str(), err.kind.recoverable())
}

async fn run(manager: &mut ConnectionManager, name: &str, args: &Value) -> Result<crate::formatter::ToolResult, ToolError> {
    match name {
        // shared
        "query_elements" => elements::query_elements(manager, args).await,
        "click_element" => elements::click_element(manager, args).await,
        "fill_element" => elements::fill_element(manager, args).await,
        "navigate" => navigation::navigate(manager, args).await,
        "get_console_logs" => console::get_console_logs(manager, args).await,
        "inspect_element" => elements::inspect_element(manager, args).await,
        "chrome_list_connections" => connection::list_connections(manager, args).await,
        "chrome_switch_connection" => connection::switch_connection(manager, args).await,
        "chrome_disconnect" => connection::disconnect(manager, args).await,

        // smart set
        "chrome" => connection::chrome_action(manager, args).await,
        "target" => connection::target_action(manager, args).await,
        "enable_debug_tools" => debugger::enable_debug_tools(manager, args).await,
        "breakpoint" => debugger::breakpoint_action(manager, args).await,
        "step" => debugger::step(manager, args).await,
        "execution" => debugger::execution_action(manager, args).await,
        "call_stack" => debugger::call_stack(manager, args).await,
        "evaluate" => debugger::evaluate(manager, args).await,
        "pause_on_exceptions" => debugger::pause_on_exceptions(manager, args).await,

        // legacy set
        "chrome_connect" => connection::connect(manager, args).await,
        "chrome_launch" => connection::launch(manager, args).await,
        "list_targets" => connection::list_targets(manager, args).await,
        "switch_target" => connection::switch_target(manager, args).await,
        "debugger_enable" => debugger::enable_debug_tools(manager, args).await,
        "debugger_set_breakpoint" => debugger::breakpoint_set(manager, args).await,
        "debugger_remove_breakpoint" => debugger::breakpoint_remove(manager, args).await,
        "debugger_get_call_stack" => debugger::call_stack(manager, args).await,
        "debugger_evaluate_on_call_frame" => debugger::evaluate(manager, args).await,
        "debugger_step_over" => debugger::step(manager, &with_direction(args, "over")).await,
        "debugger_step_into" => debugger::step(manager, &with_direction(args, "into")).await,
        "debugger_step_out" => debugger::step(manager, &with_direction(args, "out")).await,
        "debugger_resume" => debugger::execution_resume(manager, args).await,
        "debugger_pause" => debugger::execution_pause(manager, args).await,
        "debugger_set_pause_on_exceptions" => debugger::pause_on_exceptions(manager, args).await,

        _ => Err(ToolError::unknown(format!("unknown tool '{name}'"))),
    }
}

/// Legacy per-verb step tools don't carry a `direction` field; the smart
/// handler is reused by synthesising one.
fn with_direction(args: &Value, direction: &str) -> Value {
    let mut merged = args.clone();
    if let Value::Object(map) = &mut merged {
        map.insert("direction".to_string(), Value::String(direction.to_string()));
    }
    merged
}

/// `(description, inputSchema)` for every tool name this registry knows
/// about, shared by validation and `tools/list`.
fn tool_schema(name: &str) -> Option<(&'static str, Value)> {
    let conn_id_prop = json!({"type": "string", "description": "connection id; defaults to the active connection"});
    Some(match name {
        "query_elements" => (
            "Query the page for elements matching a CSS selector.",
            json!({"type":"object","properties":{
                "selector": {"type":"string"},
                "limit": {"type":"integer","default":5,"maximum":20},
                "text_contains": {"type":"string"},
                "include_hidden": {"type":"boolean","default":false},
                "connection_id": conn_id_prop,
            },"required":["selector"]}),
        ),
        "click_element" => (
            "Click the element matching a CSS selector.",
            json!({"type":"object","properties":{
                "selector": {"type":"string"},
                "index": {"type":"integer","default":0},
                "include_context": {"type":"boolean","default":true},
                "connection_id": conn_id_prop,
            },"required":["selector"]}),
        ),
        "fill_element" => (
            "Fill a form element matching a CSS selector.",
            json!({"type":"object","properties":{
                "selector": {"type":"string"},
                "value": {"type":"string"},
                "index": {"type":"integer","default":0},
                "submit": {"type":"boolean","default":false},
                "include_context": {"type":"boolean","default":true},
                "connection_id": conn_id_prop,
            },"required":["selector","value"]}),
        ),
        "navigate" => (
            "Navigate the active page to a URL.",
            json!({"type":"object","properties":{
                "url": {"type":"string"},
                "include_context": {"type":"boolean","default":true},
                "connection_id": conn_id_prop,
            },"required":["url"]}),
        ),
        "get_console_logs" => (
            "Read captured console messages, compressed and summarised.",
            json!({"type":"object","properties":{
                "filter_level": {"type":"string","default":"all"},
                "limit": {"type":"integer","default":3},
                "expand_errors": {"type":"boolean","default":false},
                "connection_id": conn_id_prop,
            }}),
        ),
        "inspect_element" => (
            "Find elements by natural-language description, ranked by selector stability.",
            json!({"type":"object","properties":{
                "query": {"type":"string"},
                "strict_stability": {"type":"boolean","default":false},
                "near": {"type":"object","properties":{"selector":{"type":"string"},"direction":{"type":"string","enum":["above","below","left","right"]}}},
                "connection_id": conn_id_prop,
            },"required":["query"]}),
        ),
        "chrome_list_connections" => ("List all browser connections and the active one.", json!({"type":"object","properties":{}})),
        "chrome_switch_connection" => (
            "Mark a connection as active.",
            json!({"type":"object","properties":{"id":{"type":"string"}},"required":["id"]}),
        ),
        "chrome_disconnect" => (
            "Disconnect from a browser without killing it.",
            json!({"type":"object","properties":{"connection_id": conn_id_prop},"required":["connection_id"]}),
        ),
        "chrome" | "chrome_connect" => (
            "Connect to or launch a debuggable Chrome instance.",
            json!({"type":"object","properties":{
                "action": {"type":"string","enum":["connect","launch"]},
                "id": {"type":"string"},
                "host": {"type":"string","default":"localhost"},
                "port": {"type":"integer","default":9222},
                "headless": {"type":"boolean","default":true},
                "user_data_dir": {"type":"string"},
                "extra_args": {"type":"array","items":{"type":"string"}},
            },"required":["id"]}),
        ),
        "chrome_launch" => (
            "Launch a new Chrome instance and connect to it.",
            json!({"type":"object","properties":{
                "id": {"type":"string"},
                "port": {"type":"integer","default":9222},
                "headless": {"type":"boolean","default":true},
                "user_data_dir": {"type":"string"},
                "extra_args": {"type":"array","items":{"type":"string"}},
            },"required":["id"]}),
        ),
        "target" | "list_targets" | "switch_target" => (
            "List or switch the active page target for a connection.",
            json!({"type":"object","properties":{
                "action": {"type":"string","enum":["list","switch"]},
                "target_id": {"type":"string"},
                "connection_id": conn_id_prop,
            }}),
        ),
        "enable_debug_tools" | "debugger_enable" => (
            "Enable the CDP debugger for a connection.",
            json!({"type":"object","properties":{"connection_id": conn_id_prop}}),
        ),
        "breakpoint" | "debugger_set_breakpoint" | "debugger_remove_breakpoint" => (
            "Set or remove a breakpoint.",
            json!({"type":"object","properties":{
                "action": {"type":"string","enum":["set","remove"]},
                "url": {"type":"string"},
                "line_number": {"type":"integer"},
                "column_number": {"type":"integer"},
                "condition": {"type":"string"},
                "breakpoint_id": {"type":"string"},
                "connection_id": conn_id_prop,
            }}),
        ),
        "step" | "debugger_step_over" | "debugger_step_into" | "debugger_step_out" => (
            "Step the paused debugger one frame.",
            json!({"type":"object","properties":{
                "direction": {"type":"string","enum":["over","into","out"]},
                "connection_id": conn_id_prop,
            }}),
        ),
        "execution" | "debugger_resume" | "debugger_pause" => (
            "Resume or pause execution.",
            json!({"type":"object","properties":{
                "action": {"type":"string","enum":["resume","pause"]},
                "connection_id": conn_id_prop,
            }}),
        ),
        "call_stack" | "debugger_get_call_stack" => (
            "Read the current paused call stack and locals.",
            json!({"type":"object","properties":{"connection_id": conn_id_prop}}),
        ),
        "evaluate" | "debugger_evaluate_on_call_frame" => (
            "Evaluate an expression in a paused call frame.",
            json!({"type":"object","properties":{
                "call_frame_id": {"type":"string"},
                "expression": {"type":"string"},
                "connection_id": conn_id_prop,
            },"required":["call_frame_id","expression"]}),
        ),
        "pause_on_exceptions" | "debugger_set_pause_on_exceptions" => (
            "Configure exception-pause behaviour.",
            json!({"type":"object","properties":{
                "state": {"type":"string","enum":["none","uncaught","all"]},
                "connection_id": conn_id_prop,
            },"required":["state"]}),
        ),
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_active_tool_name_resolves_to_a_schema() {
        // Registry::new() panics internally (validate()) if any active name
        // lacks a schema; constructing one at all is part of the assertion.
        let smart = Registry { set: ToolSet::Smart };
        smart.validate();
        let legacy = Registry { set: ToolSet::Legacy };
        legacy.validate();
    }

    #[test]
    fn smart_set_excludes_legacy_only_names_and_vice_versa() {
        let smart = Registry { set: ToolSet::Smart };
        let smart_names = smart.list().into_iter().map(|t| t.name).collect::<Vec<_>>();
        assert!(smart_names.contains(&"chrome"));
        assert!(smart_names.contains(&"query_elements"));
        assert!(!smart_names.contains(&"chrome_connect"));

        let legacy = Registry { set: ToolSet::Legacy };
        let legacy_names = legacy.list().into_iter().map(|t| t.name).collect::<Vec<_>>();
        assert!(legacy_names.contains(&"chrome_connect"));
        assert!(legacy_names.contains(&"query_elements"));
        assert!(!legacy_names.contains(&"chrome"));
    }

    #[tokio::test]
    async fn dispatch_rejects_unknown_tool_name() {
        let registry = Registry { set: ToolSet::Smart };
        let mut manager = ConnectionManager::new();
        let result = registry.dispatch(&mut manager, "not_a_real_tool", &json!({})).await;
        assert_eq!(result.is_error, Some(true));
        assert_eq!(result.error_type, Some("UNKNOWN"));
    }

    #[tokio::test]
    async fn dispatch_surfaces_connection_errors_for_known_tool_with_no_connection() {
        let registry = Registry { set: ToolSet::Smart };
        let mut manager = ConnectionManager::new();
        let result = registry.dispatch(&mut manager, "query_elements", &json!({"selector": "button"})).await;
        assert_eq!(result.is_error, Some(true));
        assert_eq!(result.error_type, Some("CONNECTION"));
        assert_eq!(result.tool_name.as_deref(), Some("query_elements"));
    }
}
