//! JSON-RPC 2.0 request/response shapes for the two methods this server
//! speaks: `tools/list` and `tools/call` (spec §4.I, §6). Framing itself
//! (how requests are delimited on stdio) lives in `main`; this module only
//! describes the message bodies.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Deserialize)]
pub struct Request {
    #[allow(dead_code)]
    pub jsonrpc: Option<String>,
    pub id: Option<Value>,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct Response {
    pub jsonrpc: &'static str,
    pub id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

impl Response {
    pub fn success(id: Value, result: Value) -> Self {
        Self { jsonrpc: "2.0", id, result: Some(result), error: None }
    }

    pub fn failure(id: Value, code: i64, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result: None,
            error: Some(RpcError { code, message: message.into() }),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
}

/// One entry of a `tools/list` response (spec §6).
#[derive(Debug, Clone, Serialize)]
pub struct ToolDefinition {
    pub name: &'static str,
    pub description: &'static str,
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

/// The shape a `tools/call` result renders to (spec §4.H, §6).
#[derive(Debug, Clone, Serialize)]
pub struct CallToolResult {
    pub content: Vec<ContentBlock>,
    #[serde(rename = "isError", skip_serializing_if = "Option::is_none")]
    pub is_error: Option<bool>,
    #[serde(rename = "_toolName", skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    #[serde(rename = "_errorType", skip_serializing_if = "Option::is_none")]
    pub error_type: Option<&'static str>,
    #[serde(rename = "_recoverable", skip_serializing_if = "Option::is_none")]
    pub recoverable: Option<bool>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ContentBlock {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub text: String,
}

impl CallToolResult {
    pub fn ok(text: String) -> Self {
        Self {
            content: vec![ContentBlock { kind: "text", text }],
            is_error: None,
            tool_name: None,
            error_type: None,
            recoverable: None,
        }
    }

    pub fn err(text: String, tool_name: String, error_type: &'static str, recoverable: bool) -> Self {
        Self {
            content: vec![ContentBlock { kind: "text", text }],
            is_error: Some(true),
            tool_name: Some(tool_name),
            error_type: Some(error_type),
            recoverable: Some(recoverable),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_response_omits_error_field() {
        let resp = Response::success(Value::from(1), serde_json::json!({"ok": true}));
        let value = serde_json::to_value(&resp).unwrap();
        assert!(value.get("error").is_none());
        assert_eq!(value["result"]["ok"], true);
    }

    #[test]
    fn failure_response_omits_result_field() {
        let resp = Response::failure(Value::from(1), -32601, "method not found: foo");
        let value = serde_json::to_value(&resp).unwrap();
        assert!(value.get("result").is_none());
        assert_eq!(value["error"]["code"], -32601);
    }

    #[test]
    fn ok_result_has_no_error_markers() {
        let result = CallToolResult::ok("done".to_string());
        assert!(result.is_error.is_none());
        assert_eq!(result.content[0].text, "done");
    }

    #[test]
    fn err_result_carries_tool_name_and_kind() {
        let result = CallToolResult::err("boom".to_string(), "navigate".to_string(), "EXECUTION", true);
        assert_eq!(result.is_error, Some(true));
        assert_eq!(result.tool_name.as_deref(), Some("navigate"));
        assert_eq!(result.error_type, Some("EXECUTION"));
        assert_eq!(result.recoverable, Some(true));
    }
}
