//! `Runtime` domain: console capture, object inspection, expression evaluation.
//! <https://chromedevtools.github.io/devtools-protocol/tot/Runtime/>

use serde::{Deserialize, Serialize};

use super::{Command, Method};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteObjectId(pub String);

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnableParams {}

impl Method for EnableParams {
    fn identifier(&self) -> std::borrow::Cow<'static, str> {
        "Runtime.enable".into()
    }
}

impl Command for EnableParams {
    type Response = serde_json::Value;
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct RemoteObject {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub subtype: Option<String>,
    #[serde(default)]
    pub class_name: Option<String>,
    #[serde(default)]
    pub value: Option<serde_json::Value>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub object_id: Option<RemoteObjectId>,
}

/// `Runtime.getProperties` - used to read local-scope variables off a call frame's scope object.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GetPropertiesParams {
    pub object_id: RemoteObjectId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub own_properties: Option<bool>,
}

impl Method for GetPropertiesParams {
    fn identifier(&self) -> std::borrow::Cow<'static, str> {
        "Runtime.getProperties".into()
    }
}

impl Command for GetPropertiesParams {
    type Response = GetPropertiesReturns;
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetPropertiesReturns {
    pub result: Vec<PropertyDescriptor>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertyDescriptor {
    pub name: String,
    #[serde(default)]
    pub value: Option<RemoteObject>,
}

/// `Runtime.evaluate` - evaluate an expression on the global object.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluateParams {
    pub expression: String,
}

impl EvaluateParams {
    pub fn new(expression: impl Into<String>) -> Self {
        Self {
            expression: expression.into(),
        }
    }
}

impl<T: Into<String>> From<T> for EvaluateParams {
    fn from(expr: T) -> Self {
        EvaluateParams::new(expr)
    }
}

impl Method for EvaluateParams {
    fn identifier(&self) -> std::borrow::Cow<'static, str> {
        "Runtime.evaluate".into()
    }
}

impl Command for EvaluateParams {
    type Response = EvaluateReturns;
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluateReturns {
    pub result: RemoteObject,
}

/// Fired for `console.*` calls in the page. This is the primary source of
/// [`crate::state::ConsoleMessage`] records.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsoleApiCalledEvent {
    #[serde(rename = "type")]
    pub level: String,
    pub args: Vec<RemoteObject>,
    pub timestamp: f64,
    #[serde(default)]
    pub stack_trace: Option<StackTrace>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StackTrace {
    #[serde(default)]
    pub call_frames: Vec<RuntimeCallFrame>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeCallFrame {
    pub function_name: String,
    pub url: String,
    pub line_number: u32,
    pub column_number: u32,
}
