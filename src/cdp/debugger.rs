//! `Debugger` domain: breakpoints, stepping, call stacks.
//! <https://chromedevtools.github.io/devtools-protocol/tot/Debugger/>

use serde::{Deserialize, Serialize};

use super::runtime::RemoteObject;
use super::{Command, Method};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScriptId(pub String);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreakpointId(pub String);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallFrameId(pub String);

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnableParams {}

impl Method for EnableParams {
    fn identifier(&self) -> std::borrow::Cow<'static, str> {
        "Debugger.enable".into()
    }
}

impl Command for EnableParams {
    type Response = serde_json::Value;
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DisableParams {}

impl Method for DisableParams {
    fn identifier(&self) -> std::borrow::Cow<'static, str> {
        "Debugger.disable".into()
    }
}

impl Command for DisableParams {
    type Response = serde_json::Value;
}

/// `Debugger.setBreakpointByUrl`. CDP lines/columns are 0-indexed;
/// the manager is responsible for converting at the boundary (spec §9).
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SetBreakpointByUrlParams {
    pub line_number: u32,
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column_number: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
}

impl Method for SetBreakpointByUrlParams {
    fn identifier(&self) -> std::borrow::Cow<'static, str> {
        "Debugger.setBreakpointByUrl".into()
    }
}

impl Command for SetBreakpointByUrlParams {
    type Response = SetBreakpointByUrlReturns;
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetBreakpointByUrlReturns {
    pub breakpoint_id: BreakpointId,
    pub locations: Vec<Location>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    pub script_id: ScriptId,
    pub line_number: u32,
    #[serde(default)]
    pub column_number: Option<u32>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoveBreakpointParams {
    pub breakpoint_id: BreakpointId,
}

impl Method for RemoveBreakpointParams {
    fn identifier(&self) -> std::borrow::Cow<'static, str> {
        "Debugger.removeBreakpoint".into()
    }
}

impl Command for RemoveBreakpointParams {
    type Response = serde_json::Value;
}

macro_rules! no_arg_command {
    ($name:ident, $method:expr) => {
        #[derive(Debug, Clone, Default, Serialize)]
        #[serde(rename_all = "camelCase")]
        pub struct $name {}

        impl Method for $name {
            fn identifier(&self) -> std::borrow::Cow<'static, str> {
                $method.into()
            }
        }

        impl Command for $name {
            type Response = serde_json::Value;
        }
    };
}

no_arg_command!(StepOverParams, "Debugger.stepOver");
no_arg_command!(StepIntoParams, "Debugger.stepInto");
no_arg_command!(StepOutParams, "Debugger.stepOut");
no_arg_command!(ResumeParams, "Debugger.resume");
no_arg_command!(PauseParams, "Debugger.pause");

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PauseState {
    None,
    Uncaught,
    All,
}

impl PauseState {
    /// The tool-facing `all` state maps to CDP's `caught` wire value, not
    /// `all` (spec §4.G `pause_on_exceptions`).
    pub fn as_wire_str(self) -> &'static str {
        match self {
            PauseState::None => "none",
            PauseState::Uncaught => "uncaught",
            PauseState::All => "caught",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SetPauseOnExceptionsParams {
    pub state: String,
}

impl Method for SetPauseOnExceptionsParams {
    fn identifier(&self) -> std::borrow::Cow<'static, str> {
        "Debugger.setPauseOnExceptions".into()
    }
}

impl Command for SetPauseOnExceptionsParams {
    type Response = serde_json::Value;
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluateOnCallFrameParams {
    pub call_frame_id: CallFrameId,
    pub expression: String,
}

impl Method for EvaluateOnCallFrameParams {
    fn identifier(&self) -> std::borrow::Cow<'static, str> {
        "Debugger.evaluateOnCallFrame".into()
    }
}

impl Command for EvaluateOnCallFrameParams {
    type Response = EvaluateOnCallFrameReturns;
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluateOnCallFrameReturns {
    pub result: RemoteObject,
    #[serde(default)]
    pub exception_details: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallFrame {
    pub call_frame_id: CallFrameId,
    pub function_name: String,
    pub location: Location,
    pub url: String,
    pub scope_chain: Vec<Scope>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scope {
    #[serde(rename = "type")]
    pub kind: String,
    pub object: RemoteObject,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PausedEvent {
    pub call_frames: Vec<CallFrame>,
    pub reason: String,
    #[serde(default)]
    pub hit_breakpoints: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ResumedEvent {}
