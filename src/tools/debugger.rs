//! Debugger tool family (spec §4.G): `enable_debug_tools`, `breakpoint`,
//! `step`, `execution`, `call_stack`, `evaluate`, `pause_on_exceptions`, and
//! their legacy per-verb equivalents.

use serde_json::Value;

use crate::cdp::debugger::{
    CallFrame, CallFrameId, EvaluateOnCallFrameParams, PauseParams, PauseState, ResumeParams,
    SetPauseOnExceptionsParams, StepIntoParams, StepOutParams, StepOverParams,
};
use crate::cdp::runtime::{GetPropertiesParams, PropertyDescriptor};
use crate::context;
use crate::error::ToolError;
use crate::formatter::success;
use crate::manager::{ConnectionManager, STEP_SETTLE_WAIT};
use crate::state::ConsoleMessage;

use super::{connection_id, opt_u32, require_enum, require_str, HandlerResult};

pub async fn enable_debug_tools(manager: &ConnectionManager, args: &Value) -> HandlerResult {
    let id = connection_id(args);
    manager.enable_debugger(id.as_deref()).await?;
    Ok(success("debugger enabled"))
}

pub async fn breakpoint_set(manager: &ConnectionManager, args: &Value) -> HandlerResult {
    let id = connection_id(args);
    let url = require_str(args, "url")?;
    let line_number = opt_u32(args, "line_number", 1);
    let column_number = args.get("column_number").and_then(Value::as_u64).map(|n| n as u32);
    let condition = args.get("condition").and_then(Value::as_str).map(str::to_string);

    let (breakpoint_id, resolved_line) = manager
        .set_breakpoint(id.as_deref(), url, line_number, column_number, condition)
        .await?;

    Ok(success(format!("breakpoint '{breakpoint_id}' set at {url}:{resolved_line}")))
}

pub async fn breakpoint_remove(manager: &ConnectionManager, args: &Value) -> HandlerResult {
    let id = connection_id(args);
    let breakpoint_id = require_str(args, "breakpoint_id")?;
    manager.remove_breakpoint(id.as_deref(), breakpoint_id).await?;
    Ok(success(format!("breakpoint '{breakpoint_id}' removed")))
}

pub async fn breakpoint_action(manager: &ConnectionManager, args: &Value) -> HandlerResult {
    match require_enum(args, "action", &["set", "remove"])? {
        "set" => breakpoint_set(manager, args).await,
        "remove" => breakpoint_remove(manager, args).await,
        _ => unreachable!(),
    }
}

async fn local_scope_properties(
    manager: &ConnectionManager,
    id: Option<&str>,
    frame: &CallFrame,
) -> Result<Vec<PropertyDescriptor>, ToolError> {
    let Some(scope) = frame.scope_chain.iter().find(|s| s.kind == "local") else {
        return Ok(Vec::new());
    };
    let Some(object_id) = scope.object.object_id.clone() else {
        return Ok(Vec::new());
    };
    let conn = manager.get_connection_or_throw(id)?;
    let transport = {
        let conn = conn.lock().await;
        conn.transport.clone()
    };
    let returns = transport
        .execute(GetPropertiesParams { object_id, own_properties: Some(true) }, None)
        .await
        .map_err(ToolError::from)?;
    Ok(returns.result)
}

async fn recent_console(manager: &ConnectionManager, id: Option<&str>) -> Vec<ConsoleMessage> {
    let Ok(conn) = manager.get_connection_or_throw(id) else { return Vec::new() };
    let conn = conn.lock().await;
    conn.console.clone()
}

pub async fn call_stack(manager: &ConnectionManager, args: &Value) -> HandlerResult {
    let id = connection_id(args);
    let paused = manager.require_paused(id.as_deref()).await?;
    let locals = match paused.call_frames.first() {
        Some(frame) => local_scope_properties(manager, id.as_deref(), frame).await?,
        None => Vec::new(),
    };
    let console = recent_console(manager, id.as_deref()).await;
    let text = context::pause_context(&paused.call_frames, &paused.reason, &locals, &console);
    Ok(super::guarded(text, None))
}

pub async fn evaluate(manager: &ConnectionManager, args: &Value) -> HandlerResult {
    let id = connection_id(args);
    manager.require_paused(id.as_deref()).await?;
    let call_frame_id = require_str(args, "call_frame_id")?;
    let expression = require_str(args, "expression")?;

    let conn = manager.get_connection_or_throw(id.as_deref())?;
    let transport = {
        let conn = conn.lock().await;
        conn.transport.clone()
    };

    let returns = transport
        .execute(
            EvaluateOnCallFrameParams {
                call_frame_id: CallFrameId(call_frame_id.to_string()),
                expression: expression.to_string(),
            },
            None,
        )
        .await
        .map_err(ToolError::from)?;

    if let Some(details) = returns.exception_details {
        return Err(ToolError::execution(format!("evaluation threw: {details}")));
    }

    let rendered = match &returns.result.value {
        Some(v) => v.to_string(),
        None => returns.result.description.clone().unwrap_or_else(|| format!("<{}>", returns.result.kind)),
    };
    Ok(super::guarded(rendered, None))
}

pub async fn step(manager: &ConnectionManager, args: &Value) -> HandlerResult {
    let id = connection_id(args);
    let direction = require_enum(args, "direction", &["over", "into", "out"])?.to_string();
    manager.require_paused(id.as_deref()).await?;

    let conn = manager.get_connection_or_throw(id.as_deref())?;
    let transport = {
        let conn = conn.lock().await;
        conn.transport.clone()
    };

    match direction.as_str() {
        "over" => transport.execute(StepOverParams::default(), None).await.map_err(ToolError::from)?,
        "into" => transport.execute(StepIntoParams::default(), None).await.map_err(ToolError::from)?,
        "out" => transport.execute(StepOutParams::default(), None).await.map_err(ToolError::from)?,
        _ => unreachable!(),
    };

    tokio::time::sleep(STEP_SETTLE_WAIT).await;

    let paused = manager.require_paused(id.as_deref()).await?;
    let locals = match paused.call_frames.first() {
        Some(frame) => local_scope_properties(manager, id.as_deref(), frame).await?,
        None => Vec::new(),
    };
    let console = recent_console(manager, id.as_deref()).await;

    let previous = {
        let conn = conn.lock().await;
        conn.previous_step_vars.clone()
    };
    let (text, new_cache) = context::step_context(&paused.call_frames, &paused.reason, &locals, &console, &previous);
    {
        let mut conn = conn.lock().await;
        conn.previous_step_vars = new_cache;
    }

    Ok(super::guarded(text, None))
}

pub async fn execution_pause(manager: &ConnectionManager, args: &Value) -> HandlerResult {
    let id = connection_id(args);
    manager.get_cdp_session_or_throw(id.as_deref()).await?;
    manager.require_not_paused(id.as_deref()).await?;
    let conn = manager.get_connection_or_throw(id.as_deref())?;
    let transport = {
        let conn = conn.lock().await;
        conn.transport.clone()
    };
    transport.execute(PauseParams::default(), None).await.map_err(ToolError::from)?;
    Ok(success("pause requested"))
}

pub async fn execution_resume(manager: &ConnectionManager, args: &Value) -> HandlerResult {
    let id = connection_id(args);
    manager.require_paused(id.as_deref()).await?;
    let conn = manager.get_connection_or_throw(id.as_deref())?;
    let transport = {
        let conn = conn.lock().await;
        conn.transport.clone()
    };
    transport.execute(ResumeParams::default(), None).await.map_err(ToolError::from)?;
    Ok(success("resumed"))
}

pub async fn execution_action(manager: &ConnectionManager, args: &Value) -> HandlerResult {
    match require_enum(args, "action", &["resume", "pause"])? {
        "resume" => execution_resume(manager, args).await,
        "pause" => execution_pause(manager, args).await,
        _ => unreachable!(),
    }
}

pub async fn pause_on_exceptions(manager: &ConnectionManager, args: &Value) -> HandlerResult {
    let id = connection_id(args);
    let state = require_enum(args, "state", &["none", "uncaught", "all"])?;
    let pause_state = match state {
        "none" => PauseState::None,
        "uncaught" => PauseState::Uncaught,
        "all" => PauseState::All,
        _ => unreachable!(),
    };

    manager.get_cdp_session_or_throw(id.as_deref()).await?;
    let conn = manager.get_connection_or_throw(id.as_deref())?;
    let transport = {
        let conn = conn.lock().await;
        conn.transport.clone()
    };
    transport
        .execute(SetPauseOnExceptionsParams { state: pause_state.as_wire_str().to_string() }, None)
        .await
        .map_err(ToolError::from)?;

    let mut conn = conn.lock().await;
    conn.debugger.pause_on_exceptions = match pause_state {
        PauseState::None => crate::state::PauseOnExceptions::None,
        PauseState::Uncaught => crate::state::PauseOnExceptions::Uncaught,
        PauseState::All => crate::state::PauseOnExceptions::All,
    };

    Ok(success(format!("pause_on_exceptions set to '{state}'")))
}
