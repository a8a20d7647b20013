//! `chrome*`/`target*`/`list_targets`/`switch_target` tool family (spec
//! §4.G): connection lifecycle, active selection, target enumeration.

use serde_json::Value;

use crate::browser;
use crate::cdp::target::TargetId;
use crate::error::ToolError;
use crate::formatter::success;
use crate::manager::ConnectionManager;

use super::{connection_id, opt_bool, opt_u32, require_enum, require_str, HandlerResult};

pub async fn connect(manager: &mut ConnectionManager, args: &Value) -> HandlerResult {
    let id = require_str(args, "id")?;
    let host = args.get("host").and_then(Value::as_str).unwrap_or("localhost");
    let port = opt_u32(args, "port", 9222) as u16;
    let status = manager.connect(id, host, port).await?;
    Ok(success(status))
}

pub async fn launch(manager: &mut ConnectionManager, args: &Value) -> HandlerResult {
    let id = require_str(args, "id")?;
    let port = opt_u32(args, "port", 9222) as u16;
    let headless = opt_bool(args, "headless", true);
    let user_data_dir = args.get("user_data_dir").and_then(Value::as_str).map(Into::into);
    let extra_args: Vec<String> = args
        .get("extra_args")
        .and_then(Value::as_array)
        .map(|a| a.iter().filter_map(Value::as_str).map(str::to_string).collect())
        .unwrap_or_default();
    let status = manager.launch(id, port, headless, user_data_dir, extra_args).await?;
    Ok(success(status))
}

pub async fn disconnect(manager: &mut ConnectionManager, args: &Value) -> HandlerResult {
    let id = connection_id(args).ok_or_else(|| ToolError::connection("an explicit 'connection_id' is required to disconnect"))?;
    let status = manager.disconnect(&id).await?;
    Ok(success(status))
}

pub async fn list_connections(manager: &ConnectionManager, _args: &Value) -> HandlerResult {
    let mut out = String::from("Connections:\n");
    let list = manager.list();
    if list.is_empty() {
        out.push_str("  (none)\n");
    }
    for (id, active) in list {
        out.push_str(&format!("  - {id}{}\n", if active { " (active)" } else { "" }));
    }
    Ok(success(out))
}

pub async fn switch_connection(manager: &mut ConnectionManager, args: &Value) -> HandlerResult {
    let id = require_str(args, "id")?;
    manager.switch_active(id)?;
    Ok(success(format!("active connection is now '{id}'")))
}

pub async fn list_targets(manager: &ConnectionManager, args: &Value) -> HandlerResult {
    let id = connection_id(args);
    let conn = manager.get_connection_or_throw(id.as_deref())?;
    let (host, port) = {
        let conn = conn.lock().await;
        (conn.host.clone(), conn.port)
    };
    let targets = browser::fetch_target_list(&host, port).await.map_err(ToolError::from)?;
    let mut out = String::from("Targets:\n");
    for t in targets {
        out.push_str(&format!("  - {} [{}] {}\n", t.id, t.kind, t.url));
    }
    Ok(success(out))
}

pub async fn switch_target(manager: &ConnectionManager, args: &Value) -> HandlerResult {
    let id = connection_id(args);
    let target_id = require_str(args, "target_id")?;
    manager.switch_page(id.as_deref(), TargetId(target_id.to_string())).await?;
    Ok(success(format!("switched to target '{target_id}'")))
}

/// Smart-set `chrome(action: connect|launch, ...)` (spec §4.G).
pub async fn chrome_action(manager: &mut ConnectionManager, args: &Value) -> HandlerResult {
    match require_enum(args, "action", &["connect", "launch"])? {
        "connect" => connect(manager, args).await,
        "launch" => launch(manager, args).await,
        _ => unreachable!(),
    }
}

/// Smart-set `target(action: list|switch, ...)` (spec §4.G).
pub async fn target_action(manager: &ConnectionManager, args: &Value) -> HandlerResult {
    match require_enum(args, "action", &["list", "switch"])? {
        "list" => list_targets(manager, args).await,
        "switch" => switch_target(manager, args).await,
        _ => unreachable!(),
    }
}
