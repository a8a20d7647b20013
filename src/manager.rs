//! The connection manager: multi-browser lifecycle, active-connection
//! selection, event hookup and the state-machine single enforcer (spec
//! §3, §4.F).
//!
//! Grounded on chromiumoxide's `Browser`/`Handler` split (`src/browser.rs`,
//! `src/handler/mod.rs` in the teacher) generalised from "one handler loop
//! per process" to "one entry per connection id, looked up by the request
//! dispatcher". Each [`Connection`]'s mutable fields live behind a
//! `tokio::sync::Mutex` because the background event task and the request
//! actor touch them from different tasks (spec §5: "any implementation
//! using real threads must serialise access... behind a per-connection
//! lock").

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;
use tokio::sync::Mutex;

use crate::browser::{self, LaunchOptions, TargetListEntry};
use crate::cdp::debugger::{self, PausedEvent};
use crate::cdp::page;
use crate::cdp::runtime::{self, ConsoleApiCalledEvent, GetPropertiesParams, RemoteObject};
use crate::cdp::target::{SessionId, TargetId};
use crate::conn::Transport;
use crate::error::{CdpError, ToolError};
use crate::state::{
    BreakpointInfo, ConsoleMessage, DebuggerState, DomSnapshot, PausedState, StackLocation,
};

static HMR_TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\[(HMR|WDS|vite)\]").unwrap());
static HMR_VERB_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)updat(e|ed|ing)").unwrap());

/// Everything the connection manager owns about one connected browser
/// (spec §3 `Connection`).
pub struct Connection {
    pub id: String,
    pub host: String,
    pub port: u16,
    pub transport: Transport,
    pub active_target: TargetId,
    pub cdp_session: Option<SessionId>,
    pub debugger: DebuggerState,
    pub console: Vec<ConsoleMessage>,
    pub navigation_epoch: u64,
    pub last_navigation: SystemTime,
    pub hmr_update_count: u64,
    pub last_hmr: Option<SystemTime>,
    pub last_query: Option<(SystemTime, u64)>,
    pub last_dom_snapshot: Option<DomSnapshot>,
    pub previous_step_vars: BTreeMap<String, String>,
    /// Bumped on every `switch_page`/reinstall so a stale event-loop task
    /// from a previous session can tell it's been superseded. Not part of
    /// the spec's data model; an implementation-only guard against the
    /// "reinstall listeners" requirement racing with an old task.
    generation: u64,
}

impl Connection {
    fn new(id: String, host: String, port: u16, transport: Transport, active_target: TargetId) -> Self {
        Self {
            id,
            host,
            port,
            transport,
            active_target,
            cdp_session: None,
            debugger: DebuggerState::default(),
            console: Vec::new(),
            navigation_epoch: 0,
            last_navigation: SystemTime::now(),
            hmr_update_count: 0,
            last_hmr: None,
            last_query: None,
            last_dom_snapshot: None,
            previous_step_vars: BTreeMap::new(),
            generation: 0,
        }
    }
}

type Shared = Arc<Mutex<Connection>>;

/// Owns every connection the process has established. A single instance
/// lives for the server's lifetime; only the request actor calls the
/// lifecycle/enforcer methods, so the map itself needs no lock (spec §5).
pub struct ConnectionManager {
    /// Insertion-ordered so `list()` and disconnect-promotion (spec §4.F,
    /// Scenario F: connect A,B,C then disconnect A promotes B, not C) are
    /// deterministic rather than at the mercy of hash iteration order.
    connections: IndexMap<String, Shared>,
    active: Option<String>,
}

impl Default for ConnectionManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionManager {
    pub fn new() -> Self {
        Self { connections: IndexMap::new(), active: None }
    }

    fn resolve_id(&self, id: Option<&str>) -> Option<String> {
        match id {
            Some(id) => Some(id.to_string()),
            None => self.active.clone(),
        }
    }

    pub fn list(&self) -> Vec<(String, bool)> {
        self.connections
            .keys()
            .map(|id| (id.clone(), Some(id.as_str()) == self.active.as_deref()))
            .collect()
    }

    #[cfg(test)]
    pub fn connection_order(&self) -> Vec<String> {
        self.connections.keys().cloned().collect()
    }

    pub fn active_id(&self) -> Option<&str> {
        self.active.as_deref()
    }

    // ---- single-enforcer API (spec §4.F) -------------------------------

    pub fn get_connection_or_throw(&self, id: Option<&str>) -> Result<Shared, ToolError> {
        let id = self.resolve_id(id).ok_or_else(|| {
            ToolError::connection("no active connection; connect or launch first")
        })?;
        self.connections
            .get(&id)
            .cloned()
            .ok_or_else(|| ToolError::connection(format!("no connection named '{id}'")))
    }

    pub async fn get_page_or_throw(&self, id: Option<&str>) -> Result<TargetId, ToolError> {
        let conn = self.get_connection_or_throw(id)?;
        let conn = conn.lock().await;
        Ok(conn.active_target.clone())
    }

    pub async fn get_cdp_session_or_throw(&self, id: Option<&str>) -> Result<SessionId, ToolError> {
        let conn = self.get_connection_or_throw(id)?;
        let conn = conn.lock().await;
        conn.cdp_session
            .clone()
            .ok_or_else(|| ToolError::debugger("debugger not enabled; call enable_debug_tools first"))
    }

    pub async fn require_paused(&self, id: Option<&str>) -> Result<PausedEvent, ToolError> {
        self.get_cdp_session_or_throw(id).await?;
        let conn = self.get_connection_or_throw(id)?;
        let conn = conn.lock().await;
        match &conn.debugger.paused {
            PausedState::Paused(ev) => Ok(ev.clone()),
            PausedState::None => Err(ToolError::state_running("execution is not paused; set a breakpoint or pause")),
        }
    }

    pub async fn require_not_paused(&self, id: Option<&str>) -> Result<(), ToolError> {
        let conn = self.get_connection_or_throw(id)?;
        let conn = conn.lock().await;
        if conn.debugger.paused.is_paused() {
            Err(ToolError::state_paused("execution is paused; resume or step first"))
        } else {
            Ok(())
        }
    }

    // ---- lifecycle ------------------------------------------------------

    /// *Connect* (spec §4.F): attach to an already-running debuggable browser.
    pub async fn connect(&mut self, id: &str, host: &str, port: u16) -> Result<String, ToolError> {
        if self.connections.contains_key(id) {
            return Err(ToolError::connection(format!("connection '{id}' already exists")));
        }

        let version = browser::fetch_version(host, port).await.map_err(map_connect_err)?;
        let page = first_page_target(host, port).await?;
        let ws_url = page
            .web_socket_debugger_url
            .clone()
            .ok_or_else(|| ToolError::connection("page target has no debugger URL"))?;
        let (transport, events) = Transport::connect(&ws_url).await.map_err(map_connect_err)?;
        enable_page_domains(&transport).await?;

        let conn = Arc::new(Mutex::new(Connection::new(
            id.to_string(),
            host.to_string(),
            port,
            transport.clone(),
            TargetId(page.id.clone()),
        )));

        attach_event_loop(conn.clone(), events);

        self.connections.insert(id.to_string(), conn);
        if self.active.is_none() {
            self.active = Some(id.to_string());
        }

        Ok(format!("connected '{id}' to {} at {host}:{port} (page {})", version.browser, page.url))
    }

    /// *Launch* (spec §4.F): spawn Chrome, wait, then delegate to connect.
    pub async fn launch(
        &mut self,
        id: &str,
        port: u16,
        headless: bool,
        user_data_dir: Option<std::path::PathBuf>,
        extra_args: Vec<String>,
    ) -> Result<String, ToolError> {
        if self.connections.contains_key(id) {
            return Err(ToolError::connection(format!("connection '{id}' already exists")));
        }
        let opts = LaunchOptions { port, headless, user_data_dir, extra_args };
        let _child = browser::spawn(&opts).map_err(|e| ToolError::connection(e.to_string()))?;
        tokio::time::sleep(browser::LAUNCH_WAIT).await;
        self.connect(id, "localhost", port).await
    }

    /// *Disconnect* (spec §4.F): best-effort `Debugger.disable`, then detach.
    /// Never kills the Chrome process.
    pub async fn disconnect(&mut self, id: &str) -> Result<String, ToolError> {
        // `shift_remove` keeps the relative insertion order of the
        // remaining connections so the oldest-remaining promotion below is
        // deterministic (spec §4.F Scenario F).
        let conn = self
            .connections
            .shift_remove(id)
            .ok_or_else(|| ToolError::connection(format!("no connection named '{id}'")))?;

        {
            let conn = conn.lock().await;
            if conn.debugger.enabled {
                let _ = conn.transport.execute(debugger::DisableParams::default(), None).await;
            }
        }

        if self.active.as_deref() == Some(id) {
            self.active = self.connections.keys().next().cloned();
        }

        Ok(format!("disconnected '{id}'"))
    }

    pub fn switch_active(&mut self, id: &str) -> Result<(), ToolError> {
        if !self.connections.contains_key(id) {
            return Err(ToolError::connection(format!("no connection named '{id}'")));
        }
        self.active = Some(id.to_string());
        Ok(())
    }

    /// Target switching (spec §4.F `switchPage`): dials the new target's own
    /// debugger WebSocket, replacing the connection's transport, and rebinds
    /// the debugger if it was previously on.
    pub async fn switch_page(&self, id: Option<&str>, target_id: TargetId) -> Result<(), ToolError> {
        let conn = self.get_connection_or_throw(id)?;
        let (host, port) = {
            let conn = conn.lock().await;
            (conn.host.clone(), conn.port)
        };
        let targets = browser::fetch_target_list(&host, port).await.map_err(map_connect_err)?;
        let target = targets
            .into_iter()
            .find(|t| t.id == target_id.0)
            .ok_or_else(|| ToolError::connection(format!("no target '{}' on this browser", target_id.0)))?;
        let ws_url = target
            .web_socket_debugger_url
            .ok_or_else(|| ToolError::connection("target has no debugger URL"))?;
        let (transport, events) = Transport::connect(&ws_url).await.map_err(map_connect_err)?;
        enable_page_domains(&transport).await?;

        let was_debugger_enabled = {
            let mut conn = conn.lock().await;
            conn.transport = transport;
            conn.active_target = target_id;
            conn.navigation_epoch += 1;
            conn.console.clear();
            conn.hmr_update_count = 0;
            conn.last_hmr = None;
            conn.last_dom_snapshot = None;
            conn.cdp_session = None;
            conn.generation += 1;
            conn.debugger.enabled
        };
        attach_event_loop(conn.clone(), events);
        if was_debugger_enabled {
            self.enable_debugger(id).await?;
        }
        Ok(())
    }

    /// Debugger enable (spec §4.F): records the lazily-created CDP session
    /// marker, registers `Debugger.paused`/`resumed` exactly once per
    /// session (handled by the event loop, keyed off the page's own
    /// per-target socket so no `Target.attachToTarget` round trip is
    /// needed), sends `Debugger.enable`, and sets the flag. Idempotent.
    pub async fn enable_debugger(&self, id: Option<&str>) -> Result<(), ToolError> {
        let conn = self.get_connection_or_throw(id)?;
        let mut guard = conn.lock().await;
        if guard.cdp_session.is_none() {
            guard.cdp_session = Some(SessionId(guard.active_target.0.clone()));
        }
        let transport = guard.transport.clone();
        drop(guard);

        transport
            .execute(debugger::EnableParams::default(), None)
            .await
            .map_err(ToolError::from)?;

        let mut guard = conn.lock().await;
        guard.debugger.enabled = true;
        Ok(())
    }

    pub async fn set_breakpoint(
        &self,
        id: Option<&str>,
        url: &str,
        line_number: u32,
        column_number: Option<u32>,
        condition: Option<String>,
    ) -> Result<(String, u32), ToolError> {
        self.get_cdp_session_or_throw(id).await?;
        let conn = self.get_connection_or_throw(id)?;
        let transport = {
            let conn = conn.lock().await;
            conn.transport.clone()
        };

        let resp = transport
            .execute(
                debugger::SetBreakpointByUrlParams {
                    line_number: line_number.saturating_sub(1),
                    url: url.to_string(),
                    column_number,
                    condition: condition.clone(),
                },
                None,
            )
            .await
            .map_err(ToolError::from)?;

        let resolved_line = resp
            .locations
            .first()
            .map(|l| l.line_number + 1)
            .unwrap_or(line_number);

        let mut conn = conn.lock().await;
        conn.debugger.breakpoints.insert(
            resp.breakpoint_id.0.clone(),
            BreakpointInfo { url: url.to_string(), line_number, column_number, condition },
        );
        Ok((resp.breakpoint_id.0, resolved_line))
    }

    pub async fn remove_breakpoint(&self, id: Option<&str>, breakpoint_id: &str) -> Result<(), ToolError> {
        self.get_cdp_session_or_throw(id).await?;
        let conn = self.get_connection_or_throw(id)?;
        let transport = {
            let conn = conn.lock().await;
            conn.transport.clone()
        };
        transport
            .execute(
                debugger::RemoveBreakpointParams { breakpoint_id: debugger::BreakpointId(breakpoint_id.to_string()) },
                None,
            )
            .await
            .map_err(ToolError::from)?;
        let mut conn = conn.lock().await;
        conn.debugger.breakpoints.remove(breakpoint_id);
        Ok(())
    }

    /// Gives a tool handler exclusive, short-lived access to a connection's
    /// mutable state (used for everything the enforcer methods above don't
    /// already cover: console reads, DOM snapshot caching, step-variable
    /// caching).
    pub fn connection(&self, id: &str) -> Option<Shared> {
        self.connections.get(id).cloned()
    }
}

fn map_connect_err(err: CdpError) -> ToolError {
    ToolError::connection(err.to_string())
}

/// Enables the `Page` and `Runtime` domain notifications a freshly-dialed
/// target socket needs before `frameNavigated`/`consoleAPICalled` events
/// start flowing (spec §4.F "event hookup").
async fn enable_page_domains(transport: &Transport) -> Result<(), ToolError> {
    transport.execute(page::EnableParams::default(), None).await.map_err(ToolError::from)?;
    transport.execute(runtime::EnableParams::default(), None).await.map_err(ToolError::from)?;
    Ok(())
}

async fn first_page_target(host: &str, port: u16) -> Result<TargetListEntry, ToolError> {
    let targets = browser::fetch_target_list(host, port).await.map_err(map_connect_err)?;
    targets
        .into_iter()
        .find(|t| t.kind == "page")
        .ok_or_else(|| ToolError::connection("browser has no page targets"))
}

/// Spawns the per-connection background task that applies incoming CDP
/// events to connection state (spec §4.F "event hookup").
fn attach_event_loop(conn: Shared, mut events: tokio::sync::mpsc::UnboundedReceiver<crate::cdp::EventMessage>) {
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event.method.as_ref() {
                "Runtime.consoleAPICalled" => handle_console(&conn, event).await,
                "Page.frameNavigated" => handle_frame_navigated(&conn, event).await,
                "Debugger.paused" => handle_paused(&conn, event).await,
                "Debugger.resumed" => handle_resumed(&conn).await,
                _ => {}
            }
        }
    });
}

async fn handle_frame_navigated(conn: &Shared, event: crate::cdp::EventMessage) {
    let Ok(parsed) = serde_json::from_value::<page::FrameNavigatedEvent>(event.params) else { return };
    if parsed.frame.parent_id.is_some() {
        return; // only top-level navigations reset connection state (spec §4.F)
    }
    let mut conn = conn.lock().await;
    conn.navigation_epoch += 1;
    conn.console.clear();
    conn.hmr_update_count = 0;
    conn.last_hmr = None;
    conn.last_dom_snapshot = None;
    conn.last_navigation = SystemTime::now();
}

async fn handle_paused(conn: &Shared, event: crate::cdp::EventMessage) {
    let Ok(parsed) = serde_json::from_value::<PausedEvent>(event.params) else { return };
    tracing::info!(reason = %parsed.reason, "debugger paused");

    // Seed the step-variable cache from the locals already in scope at this
    // pause, so the first `step()` afterwards has a baseline to diff against
    // instead of treating every local as unchanged (spec §9 open question).
    let locals = local_scope_properties(conn, parsed.call_frames.first()).await;

    let mut conn = conn.lock().await;
    conn.previous_step_vars = crate::context::locals_snapshot(&locals);
    conn.debugger.paused = PausedState::Paused(parsed);
}

/// Fetches the `local` scope's own properties for `frame`, or an empty list
/// if there's no frame, no local scope, or the scope has no backing object.
async fn local_scope_properties(conn: &Shared, frame: Option<&debugger::CallFrame>) -> Vec<crate::cdp::runtime::PropertyDescriptor> {
    let Some(frame) = frame else { return Vec::new() };
    let Some(scope) = frame.scope_chain.iter().find(|s| s.kind == "local") else { return Vec::new() };
    let Some(object_id) = scope.object.object_id.clone() else { return Vec::new() };
    let transport = conn.lock().await.transport.clone();
    let Ok(returns) = transport.execute(GetPropertiesParams { object_id, own_properties: Some(true) }, None).await else {
        return Vec::new();
    };
    returns.result
}

async fn handle_resumed(conn: &Shared) {
    let mut conn = conn.lock().await;
    conn.debugger.paused = PausedState::None;
}

async fn handle_console(conn: &Shared, event: crate::cdp::EventMessage) {
    let Ok(parsed) = serde_json::from_value::<ConsoleApiCalledEvent>(event.params) else { return };

    let text = parsed
        .args
        .iter()
        .map(render_remote_object)
        .collect::<Vec<_>>()
        .join(" ");

    let stack_locations = parsed
        .stack_trace
        .as_ref()
        .map(|st| {
            st.call_frames
                .iter()
                .map(|f| StackLocation {
                    function_name: f.function_name.clone(),
                    url: f.url.clone(),
                    line_number: f.line_number + 1,
                })
                .collect()
        })
        .unwrap_or_default();

    let is_hmr = HMR_TAG_RE.is_match(&text) && HMR_VERB_RE.is_match(&text);
    let is_error = parsed.level == "error";

    let (index, transport, object_ids) = {
        let mut guard = conn.lock().await;
        if is_hmr {
            guard.hmr_update_count += 1;
            guard.last_hmr = Some(SystemTime::now());
        }
        let epoch = guard.navigation_epoch;
        let (url, line_number) = stack_locations
            .first()
            .map(|l: &StackLocation| (Some(l.url.clone()), Some(l.line_number)))
            .unwrap_or((None, None));

        guard.console.push(ConsoleMessage {
            level: parsed.level.clone(),
            text,
            timestamp: SystemTime::now(),
            navigation_epoch: epoch,
            url,
            line_number,
            stack_locations,
            stack_trace: None,
        });
        let index = guard.console.len() - 1;
        let object_ids = parsed
            .args
            .iter()
            .filter_map(|a| a.object_id.clone())
            .collect::<Vec<_>>();
        (index, guard.transport.clone(), object_ids)
    };

    if !is_error || object_ids.is_empty() {
        return;
    }

    // Fire-and-forget stack enrichment (spec §4.F, §5): resolve each
    // argument's `.stack` property and attach the first non-null one to the
    // record already inserted above.
    let conn = conn.clone();
    tokio::spawn(async move {
        for object_id in object_ids {
            let props = transport
                .execute(GetPropertiesParams { object_id, own_properties: Some(true) }, None)
                .await;
            let Ok(props) = props else { continue };
            if let Some(stack) = props
                .result
                .iter()
                .find(|p| p.name == "stack")
                .and_then(|p| p.value.as_ref())
                .and_then(|v| v.value.as_ref())
                .and_then(|v| v.as_str())
            {
                let mut guard = conn.lock().await;
                if let Some(msg) = guard.console.get_mut(index) {
                    msg.stack_trace = Some(stack.to_string());
                }
                return;
            }
        }
    });
}

fn render_remote_object(obj: &RemoteObject) -> String {
    if let Some(serde_json::Value::String(s)) = &obj.value {
        return s.clone();
    }
    if let Some(value) = &obj.value {
        return value.to_string();
    }
    if let Some(desc) = &obj.description {
        return desc.clone();
    }
    format!("<{}>", obj.kind)
}

/// Wait between a step/pause command and checking whether the debugger
/// re-paused (spec §4.G `step`).
pub const STEP_SETTLE_WAIT: Duration = Duration::from_millis(100);

#[cfg(test)]
mod tests {
    use super::*;

    fn stub_connection(id: &str) -> Shared {
        Arc::new(Mutex::new(Connection::new(
            id.to_string(),
            "localhost".to_string(),
            9222,
            Transport::test_stub(),
            TargetId(format!("target-{id}")),
        )))
    }

    fn manager_with(ids: &[&str], active: &str) -> ConnectionManager {
        let mut manager = ConnectionManager::new();
        for id in ids {
            manager.connections.insert(id.to_string(), stub_connection(id));
        }
        manager.active = Some(active.to_string());
        manager
    }

    #[tokio::test]
    async fn disconnect_promotes_oldest_remaining_connection() {
        // Scenario F (spec §3/§4.F): connect A, B, C in order, disconnect A,
        // B (not C) must become active.
        let mut manager = manager_with(&["a", "b", "c"], "a");

        manager.disconnect("a").await.unwrap();

        assert_eq!(manager.active_id(), Some("b"));
        assert_eq!(manager.connection_order(), vec!["b".to_string(), "c".to_string()]);
    }

    #[tokio::test]
    async fn disconnect_of_inactive_connection_leaves_active_untouched() {
        let mut manager = manager_with(&["a", "b"], "b");

        manager.disconnect("a").await.unwrap();

        assert_eq!(manager.active_id(), Some("b"));
    }

    #[tokio::test]
    async fn disconnect_unknown_id_errors() {
        let mut manager = manager_with(&["a"], "a");
        let err = manager.disconnect("ghost").await.unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::Connection);
    }

    #[test]
    fn list_reports_insertion_order_not_hash_order() {
        let manager = manager_with(&["z", "a", "m"], "a");
        assert_eq!(
            manager.list(),
            vec![
                ("z".to_string(), false),
                ("a".to_string(), true),
                ("m".to_string(), false),
            ]
        );
    }
}
