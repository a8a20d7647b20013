//! The per-connection data model (spec §3).

use std::collections::BTreeMap;
use std::time::{Instant, SystemTime};

use crate::cdp::debugger::PausedEvent;

/// A single captured `console.*` call. Inserted synchronously at event
/// delivery time (spec §3, §5); `stack_trace` may be attached later by a
/// background enrichment task.
#[derive(Debug, Clone)]
pub struct ConsoleMessage {
    pub level: String,
    pub text: String,
    pub timestamp: SystemTime,
    pub navigation_epoch: u64,
    pub url: Option<String>,
    pub line_number: Option<u32>,
    pub stack_locations: Vec<StackLocation>,
    /// Filled in asynchronously for `error`-level messages once the first
    /// argument's `.stack` has been resolved (spec §3, §5).
    pub stack_trace: Option<String>,
}

#[derive(Debug, Clone)]
pub struct StackLocation {
    pub function_name: String,
    pub url: String,
    pub line_number: u32,
}

#[derive(Debug, Clone)]
pub struct BreakpointInfo {
    pub url: String,
    /// 1-indexed, tool-facing (spec §9).
    pub line_number: u32,
    pub column_number: Option<u32>,
    pub condition: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ElementSnapshot {
    pub tag: String,
    pub text: String,
    pub visible: bool,
    pub disabled: Option<bool>,
    pub value: Option<String>,
    pub classes: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct ElementCounts {
    pub total: usize,
    pub buttons: usize,
    pub inputs: usize,
    pub links: usize,
    pub forms: usize,
    pub visible: usize,
}

#[derive(Debug, Clone)]
pub struct DomSnapshot {
    pub timestamp: Instant,
    pub navigation_epoch: u64,
    pub counts: ElementCounts,
    /// Keyed by synthetic `"selector[i]"` strings (spec §3).
    pub key_elements: BTreeMap<String, ElementSnapshot>,
}

/// What the connection manager's debugger state machine currently is.
#[derive(Debug, Clone)]
pub enum PausedState {
    None,
    Paused(PausedEvent),
}

impl PausedState {
    pub fn is_paused(&self) -> bool {
        matches!(self, PausedState::Paused(_))
    }
}

impl Default for PausedState {
    fn default() -> Self {
        PausedState::None
    }
}

/// Every CDP-level registration a session needs to survive a target switch.
#[derive(Debug, Default)]
pub struct DebuggerState {
    pub enabled: bool,
    pub paused: PausedState,
    pub breakpoints: BTreeMap<String, BreakpointInfo>,
    pub pause_on_exceptions: PauseOnExceptions,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PauseOnExceptions {
    #[default]
    None,
    Uncaught,
    All,
}
