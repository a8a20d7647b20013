//! Two error types at two different altitudes:
//!
//! - [`CdpError`] is the low-level transport/protocol error, raised by
//!   [`crate::conn::Transport`] and the browser-launch code.
//! - [`ToolError`] is the tool-facing taxonomy from spec §4.A, the only
//!   shape the dispatcher (§4.H) ever renders back to the agent.

use std::io;

use async_tungstenite::tungstenite;
use thiserror::Error;

use crate::cdp::ResponseError;

pub type Result<T, E = CdpError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum CdpError {
    #[error("{0}")]
    Ws(#[from] tungstenite::Error),
    #[error("{0}")]
    Io(#[from] io::Error),
    #[error("{0}")]
    Serde(#[from] serde_json::Error),
    #[error("{0}")]
    Http(#[from] reqwest::Error),
    #[error("{0}")]
    Protocol(#[from] ResponseError),
    #[error("received no response from the chromium instance")]
    NoResponse,
    #[error("the connection to the chromium instance was closed")]
    Closed,
    #[error("timed out waiting for a response after {0:?}")]
    Timeout(std::time::Duration),
    #[error("{0}")]
    Msg(String),
}

impl CdpError {
    pub fn msg(s: impl Into<String>) -> Self {
        CdpError::Msg(s.into())
    }
}

/// The error kinds a tool handler is allowed to raise (spec §4.A). The
/// dispatcher is the sole place that turns one of these into response text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Connection,
    Debugger,
    StatePaused,
    StateRunning,
    Execution,
    Unknown,
}

impl ErrorKind {
    pub fn recoverable(self) -> bool {
        !matches!(self, ErrorKind::Unknown)
    }

    pub fn hint(self) -> Option<&'static str> {
        match self {
            ErrorKind::Connection => Some("connect or launch first"),
            ErrorKind::Debugger => Some("enable debug tools first"),
            ErrorKind::StatePaused => Some("resume or step"),
            ErrorKind::StateRunning => Some("set breakpoint or pause"),
            ErrorKind::Execution => None,
            ErrorKind::Unknown => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Connection => "CONNECTION",
            ErrorKind::Debugger => "DEBUGGER",
            ErrorKind::StatePaused => "STATE_PAUSED",
            ErrorKind::StateRunning => "STATE_RUNNING",
            ErrorKind::Execution => "EXECUTION",
            ErrorKind::Unknown => "UNKNOWN",
        }
    }
}

/// The error type every tool handler returns. Carries its own message so the
/// dispatcher doesn't need domain knowledge to render it, only the kind to
/// decide the hint/log level.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct ToolError {
    pub kind: ErrorKind,
    pub message: String,
}

impl ToolError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn connection(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Connection, message)
    }

    pub fn debugger(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Debugger, message)
    }

    pub fn state_paused(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::StatePaused, message)
    }

    pub fn state_running(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::StateRunning, message)
    }

    pub fn execution(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Execution, message)
    }

    pub fn unknown(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unknown, message)
    }
}

impl From<CdpError> for ToolError {
    fn from(err: CdpError) -> Self {
        ToolError::execution(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_errors_are_not_recoverable() {
        assert!(!ErrorKind::Unknown.recoverable());
        assert!(ErrorKind::Connection.recoverable());
        assert!(ErrorKind::StatePaused.recoverable());
    }

    #[test]
    fn state_kinds_carry_a_hint_but_execution_does_not() {
        assert_eq!(ErrorKind::StateRunning.hint(), Some("set breakpoint or pause"));
        assert_eq!(ErrorKind::Execution.hint(), None);
    }

    #[test]
    fn cdp_errors_become_execution_tool_errors() {
        let err: ToolError = CdpError::Closed.into();
        assert_eq!(err.kind, ErrorKind::Execution);
        assert!(err.message.contains("closed"));
    }
}
