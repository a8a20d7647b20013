//! `Target` domain identifiers.
//!
//! The server dials a dedicated WebSocket per page target (the
//! `webSocketDebuggerUrl` from `/json/list`) rather than multiplexing
//! through the browser-level endpoint, so no `Target.*` commands are
//! needed: switching the active page means dialing a new target's own
//! socket. These newtypes remain the shared vocabulary for target/session
//! identity across the other domains.
//! <https://chromedevtools.github.io/devtools-protocol/tot/Target/>

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TargetId(pub String);

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl From<String> for TargetId {
    fn from(s: String) -> Self {
        TargetId(s)
    }
}

impl From<String> for SessionId {
    fn from(s: String) -> Self {
        SessionId(s)
    }
}

impl std::fmt::Display for TargetId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
