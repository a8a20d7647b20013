//! Minimal, hand-written Chrome DevTools Protocol surface.
//!
//! Only the domains this server actually speaks are modelled here:
//! `Target`, `Page`, `Debugger`, `Runtime`. The shapes mirror the
//! generated-protocol style of a typical CDP client crate (doc-commented
//! params structs, `camelCase` wire format, a `Method`/`Command` trait pair)
//! without pulling in a full protocol-description code generator, since
//! spec §6 enumerates a fixed, small set of domains/methods.

use std::borrow::Cow;
use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

pub mod debugger;
pub mod page;
pub mod runtime;
pub mod target;

/// The whole string identifier for a CDP method, e.g. `Debugger.resume`.
pub trait Method {
    fn identifier(&self) -> Cow<'static, str>;
}

/// A command that expects a typed response from the browser.
pub trait Command: Serialize + Method {
    type Response: DeserializeOwned + fmt::Debug;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CallId(pub usize);

/// A message sent to the browser over the WebSocket.
#[derive(Debug, Serialize)]
pub struct MethodCall {
    pub id: CallId,
    #[serde(rename = "sessionId", skip_serializing_if = "Option::is_none")]
    pub session_id: Option<target::SessionId>,
    pub method: Cow<'static, str>,
    pub params: serde_json::Value,
}

/// A response to a [`MethodCall`], still holding the raw JSON result.
#[derive(Debug, Clone, Deserialize)]
pub struct Response {
    pub id: CallId,
    #[serde(default)]
    pub result: Option<serde_json::Value>,
    #[serde(default)]
    pub error: Option<ResponseError>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResponseError {
    pub code: i64,
    pub message: String,
}

impl fmt::Display for ResponseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CDP error {}: {}", self.code, self.message)
    }
}

impl std::error::Error for ResponseError {}

/// An out-of-band notification pushed by the browser.
#[derive(Debug, Clone, Deserialize)]
pub struct EventMessage {
    pub method: Cow<'static, str>,
    #[serde(rename = "sessionId", default)]
    pub session_id: Option<target::SessionId>,
    #[serde(default)]
    pub params: serde_json::Value,
}

/// Either half of what can arrive on the wire.
#[derive(Debug, Clone)]
pub enum WireMessage {
    Response(Response),
    Event(EventMessage),
}

impl<'de> Deserialize<'de> for WireMessage {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let value = serde_json::Value::deserialize(deserializer)?;
        if value.get("id").is_some() {
            serde_json::from_value(value)
                .map(WireMessage::Response)
                .map_err(serde::de::Error::custom)
        } else {
            serde_json::from_value(value)
                .map(WireMessage::Event)
                .map_err(serde::de::Error::custom)
        }
    }
}
