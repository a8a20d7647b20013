//! `Page` domain: navigation and its lifecycle events.
//! <https://chromedevtools.github.io/devtools-protocol/tot/Page/>

use serde::{Deserialize, Serialize};

use super::{Command, Method};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FrameId(pub String);

/// `Page.navigate` - navigates the page to the given URL.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NavigateParams {
    pub url: String,
}

impl NavigateParams {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

impl<T: Into<String>> From<T> for NavigateParams {
    fn from(url: T) -> Self {
        NavigateParams::new(url)
    }
}

impl Method for NavigateParams {
    fn identifier(&self) -> std::borrow::Cow<'static, str> {
        "Page.navigate".into()
    }
}

impl Command for NavigateParams {
    type Response = NavigateReturns;
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NavigateReturns {
    pub frame_id: FrameId,
    #[serde(default)]
    pub error_text: Option<String>,
}

/// `Page.enable` - enables page domain notifications (frameNavigated, loadEventFired, ...).
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnableParams {}

impl Method for EnableParams {
    fn identifier(&self) -> std::borrow::Cow<'static, str> {
        "Page.enable".into()
    }
}

impl Command for EnableParams {
    type Response = serde_json::Value;
}

/// Fired for top-level navigations. Used to bump the navigation epoch.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameNavigatedEvent {
    pub frame: FrameInfo,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameInfo {
    pub id: FrameId,
    #[serde(default)]
    pub parent_id: Option<FrameId>,
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoadEventFiredEvent {
    pub timestamp: f64,
}
