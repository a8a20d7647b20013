//! `navigate` tool (spec §4.G).

use std::time::Duration;

use serde_json::Value;

use crate::cdp::page::NavigateParams;
use crate::context;
use crate::error::ToolError;
use crate::extractors::{self, Category};
use crate::manager::ConnectionManager;

use super::{connection_id, evaluate_json, opt_bool, require_str, HandlerResult};

/// Wait after `Page.navigate` before reading page state, standing in for a
/// network-idle observer (spec §4.G "wait for network-idle").
const NAVIGATE_SETTLE_WAIT: Duration = Duration::from_millis(500);

pub async fn navigate(manager: &ConnectionManager, args: &Value) -> HandlerResult {
    let id = connection_id(args);
    let url = require_str(args, "url")?;
    let include_context = opt_bool(args, "include_context", true);

    let conn = manager.get_connection_or_throw(id.as_deref())?;
    let transport = {
        let conn = conn.lock().await;
        conn.transport.clone()
    };

    transport.execute(NavigateParams::new(url), None).await.map_err(ToolError::from)?;
    tokio::time::sleep(NAVIGATE_SETTLE_WAIT).await;

    let title_json = evaluate_json(&transport, "document.title".to_string()).await.unwrap_or_default();
    let mut out = format!("Navigated to {url}\n");

    if include_context {
        let recent_errors = {
            let conn = conn.lock().await;
            conn.console.clone()
        };

        let categories = [
            (Category::Focused, 5usize),
            (Category::Buttons, 10),
            (Category::Inputs, 10),
            (Category::Toggles, 10),
            (Category::Landmarks, 10),
            (Category::Tabs, 5),
            (Category::Alerts, 20),
            (Category::Modals, 20),
            (Category::Errors, 20),
        ];
        let mut results = Vec::with_capacity(categories.len());
        for (cat, limit) in categories {
            let script = extractors::build_script(cat, limit, None, false);
            let text = evaluate_json(&transport, script).await.unwrap_or_else(|_| {
                r#"{"items":[],"total":0,"truncated":false}"#.to_string()
            });
            let parsed: extractors::ExtractionResult =
                serde_json::from_str(&text).unwrap_or(extractors::ExtractionResult { items: vec![], total: 0, truncated: false });
            results.push(parsed);
        }
        let [focused, buttons, inputs, toggles, landmarks, tabs, alerts, modals, errors]: [extractors::ExtractionResult; 9] =
            results.try_into().unwrap_or_else(|_| unreachable!());

        let summary = context::page_summary(&focused, &buttons, &inputs, &toggles, &landmarks, &tabs, &alerts, &modals, &errors);
        out.push_str(&context::navigate_context(&title_json, &recent_errors, &summary));
    }

    Ok(super::guarded(out, None))
}
