//! Context synthesiser (spec §4.E): turns raw CDP/page state into the five
//! bounded text fragments tool handlers append to their responses.

use std::time::{Duration, SystemTime};

use crate::cdp::debugger::CallFrame;
use crate::cdp::runtime::PropertyDescriptor;
use crate::extractors::ExtractionResult;
use crate::state::{ConsoleMessage, DomSnapshot, ElementSnapshot};

/// `Ns/m/h/d ago` relative-time formatting (spec §4.E).
pub fn relative_time(at: SystemTime) -> String {
    let elapsed = SystemTime::now().duration_since(at).unwrap_or(Duration::ZERO);
    let secs = elapsed.as_secs();
    if secs < 60 {
        format!("{secs}s ago")
    } else if secs < 3600 {
        format!("{}m ago", secs / 60)
    } else if secs < 86_400 {
        format!("{}h ago", secs / 3600)
    } else {
        format!("{}d ago", secs / 86_400)
    }
}

/// Truncates a displayed variable value to 100 chars (spec §4.E).
pub fn truncate_value(value: &str) -> String {
    if value.chars().count() <= 100 {
        value.to_string()
    } else {
        format!("{}…", value.chars().take(100).collect::<String>())
    }
}

/// Strips a full URL down to `basename:line` for stack-frame display
/// (spec §4.E).
pub fn basename_line(url: &str, line: u32) -> String {
    let basename = url.rsplit('/').next().unwrap_or(url);
    format!("{basename}:{line}")
}

/// **Navigate context**: title, up to 10 recent console errors (≤200 chars
/// each), then a composed page summary.
pub fn navigate_context(
    title: &str,
    recent_errors: &[ConsoleMessage],
    page_summary: &str,
) -> String {
    let mut out = format!("Page: {title}\n");
    let errors: Vec<&ConsoleMessage> = recent_errors
        .iter()
        .filter(|m| m.level == "error")
        .rev()
        .take(10)
        .collect();
    if !errors.is_empty() {
        out.push_str("Recent errors:\n");
        for err in errors.into_iter().rev() {
            let text: String = err.text.chars().take(200).collect();
            out.push_str(&format!("  - {text}\n"));
        }
    }
    out.push_str(page_summary);
    out
}

/// Renders the composed page summary block consumed by [`navigate_context`]
/// from the extractor categories spec §4.E names (headings excluded by
/// default).
pub fn page_summary(
    focused: &ExtractionResult,
    buttons: &ExtractionResult,
    inputs: &ExtractionResult,
    toggles: &ExtractionResult,
    landmarks: &ExtractionResult,
    tabs: &ExtractionResult,
    alerts: &ExtractionResult,
    modals: &ExtractionResult,
    errors: &ExtractionResult,
) -> String {
    let mut out = String::new();
    out.push_str(&format!("Focused: {} element(s)\n", focused.total));
    out.push_str(&format!("Buttons: {} (showing {})\n", buttons.total, buttons.items.len().min(10)));
    out.push_str(&format!("Inputs: {} (showing {})\n", inputs.total, inputs.items.len().min(10)));
    out.push_str(&format!("Toggles: {} (showing {})\n", toggles.total, toggles.items.len().min(10)));
    out.push_str(&format!("Landmarks: {} (showing {})\n", landmarks.total, landmarks.items.len().min(10)));
    out.push_str(&format!("Tabs: {} (showing {})\n", tabs.total, tabs.items.len().min(5)));
    out.push_str(&format!("Alerts: {}\n", alerts.total));
    out.push_str(&format!("Modals: {}\n", modals.total));
    out.push_str(&format!("Form errors: {}\n", errors.total));
    out
}

/// **Pause context**: location, reason, top 5 call frames, top 10 locals,
/// last 3 console entries.
pub fn pause_context(
    frames: &[CallFrame],
    reason: &str,
    locals: &[PropertyDescriptor],
    recent_console: &[ConsoleMessage],
) -> String {
    let mut out = String::new();
    if let Some(top) = frames.first() {
        let line = top.location.line_number + 1;
        out.push_str(&format!(
            "Paused at {} ({}), reason: {reason}\n",
            basename_line(&top.url, line),
            top.function_name
        ));
    }
    out.push_str("Call frames:\n");
    for frame in frames.iter().take(5) {
        let line = frame.location.line_number + 1;
        out.push_str(&format!("  {} @ {}\n", frame.function_name, basename_line(&frame.url, line)));
    }
    out.push_str("Locals:\n");
    for local in locals.iter().take(10) {
        let value = render_property(local);
        out.push_str(&format!("  {} = {}\n", local.name, truncate_value(&value)));
    }
    if !recent_console.is_empty() {
        out.push_str("Recent console:\n");
        for msg in recent_console.iter().rev().take(3).rev() {
            out.push_str(&format!("  [{}] {}\n", msg.level, msg.text));
        }
    }
    out
}

fn render_property(prop: &PropertyDescriptor) -> String {
    match &prop.value {
        Some(obj) => match &obj.value {
            Some(serde_json::Value::String(s)) => s.clone(),
            Some(v) => v.to_string(),
            None => obj.description.clone().unwrap_or_else(|| format!("<{}>", obj.kind)),
        },
        None => "<unavailable>".to_string(),
    }
}

/// Renders up to the first 10 locals the way [`step_context`]/[`pause_context`]
/// display them, keyed by name. Used both to build `step_context`'s
/// `[CHANGED]` cache and to seed it from the locals already present the
/// moment the debugger pauses, so the very first `step()` after a fresh
/// pause has something to diff against (spec §4.G `step`, §9).
pub fn locals_snapshot(locals: &[PropertyDescriptor]) -> std::collections::BTreeMap<String, String> {
    locals
        .iter()
        .take(10)
        .map(|local| (local.name.clone(), truncate_value(&render_property(local))))
        .collect()
}

/// **Step context**: same as pause, but each local is marked `[CHANGED]`
/// against `previous`. Returns the rendered text plus the new cache to
/// store on the connection.
pub fn step_context(
    frames: &[CallFrame],
    reason: &str,
    locals: &[PropertyDescriptor],
    recent_console: &[ConsoleMessage],
    previous: &std::collections::BTreeMap<String, String>,
) -> (String, std::collections::BTreeMap<String, String>) {
    let mut out = String::new();
    if let Some(top) = frames.first() {
        let line = top.location.line_number + 1;
        out.push_str(&format!(
            "Stepped to {} ({}), reason: {reason}\n",
            basename_line(&top.url, line),
            top.function_name
        ));
    }
    out.push_str("Call frames:\n");
    for frame in frames.iter().take(5) {
        let line = frame.location.line_number + 1;
        out.push_str(&format!("  {} @ {}\n", frame.function_name, basename_line(&frame.url, line)));
    }

    out.push_str("Locals:\n");
    let new_cache = locals_snapshot(locals);
    for local in locals.iter().take(10) {
        let value = truncate_value(&render_property(local));
        let changed = previous.get(&local.name).map(|p| p != &value).unwrap_or(false);
        let marker = if changed { " [CHANGED]" } else { "" };
        out.push_str(&format!("  {} = {}{}\n", local.name, value, marker));
    }

    if !recent_console.is_empty() {
        out.push_str("Recent console:\n");
        for msg in recent_console.iter().rev().take(3).rev() {
            out.push_str(&format!("  [{}] {}\n", msg.level, msg.text));
        }
    }

    (out, new_cache)
}

/// **Action context**: element state after click/fill, and optionally a DOM
/// diff against a *before* snapshot.
pub fn action_context(element: &ElementSnapshot, before: Option<&DomSnapshot>, after: Option<&DomSnapshot>) -> String {
    let mut out = format!(
        "Element State: <{}> visible={}{}{}\n",
        element.tag,
        element.visible,
        element.disabled.map(|d| format!(" disabled={d}")).unwrap_or_default(),
        element.value.as_ref().map(|v| format!(" value={}", truncate_value(v))).unwrap_or_default(),
    );

    if let (Some(before), Some(after)) = (before, after) {
        out.push_str(&dom_diff(before, after));
    }
    out
}

/// DOM diff between two snapshots: additions/removals (≤5 each),
/// per-element changes (≤5), and a per-category count delta.
pub fn dom_diff(before: &DomSnapshot, after: &DomSnapshot) -> String {
    let mut out = String::new();

    let added: Vec<&String> = after
        .key_elements
        .keys()
        .filter(|k| !before.key_elements.contains_key(*k))
        .take(5)
        .collect();
    let removed: Vec<&String> = before
        .key_elements
        .keys()
        .filter(|k| !after.key_elements.contains_key(*k))
        .take(5)
        .collect();

    if !added.is_empty() {
        out.push_str(&format!("Added: {}\n", added.into_iter().cloned().collect::<Vec<_>>().join(", ")));
    }
    if !removed.is_empty() {
        out.push_str(&format!("Removed: {}\n", removed.into_iter().cloned().collect::<Vec<_>>().join(", ")));
    }

    let mut changed = Vec::new();
    for (key, after_el) in &after.key_elements {
        if let Some(before_el) = before.key_elements.get(key) {
            let mut fields = Vec::new();
            if before_el.text != after_el.text {
                fields.push("text");
            }
            if before_el.visible != after_el.visible {
                fields.push("visible");
            }
            if before_el.value != after_el.value {
                fields.push("value");
            }
            if !fields.is_empty() {
                changed.push(format!("{key} ({})", fields.join(",")));
            }
        }
        if changed.len() >= 5 {
            break;
        }
    }
    if !changed.is_empty() {
        out.push_str(&format!("Changed: {}\n", changed.join(", ")));
    }

    out.push_str(&format!(
        "Counts: buttons {:+}, inputs {:+}, links {:+}, forms {:+}, visible {:+}\n",
        after.counts.buttons as i64 - before.counts.buttons as i64,
        after.counts.inputs as i64 - before.counts.inputs as i64,
        after.counts.links as i64 - before.counts.links as i64,
        after.counts.forms as i64 - before.counts.forms as i64,
        after.counts.visible as i64 - before.counts.visible as i64,
    ));

    out
}

/// A scored selector suggestion for the zero-result path.
#[derive(Debug, Clone)]
pub struct SelectorSuggestion {
    pub selector: String,
    pub count: usize,
    pub reason: String,
}

/// Splits `text` into search terms on `-`, `_`, and camelCase boundaries
/// (spec §4.E zero-result suggestions).
pub fn split_terms(text: &str) -> Vec<String> {
    let mut terms = Vec::new();
    let mut current = String::new();
    let mut prev_lower = false;
    for c in text.chars() {
        if c == '-' || c == '_' {
            if !current.is_empty() {
                terms.push(std::mem::take(&mut current));
            }
            prev_lower = false;
            continue;
        }
        if c.is_uppercase() && prev_lower && !current.is_empty() {
            terms.push(std::mem::take(&mut current));
        }
        prev_lower = c.is_lowercase();
        current.push(c.to_ascii_lowercase());
    }
    if !current.is_empty() {
        terms.push(current);
    }
    terms
}

/// Scores every class/id/tag/data-attr fragment in `inventory` by substring
/// containment against the terms extracted from `failed_selector`, sorts by
/// match count descending then selector length ascending, and returns the
/// top 5.
pub fn suggest_selectors(failed_selector: &str, inventory: &[String]) -> Vec<SelectorSuggestion> {
    let terms = split_terms(failed_selector);
    if terms.is_empty() {
        return Vec::new();
    }

    let mut scored: Vec<(String, usize)> = inventory
        .iter()
        .map(|candidate| {
            let lower = candidate.to_lowercase();
            let count = terms.iter().filter(|t| lower.contains(t.as_str())).count();
            (candidate.clone(), count)
        })
        .filter(|(_, count)| *count > 0)
        .collect();

    scored.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.len().cmp(&b.0.len())));

    scored
        .into_iter()
        .take(5)
        .map(|(selector, count)| SelectorSuggestion {
            reason: format!("matched {count} term(s) from '{failed_selector}'"),
            selector,
            count,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_kebab_snake_and_camel_case() {
        assert_eq!(split_terms("submit-button_primary"), vec!["submit", "button", "primary"]);
        assert_eq!(split_terms("submitButton"), vec!["submit", "button"]);
    }

    #[test]
    fn truncates_long_values() {
        let long = "x".repeat(150);
        assert_eq!(truncate_value(&long).chars().count(), 101);
    }

    #[test]
    fn suggests_top_matches_by_term_count() {
        let inventory = vec![
            "submit-btn".to_string(),
            "cancel-btn".to_string(),
            "submit-form-primary".to_string(),
        ];
        let suggestions = suggest_selectors("submit-button", &inventory);
        assert_eq!(suggestions[0].selector, "submit-btn");
    }

    #[test]
    fn basename_line_strips_url() {
        assert_eq!(basename_line("https://example.com/app/main.js", 42), "main.js:42");
    }

    fn number_local(name: &str, n: i64) -> PropertyDescriptor {
        PropertyDescriptor {
            name: name.to_string(),
            value: Some(crate::cdp::runtime::RemoteObject {
                kind: "number".to_string(),
                value: Some(serde_json::json!(n)),
                ..Default::default()
            }),
        }
    }

    #[test]
    fn locals_snapshot_seeds_a_name_to_value_map() {
        let locals = vec![number_local("i", 0), number_local("total", 10)];
        let snapshot = locals_snapshot(&locals);
        assert_eq!(snapshot.get("i"), Some(&"0".to_string()));
        assert_eq!(snapshot.get("total"), Some(&"10".to_string()));
    }

    /// A step that follows a seeded snapshot (i.e. `previous` came from the
    /// pause the debugger landed on, not an earlier step) still marks a
    /// local that changed value as `[CHANGED]` on the very first step.
    #[test]
    fn first_step_after_seeded_pause_marks_changed_locals() {
        let at_pause = vec![number_local("i", 0)];
        let previous = locals_snapshot(&at_pause);

        let at_step = vec![number_local("i", 1)];
        let (text, _) = step_context(&[], "other", &at_step, &[], &previous);

        assert!(text.contains("i = 1 [CHANGED]"));
    }

    #[test]
    fn first_step_without_seeding_never_marks_changed() {
        let at_step = vec![number_local("i", 1)];
        let (text, _) = step_context(&[], "other", &at_step, &[], &std::collections::BTreeMap::new());
        assert!(!text.contains("[CHANGED]"));
    }
}
