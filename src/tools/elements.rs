//! `query_elements` / `click_element` / `fill_element` / `inspect_element`
//! tool family (spec §4.G, §4.D).

use serde_json::Value;

use crate::context;
use crate::error::ToolError;
use crate::extractors::{self, DomSnapshotWire, ExtractionResult};
use crate::formatter::{success, ElementSummary};
use crate::manager::ConnectionManager;
use crate::state::ElementSnapshot;

use super::{connection_id, evaluate_json, guarded, opt_bool, opt_str, opt_u32, require_str, HandlerResult};

fn summaries(result: &ExtractionResult) -> Vec<ElementSummary> {
    result
        .items
        .iter()
        .map(|item| ElementSummary {
            tag: item.extra.get("tag").and_then(Value::as_str).unwrap_or("").to_string(),
            classes: item
                .extra
                .get("classes")
                .and_then(Value::as_array)
                .map(|a| a.iter().filter_map(Value::as_str).map(str::to_string).collect())
                .unwrap_or_default(),
            id: item.extra.get("id").and_then(Value::as_str).map(str::to_string),
        })
        .collect()
}

pub async fn query_elements(manager: &ConnectionManager, args: &Value) -> HandlerResult {
    let id = connection_id(args);
    let selector = require_str(args, "selector")?;
    let limit = opt_u32(args, "limit", 5).min(extractors::DEFAULT_LIMIT as u32) as usize;
    let text_contains = opt_str(args, "text_contains");
    let include_hidden = opt_bool(args, "include_hidden", false);

    let conn = manager.get_connection_or_throw(id.as_deref())?;
    let transport = {
        let conn = conn.lock().await;
        conn.transport.clone()
    };

    let script = extractors::build_query_elements_script(selector, limit, text_contains, include_hidden);
    let text = evaluate_json(&transport, script).await?;
    let result: ExtractionResult =
        serde_json::from_str(&text).map_err(|e| ToolError::execution(format!("could not parse query result: {e}")))?;

    if result.total == 0 {
        // Sweep the ordinary interactive categories, not just landmarks: a
        // failed selector like `.login-btn` or `#loginForm` needs buttons,
        // inputs and forms in the inventory, which landmark roles wouldn't
        // contain (spec §4.G, Scenario A).
        const INVENTORY_CATEGORIES: &[extractors::Category] = &[
            extractors::Category::Buttons,
            extractors::Category::Links,
            extractors::Category::Inputs,
            extractors::Category::Forms,
            extractors::Category::Toggles,
            extractors::Category::Headings,
            extractors::Category::Landmarks,
        ];
        let mut inventory: Vec<String> = Vec::new();
        for category in INVENTORY_CATEGORIES {
            let inventory_script = extractors::build_script(*category, 200, None, true);
            let inventory_text = evaluate_json(&transport, inventory_script).await.unwrap_or_default();
            if let Ok(parsed) = serde_json::from_str::<ExtractionResult>(&inventory_text) {
                for item in &parsed.items {
                    if let Some(tag) = item.extra.get("tag").and_then(Value::as_str) {
                        inventory.push(tag.to_string());
                    }
                    inventory.push(item.selector.clone());
                }
            }
        }
        let suggestions = context::suggest_selectors(selector, &inventory);
        let mut out = format!("No elements found matching selector: {selector}\n");
        if suggestions.is_empty() {
            out.push_str("No similar selectors found on the page.\n");
        } else {
            out.push_str("Similar selectors that exist:\n");
            for s in &suggestions {
                out.push_str(&format!("  - {} ({} element(s)) — {}\n", s.selector, s.count, s.reason));
            }
        }
        return Ok(success(out));
    }

    let mut out = format!("Found {} (showing {})\n", result.total, result.items.len());
    out.push_str(&format!(
        "  matched: {}, after visibility filter: {}, after text filter: {}\n",
        result.found, result.after_visibility_filter, result.after_text_filter
    ));
    if result.truncated {
        out.push_str("Results truncated; narrow the selector or raise the limit.\n");
    }
    for item in &result.items {
        out.push_str(&format!("  - {}\n", item.selector));
    }

    Ok(guarded(out, Some(&summaries(&result))))
}

async fn dom_snapshot(transport: &crate::conn::Transport, epoch: u64) -> Option<crate::state::DomSnapshot> {
    let text = evaluate_json(transport, extractors::build_dom_snapshot_script()).await.ok()?;
    let wire: DomSnapshotWire = serde_json::from_str(&text).ok()?;
    Some(wire.into_snapshot(epoch))
}

async fn act_on_element(
    manager: &ConnectionManager,
    args: &Value,
    script_builder: impl FnOnce(&str, usize) -> String,
) -> Result<(ElementSnapshot, Option<crate::state::DomSnapshot>, Option<crate::state::DomSnapshot>), ToolError> {
    let id = connection_id(args);
    let selector = require_str(args, "selector")?;
    let index = opt_u32(args, "index", 0) as usize;
    let include_context = opt_bool(args, "include_context", true);

    let conn = manager.get_connection_or_throw(id.as_deref())?;
    let (transport, epoch, before) = {
        let conn = conn.lock().await;
        (conn.transport.clone(), conn.navigation_epoch, conn.last_dom_snapshot.clone())
    };

    let before = if include_context && before.is_none() {
        dom_snapshot(&transport, epoch).await
    } else {
        before
    };

    let script = script_builder(selector, index);
    let text = evaluate_json(&transport, script).await?;
    let snapshot: ElementActionResult =
        serde_json::from_str(&text).map_err(|e| ToolError::execution(format!("could not parse element result: {e}")))?;
    if let Some(err) = &snapshot.error {
        return Err(ToolError::execution(format!("{err}: selector '{selector}' matched {} element(s)", snapshot.found)));
    }

    let after = if include_context {
        dom_snapshot(&transport, epoch).await
    } else {
        None
    };
    if let Some(after) = &after {
        let mut conn = conn.lock().await;
        conn.last_dom_snapshot = Some(after.clone());
    }

    Ok((
        ElementSnapshot {
            tag: snapshot.tag.unwrap_or_default(),
            text: String::new(),
            visible: snapshot.visible.unwrap_or(false),
            disabled: snapshot.disabled,
            value: snapshot.value,
            classes: Vec::new(),
        },
        before,
        after,
    ))
}

#[derive(Debug, Clone, serde::Deserialize)]
struct ElementActionResult {
    error: Option<String>,
    #[serde(default)]
    found: usize,
    tag: Option<String>,
    visible: Option<bool>,
    disabled: Option<bool>,
    value: Option<String>,
}

fn click_script(selector: &str, index: usize) -> String {
    let escaped = crate::formatter::escape_for_script(selector);
    format!(
        "(() => {{\n\
           const els = Array.from(document.querySelectorAll('{selector}'));\n\
           const el = els[{index}];\n\
           if (!el) return JSON.stringify({{ error: 'element_not_found', found: els.length }});\n\
           el.click();\n\
           const style = getComputedStyle(el);\n\
           const rect = el.getBoundingClientRect();\n\
           return JSON.stringify({{\n\
             tag: el.tagName.toLowerCase(),\n\
             visible: rect.width > 0 && rect.height > 0 && style.visibility !== 'hidden' && style.display !== 'none',\n\
             disabled: el.disabled !== undefined ? el.disabled : null,\n\
             value: el.value !== undefined ? String(el.value).slice(0, 100) : null,\n\
           }});\n\
         }})()",
        selector = escaped,
        index = index,
    )
}

fn fill_script(selector: &str, index: usize, value: &str, submit: bool) -> String {
    let escaped = crate::formatter::escape_for_script(selector);
    let escaped_value = crate::formatter::escape_for_script(value);
    format!(
        "(() => {{\n\
           const els = Array.from(document.querySelectorAll('{selector}'));\n\
           const el = els[{index}];\n\
           if (!el) return JSON.stringify({{ error: 'element_not_found', found: els.length }});\n\
           el.focus();\n\
           el.value = '{value}';\n\
           el.dispatchEvent(new Event('input', {{ bubbles: true }}));\n\
           el.dispatchEvent(new Event('change', {{ bubbles: true }}));\n\
           if ({submit}) {{\n\
             const form = el.closest('form');\n\
             if (form) form.requestSubmit ? form.requestSubmit() : form.submit();\n\
           }}\n\
           const style = getComputedStyle(el);\n\
           const rect = el.getBoundingClientRect();\n\
           return JSON.stringify({{\n\
             tag: el.tagName.toLowerCase(),\n\
             visible: rect.width > 0 && rect.height > 0 && style.visibility !== 'hidden' && style.display !== 'none',\n\
             disabled: el.disabled !== undefined ? el.disabled : null,\n\
             value: el.value !== undefined ? String(el.value).slice(0, 100) : null,\n\
           }});\n\
         }})()",
        selector = escaped,
        index = index,
        value = escaped_value,
        submit = submit,
    )
}

pub async fn click_element(manager: &ConnectionManager, args: &Value) -> HandlerResult {
    let include_context = opt_bool(args, "include_context", true);
    let (element, before, after) = act_on_element(manager, args, |selector, index| click_script(selector, index)).await?;
    let mut out = "Clicked element.\n".to_string();
    if include_context {
        out.push_str(&context::action_context(&element, before.as_ref(), after.as_ref()));
    }
    Ok(guarded(out, None))
}

pub async fn fill_element(manager: &ConnectionManager, args: &Value) -> HandlerResult {
    let value = require_str(args, "value")?.to_string();
    let submit = opt_bool(args, "submit", false);
    let include_context = opt_bool(args, "include_context", true);
    let (element, before, after) =
        act_on_element(manager, args, move |selector, index| fill_script(selector, index, &value, submit)).await?;
    let mut out = "Filled element.\n".to_string();
    if include_context {
        out.push_str(&context::action_context(&element, before.as_ref(), after.as_ref()));
    }
    Ok(guarded(out, None))
}

/// A stability-ranked selector candidate produced by the inspect script.
#[derive(Debug, Clone, serde::Deserialize)]
struct InspectCandidate {
    selector: String,
    tier: u8,
    tag: String,
    text: String,
    x: f64,
    y: f64,
}

#[derive(Debug, Clone, serde::Deserialize)]
struct InspectResult {
    candidates: Vec<InspectCandidate>,
}

fn tier_name(tier: u8) -> &'static str {
    match tier {
        0 => "id",
        1 => "data-testid",
        2 => "aria-label",
        3 => "class",
        _ => "structural",
    }
}

fn inspect_script(query: &str) -> String {
    let escaped = crate::formatter::escape_for_script(&query.to_lowercase());
    format!(
        "(() => {{\n\
           function __selector(el) {{\n\
             if (el.id) return '#' + el.id;\n\
             const t = el.getAttribute('data-testid');\n\
             if (t) return '[data-testid=\"' + t + '\"]';\n\
             const a = el.getAttribute('aria-label');\n\
             if (a) return el.tagName.toLowerCase() + '[aria-label=\"' + a + '\"]';\n\
             if (el.className && typeof el.className === 'string' && el.className.trim()) {{\n\
               return el.tagName.toLowerCase() + '.' + el.className.trim().split(/\\s+/).join('.');\n\
             }}\n\
             return el.tagName.toLowerCase();\n\
           }}\n\
           function __tier(el) {{\n\
             if (el.id) return 0;\n\
             if (el.getAttribute('data-testid')) return 1;\n\
             if (el.getAttribute('aria-label')) return 2;\n\
             if (el.className && typeof el.className === 'string' && el.className.trim()) return 3;\n\
             return 4;\n\
           }}\n\
           const all = Array.from(document.querySelectorAll('button, a, input, textarea, select, [role], label'));\n\
           const candidates = all\n\
             .filter(el => {{\n\
               const haystack = [(el.textContent||''), el.getAttribute('aria-label')||'', el.getAttribute('placeholder')||'', el.getAttribute('name')||''].join(' ').toLowerCase();\n\
               return haystack.includes('{query}');\n\
             }})\n\
             .map(el => {{\n\
               const rect = el.getBoundingClientRect();\n\
               return {{ selector: __selector(el), tier: __tier(el), tag: el.tagName.toLowerCase(), text: (el.textContent||'').trim().slice(0,60), x: rect.x, y: rect.y }};\n\
             }});\n\
           return JSON.stringify({{ candidates }});\n\
         }})()",
        query = escaped,
    )
}

pub async fn inspect_element(manager: &ConnectionManager, args: &Value) -> HandlerResult {
    let id = connection_id(args);
    let query = require_str(args, "query")?;
    let strict_stability = opt_bool(args, "strict_stability", false);

    let conn = manager.get_connection_or_throw(id.as_deref())?;
    let transport = {
        let conn = conn.lock().await;
        conn.transport.clone()
    };

    let text = evaluate_json(&transport, inspect_script(query)).await?;
    let mut parsed: InspectResult =
        serde_json::from_str(&text).map_err(|e| ToolError::execution(format!("could not parse inspect result: {e}")))?;

    if strict_stability {
        parsed.candidates.retain(|c| c.tier <= 2);
    }

    if let (Some(near_selector), Some(direction)) = (
        args.get("near").and_then(|n| n.get("selector")).and_then(Value::as_str),
        args.get("near").and_then(|n| n.get("direction")).and_then(Value::as_str),
    ) {
        let anchor_script = format!(
            "(() => {{ const el = document.querySelector('{}'); if (!el) return null; const r = el.getBoundingClientRect(); return JSON.stringify({{x:r.x,y:r.y}}); }})()",
            crate::formatter::escape_for_script(near_selector)
        );
        if let Ok(anchor_text) = evaluate_json(&transport, anchor_script).await {
            if let Ok(anchor) = serde_json::from_str::<serde_json::Value>(&anchor_text) {
                let ax = anchor.get("x").and_then(Value::as_f64).unwrap_or(0.0);
                let ay = anchor.get("y").and_then(Value::as_f64).unwrap_or(0.0);
                parsed.candidates.retain(|c| match direction {
                    "above" => c.y < ay,
                    "below" => c.y > ay,
                    "left" => c.x < ax,
                    "right" => c.x > ax,
                    _ => true,
                });
            }
        }
    }

    parsed.candidates.sort_by_key(|c| c.tier);

    if parsed.candidates.is_empty() {
        return Ok(success(format!("No element found matching '{query}'.\n")));
    }

    let mut out = format!("Candidates for '{query}':\n");
    for c in parsed.candidates.iter().take(10) {
        out.push_str(&format!(
            "  - {} <{}> \"{}\" [stability: {}]\n",
            c.selector,
            c.tag,
            c.text,
            tier_name(c.tier)
        ));
    }
    Ok(guarded(out, None))
}
