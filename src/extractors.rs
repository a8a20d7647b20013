//! One-shot, read-only browser-side scripts producing structured element
//! inventories (spec §4.D). Each category compiles to a `Runtime.evaluate`
//! expression string; the manager is responsible for actually sending it
//! and parsing the JSON result this module expects back.
//!
//! Grounded on chromiumoxide's own `Page::evaluate` one-shot expression
//! pattern (`src/page.rs`, `src/js.rs` in the teacher), generalised from
//! "run an arbitrary JS expression" to a fixed family of page-inventory
//! queries.

use serde::Deserialize;

use crate::formatter::escape_for_script;
use crate::state::{DomSnapshot, ElementCounts, ElementSnapshot};

/// Default/"limit" row cap applied by every extractor unless a category
/// table in spec §4.G overrides it for a particular context consumer.
pub const DEFAULT_LIMIT: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    Focused,
    Buttons,
    Links,
    Inputs,
    Forms,
    Toggles,
    Alerts,
    Modals,
    Errors,
    Landmarks,
    Tabs,
    Headings,
}

impl Category {
    fn match_expr(self) -> &'static str {
        match self {
            Category::Focused => "[document.activeElement].filter(el => el && el !== document.body)",
            Category::Buttons => "Array.from(document.querySelectorAll('button, [role=\"button\"]'))",
            Category::Links => "Array.from(document.querySelectorAll('a[href]'))",
            Category::Inputs => "Array.from(document.querySelectorAll('input, textarea, select'))",
            Category::Forms => "Array.from(document.querySelectorAll('form'))",
            Category::Toggles => "Array.from(document.querySelectorAll('input[type=checkbox], [role=\"switch\"]'))",
            Category::Alerts => "Array.from(document.querySelectorAll('[role=\"alert\"], [role=\"status\"]'))",
            Category::Modals => "Array.from(document.querySelectorAll('[role=\"dialog\"], [aria-modal=\"true\"]'))",
            Category::Errors => "Array.from(document.querySelectorAll('[aria-invalid=\"true\"], [aria-errormessage]'))",
            Category::Landmarks => {
                "Array.from(document.querySelectorAll('header, nav, main, aside, footer, section, [role=\"region\"], [role=\"search\"]'))"
            }
            Category::Tabs => "Array.from(document.querySelectorAll('[role=\"tablist\"]'))",
            Category::Headings => "Array.from(document.querySelectorAll('h1, h2, h3, h4, h5, h6'))",
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Category::Focused => "focused",
            Category::Buttons => "buttons",
            Category::Links => "links",
            Category::Inputs => "inputs",
            Category::Forms => "forms",
            Category::Toggles => "toggles",
            Category::Alerts => "alerts",
            Category::Modals => "modals",
            Category::Errors => "errors",
            Category::Landmarks => "landmarks",
            Category::Tabs => "tabs",
            Category::Headings => "headings",
        }
    }
}

/// Shared prelude every extractor script uses: visibility test and
/// selector-generation preference order (`#id` > `[data-testid]` >
/// `tag.className` > bare tag), spec §4.D.
const PRELUDE: &str = r#"
function __visible(el) {
  const r = el.getBoundingClientRect();
  const style = getComputedStyle(el);
  return r.width > 0 && r.height > 0 && style.visibility !== 'hidden' && style.display !== 'none';
}
function __selector(el) {
  if (el.id) return '#' + el.id;
  const testid = el.getAttribute('data-testid');
  if (testid) return '[data-testid="' + testid + '"]';
  if (el.className && typeof el.className === 'string' && el.className.trim()) {
    return el.tagName.toLowerCase() + '.' + el.className.trim().split(/\s+/).join('.');
  }
  return el.tagName.toLowerCase();
}
"#;

/// Builds the `Runtime.evaluate` expression for `category`, filtering to
/// `include_hidden` or visible-only, optional `text_contains`, and capping
/// to `limit` items. Returns `{items, total, truncated}` as JSON text.
pub fn build_script(category: Category, limit: usize, text_contains: Option<&str>, include_hidden: bool) -> String {
    let filter = match text_contains {
        Some(s) => format!(
            ".filter(el => (el.textContent || '').toLowerCase().includes('{}'))",
            escape_for_script(&s.to_lowercase())
        ),
        None => String::new(),
    };
    let visibility_filter = if include_hidden { String::new() } else { ".filter(__visible)".to_string() };

    format!(
        "(() => {{ {prelude}\n\
         const all = {matcher}{vis}{text};\n\
         const total = all.length;\n\
         const items = all.slice(0, {limit}).map(el => ({{\n\
           selector: __selector(el),\n\
           tag: el.tagName.toLowerCase(),\n\
           text: (el.textContent || '').trim().slice(0, 100),\n\
           id: el.id || undefined,\n\
           name: el.getAttribute('name') || undefined,\n\
           type: el.getAttribute('type') || undefined,\n\
           value: el.value !== undefined ? String(el.value).slice(0, 100) : undefined,\n\
           href: el.getAttribute('href') || undefined,\n\
           checked: el.checked !== undefined ? el.checked : undefined,\n\
           disabled: el.disabled !== undefined ? el.disabled : undefined,\n\
         }}));\n\
         return JSON.stringify({{ items, total, truncated: total > {limit} }});\n\
         }})()",
        prelude = PRELUDE,
        matcher = category.match_expr(),
        vis = visibility_filter,
        text = filter,
        limit = limit,
    )
}

/// Generic result row shape shared by every category; tool handlers project
/// the fields relevant to their category out of `extra`.
#[derive(Debug, Clone, Deserialize)]
pub struct ExtractedItem {
    pub selector: String,
    #[serde(flatten)]
    pub extra: serde_json::Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExtractionResult {
    pub items: Vec<ExtractedItem>,
    pub total: usize,
    pub truncated: bool,
    /// Pre-filter match count, only present on the `query_elements` script;
    /// absent (defaults to 0) on fixed-category scripts, which don't report
    /// per-stage filter impact (spec §4.D, §4.G `query_elements`).
    #[serde(default)]
    pub found: usize,
    #[serde(default, rename = "afterVisibilityFilter")]
    pub after_visibility_filter: usize,
    #[serde(default, rename = "afterTextFilter")]
    pub after_text_filter: usize,
}

/// The `query_elements` primitive (spec §4.D): a general CSS-selector query
/// reporting richer per-element diagnostics than the fixed categories.
pub fn build_query_elements_script(
    selector: &str,
    limit: usize,
    text_contains: Option<&str>,
    include_hidden: bool,
) -> String {
    let escaped_selector = escape_for_script(selector);
    let text_filter = match text_contains {
        Some(s) => format!(
            "afterTextFilter = afterTextFilter.filter(el => (el.textContent || '').toLowerCase().includes('{}'));",
            escape_for_script(&s.to_lowercase())
        ),
        None => String::new(),
    };
    let vis_skip = if include_hidden { "true" } else { "__visible(el)" };

    format!(
        "(() => {{ {prelude}\n\
         const found = Array.from(document.querySelectorAll('{selector}'));\n\
         let afterVisibilityFilter = found.filter(el => {vis_skip});\n\
         let afterTextFilter = afterVisibilityFilter;\n\
         {text_filter}\n\
         const total = afterTextFilter.length;\n\
         const items = afterTextFilter.slice(0, {limit}).map((el, i) => {{\n\
           const rect = el.getBoundingClientRect();\n\
           return {{\n\
             selector: __selector(el),\n\
             tag: el.tagName.toLowerCase(),\n\
             text: (el.textContent || '').trim().slice(0, 100),\n\
             position: {{ x: rect.x, y: rect.y }},\n\
             childInfo: {{ directChildren: el.children.length, totalDescendants: el.querySelectorAll('*').length }},\n\
             attributes: Object.fromEntries(Array.from(el.attributes).slice(0, 8).map(a => [a.name, a.value])),\n\
             id: el.id || undefined,\n\
             classes: el.className && typeof el.className === 'string' ? el.className.trim().split(/\\s+/).filter(Boolean) : [],\n\
           }};\n\
         }});\n\
         return JSON.stringify({{ found: found.length, afterVisibilityFilter: afterVisibilityFilter.length, afterTextFilter: total, items, total, truncated: total > {limit} }});\n\
         }})()",
        prelude = PRELUDE,
        selector = escaped_selector,
        vis_skip = vis_skip,
        text_filter = text_filter,
        limit = limit,
    )
}

/// Wire shape for [`build_dom_snapshot_script`]'s result.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DomSnapshotWire {
    pub counts: DomCountsWire,
    pub key_elements: std::collections::BTreeMap<String, DomElementWire>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DomCountsWire {
    pub total: usize,
    pub buttons: usize,
    pub inputs: usize,
    pub links: usize,
    pub forms: usize,
    pub visible: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DomElementWire {
    pub tag: String,
    pub text: String,
    pub visible: bool,
    pub disabled: Option<bool>,
    pub value: Option<String>,
    pub classes: Vec<String>,
}

/// Counts interactive elements and snapshots up to 30 of them, keyed by
/// `"selector[i]"`, for the DOM-diff path of action context (spec §3, §4.E).
pub fn build_dom_snapshot_script() -> String {
    format!(
        "(() => {{ {prelude}\n\
         const buttons = Array.from(document.querySelectorAll('button, [role=\"button\"]'));\n\
         const inputs = Array.from(document.querySelectorAll('input, textarea, select'));\n\
         const links = Array.from(document.querySelectorAll('a[href]'));\n\
         const forms = Array.from(document.querySelectorAll('form'));\n\
         const all = [...buttons, ...inputs, ...links, ...forms];\n\
         const visible = all.filter(__visible);\n\
         const keyElements = {{}};\n\
         all.slice(0, 30).forEach((el, i) => {{\n\
           keyElements[__selector(el) + '[' + i + ']'] = {{\n\
             tag: el.tagName.toLowerCase(),\n\
             text: (el.textContent || '').trim().slice(0, 50),\n\
             visible: __visible(el),\n\
             disabled: el.disabled !== undefined ? el.disabled : null,\n\
             value: el.value !== undefined ? String(el.value).slice(0, 50) : null,\n\
             classes: el.className && typeof el.className === 'string' ? el.className.trim().split(/\\s+/).filter(Boolean) : [],\n\
           }};\n\
         }});\n\
         return JSON.stringify({{\n\
           counts: {{ total: all.length, buttons: buttons.length, inputs: inputs.length, links: links.length, forms: forms.length, visible: visible.length }},\n\
           keyElements,\n\
         }});\n\
         }})()",
        prelude = PRELUDE,
    )
}

impl DomSnapshotWire {
    pub fn into_snapshot(self, navigation_epoch: u64) -> DomSnapshot {
        DomSnapshot {
            timestamp: std::time::Instant::now(),
            navigation_epoch,
            counts: ElementCounts {
                total: self.counts.total,
                buttons: self.counts.buttons,
                inputs: self.counts.inputs,
                links: self.counts.links,
                forms: self.counts.forms,
                visible: self.counts.visible,
            },
            key_elements: self
                .key_elements
                .into_iter()
                .map(|(k, v)| {
                    (
                        k,
                        ElementSnapshot {
                            tag: v.tag,
                            text: v.text,
                            visible: v.visible,
                            disabled: v.disabled,
                            value: v.value,
                            classes: v.classes,
                        },
                    )
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_buttons_script_with_visibility_filter() {
        let script = build_script(Category::Buttons, 10, None, false);
        assert!(script.contains("__visible"));
        assert!(script.contains("button"));
        assert!(script.contains("slice(0, 10)"));
    }

    #[test]
    fn escapes_text_contains_quotes() {
        let script = build_script(Category::Links, 5, Some("it's"), true);
        assert!(script.contains("it\\'s"));
        assert!(!script.contains(".filter(__visible)"));
    }

    #[test]
    fn query_elements_script_includes_diagnostics() {
        let script = build_query_elements_script("button.primary", 5, None, false);
        assert!(script.contains("afterVisibilityFilter"));
        assert!(script.contains("childInfo"));
        assert!(script.contains("classes"));
    }

    #[test]
    fn extraction_result_defaults_filter_counts_when_absent() {
        let json = r#"{"items":[],"total":0,"truncated":false}"#;
        let result: ExtractionResult = serde_json::from_str(json).unwrap();
        assert_eq!(result.found, 0);
        assert_eq!(result.after_visibility_filter, 0);
        assert_eq!(result.after_text_filter, 0);
    }

    #[test]
    fn extraction_result_reads_filter_impact_fields() {
        let json = r#"{"found":12,"afterVisibilityFilter":9,"afterTextFilter":4,"items":[],"total":4,"truncated":false}"#;
        let result: ExtractionResult = serde_json::from_str(json).unwrap();
        assert_eq!(result.found, 12);
        assert_eq!(result.after_visibility_filter, 9);
        assert_eq!(result.after_text_filter, 4);
    }
}
