//! Response formatting (spec §4.B): the two constructors every tool handler
//! funnels its final text through, the size guard's query-narrowing
//! analyser, and identifier-safe escaping for values interpolated into
//! browser-side scripts.

use std::collections::HashMap;

/// A tool's rendered result, mirroring the MCP `tools/call` content shape
/// (spec §6).
#[derive(Debug, Clone)]
pub struct ToolResult {
    pub text: String,
    pub is_error: bool,
}

pub fn success(text: impl Into<String>) -> ToolResult {
    ToolResult {
        text: text.into(),
        is_error: false,
    }
}

pub fn error(text: impl Into<String>) -> ToolResult {
    ToolResult {
        text: text.into(),
        is_error: true,
    }
}

/// Any tool response over this many characters is rejected, not truncated
/// (spec §4.A, §6).
pub const MAX_RESPONSE_CHARS: usize = 5000;

/// Minimal structured-element shape the narrowing analyser needs: anything
/// that can report a list of tag names, class lists and ids. The page
/// extractors (§4.D) and `query_elements` both produce this.
#[derive(Debug, Clone, Default)]
pub struct ElementSummary {
    pub tag: String,
    pub classes: Vec<String>,
    pub id: Option<String>,
}

/// Counts classes/ids/tags across `elements` and emits the three-line
/// narrowing advice block used both standalone (zero-result suggestions
/// reuse the counting, not this renderer) and by the size guard.
pub fn narrowing_advice(elements: &[ElementSummary]) -> String {
    let mut class_counts: HashMap<&str, usize> = HashMap::new();
    let mut id_list: Vec<&str> = Vec::new();
    let mut tag_counts: HashMap<&str, usize> = HashMap::new();

    for el in elements {
        for c in &el.classes {
            *class_counts.entry(c.as_str()).or_insert(0) += 1;
        }
        if let Some(id) = el.id.as_deref() {
            id_list.push(id);
        }
        *tag_counts.entry(el.tag.as_str()).or_insert(0) += 1;
    }

    let mut classes: Vec<(&str, usize)> = class_counts.into_iter().collect();
    classes.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
    let top_classes: Vec<String> = classes
        .iter()
        .take(3)
        .map(|(c, n)| format!("{c} ({n})"))
        .collect();

    let top_ids: Vec<&str> = id_list.into_iter().take(5).collect();

    let mut tags: Vec<(&str, usize)> = tag_counts.into_iter().collect();
    tags.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
    let tag_breakdown: Vec<String> = tags.iter().map(|(t, n)| format!("{t}: {n}")).collect();

    format!(
        "Top classes: {}\nIds seen: {}\nTag breakdown: {}\nSuggestion: narrow with a more specific selector, add text_contains, or lower limit.",
        if top_classes.is_empty() { "none".to_string() } else { top_classes.join(", ") },
        if top_ids.is_empty() { "none".to_string() } else { top_ids.join(", ") },
        if tag_breakdown.is_empty() { "none".to_string() } else { tag_breakdown.join(", ") },
    )
}

/// The reject-not-truncate size guard (spec §4.A). `elements`, when given,
/// feeds the category-specific narrowing advice.
pub fn guard_size(text: String, elements: Option<&[ElementSummary]>) -> ToolResult {
    if text.len() <= MAX_RESPONSE_CHARS {
        return success(text);
    }

    let overage = text.len() - MAX_RESPONSE_CHARS;
    let mut diagnostic = format!(
        "Result too large: {} characters (limit {}, {} over).",
        text.len(),
        MAX_RESPONSE_CHARS,
        overage
    );
    if let Some(elements) = elements {
        diagnostic.push('\n');
        diagnostic.push_str(&narrowing_advice(elements));
    } else {
        diagnostic.push_str("\nSuggestion: reduce limit or narrow the query and try again.");
    }
    // Oversize is not a tool error (spec §7): it's a successful response
    // whose text is the narrowing diagnostic instead of the raw payload.
    success(diagnostic)
}

/// Escapes a value for safe interpolation into a single-quoted JS string
/// literal embedded in a page-extractor script (spec §4.B).
pub fn escape_for_script(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'").replace('\n', "\\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guards_under_limit() {
        let r = guard_size("short".to_string(), None);
        assert!(!r.is_error);
    }

    #[test]
    fn rejects_oversize_with_advice() {
        let big = "x".repeat(MAX_RESPONSE_CHARS + 1);
        let elements = vec![
            ElementSummary { tag: "button".into(), classes: vec!["btn".into()], id: None },
            ElementSummary { tag: "button".into(), classes: vec!["btn".into()], id: Some("go".into()) },
        ];
        let r = guard_size(big, Some(&elements));
        assert!(!r.is_error);
        assert!(r.text.contains("Result too large:"));
        assert!(r.text.contains("btn (2)"));
        assert!(r.text.contains("go"));
        assert!(r.text.contains("button: 2"));
    }

    #[test]
    fn escapes_quotes_and_newlines() {
        assert_eq!(escape_for_script("it's\nok"), "it\\'s\\nok");
    }
}
