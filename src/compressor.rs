//! Console pattern compressor (spec §4.C).
//!
//! Detects runs of repeated or near-identical console messages
//! (`A A A A -> A x4`, `A B A B A B -> (A B) x3`) with a single-pass greedy
//! scan so `get_console_logs` doesn't burn the agent's budget re-reading the
//! same dev-server spam.

use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::state::ConsoleMessage;

const MAX_PATTERN_LEN: usize = 20;

static UUID_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}").unwrap()
});
static HEX_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)0x[0-9a-f]+|[0-9a-f]{16,}").unwrap());
static ISO_TS_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}(?:\.\d+)?(?:Z|[+-]\d{2}:?\d{2})?").unwrap()
});
static EPOCH_MS_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b\d{13}\b").unwrap());
static NUMBER_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+(?:\.\d+)?").unwrap());
static WHITESPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// A block of `count` near-identical occurrences of `pattern`, replacing
/// `count` raw log lines in the rendered output (spec §4.C).
#[derive(Debug, Clone)]
pub struct CompressedPattern {
    /// The representative messages for one occurrence of the pattern
    /// (length `L`); for `L == 1` this holds a single message.
    pub pattern: Vec<ConsoleMessage>,
    pub count: usize,
    pub start_index: usize,
    /// De-duplicated, capped variation strings pulled out of each
    /// repetition by re-running the normalisation substitutions against the
    /// raw text (spec §4.C "Variations capture").
    pub variations: Vec<String>,
}

/// Normalises message text before similarity scoring (spec §4.C).
pub fn normalize(text: &str) -> String {
    let lower = text.to_lowercase();
    let collapsed = WHITESPACE_RE.replace_all(&lower, " ");
    let with_uuid = UUID_RE.replace_all(&collapsed, "<uuid>");
    let with_hex = HEX_RE.replace_all(&with_uuid, "<hex>");
    let with_iso_ts = ISO_TS_RE.replace_all(&with_hex, "<ts>");
    let with_epoch_ts = EPOCH_MS_RE.replace_all(&with_iso_ts, "<ts>");
    NUMBER_RE.replace_all(&with_epoch_ts, "<n>").into_owned()
}

fn bigrams(s: &str) -> HashSet<(char, char)> {
    let chars: Vec<char> = s.chars().collect();
    chars.windows(2).map(|w| (w[0], w[1])).collect()
}

/// Dice coefficient over character bigram sets: `2*|A∩B| / (|A|+|B|)`.
pub fn dice_coefficient(a: &str, b: &str) -> f64 {
    if a == b {
        return 1.0;
    }
    let ba = bigrams(a);
    let bb = bigrams(b);
    if ba.is_empty() || bb.is_empty() {
        return if ba.is_empty() && bb.is_empty() { 1.0 } else { 0.0 };
    }
    let intersection = ba.intersection(&bb).count();
    (2.0 * intersection as f64) / (ba.len() + bb.len()) as f64
}

fn location_known(msg: &ConsoleMessage) -> Option<(&str, u32)> {
    match (msg.url.as_deref(), msg.line_number) {
        (Some(url), Some(line)) => Some((url, line)),
        _ => None,
    }
}

/// Similarity predicate from spec §4.C: levels must match, and the
/// normalised-text Dice score must clear a threshold that depends on
/// whether source locations are known and whether they match.
pub fn messages_equal_for_compression(a: &ConsoleMessage, b: &ConsoleMessage) -> bool {
    if a.level != b.level {
        return false;
    }
    let na = normalize(&a.text);
    let nb = normalize(&b.text);
    if na == nb {
        return true;
    }

    let threshold = match (location_known(a), location_known(b)) {
        (Some(loc_a), Some(loc_b)) if loc_a == loc_b => 0.85,
        (Some(_), Some(_)) => 0.96,
        _ => 0.92,
    };

    dice_coefficient(&na, &nb) >= threshold
}

/// Re-runs the normalisation substitution regexes, in UUID / hex / timestamp
/// / plain-number order, against the raw text and collects what each one
/// replaced. Numeric residue already consumed by the timestamp regex is not
/// duplicated into the plain-number bucket (spec §4.C).
fn extract_variation(text: &str) -> Option<String> {
    if let Some(m) = UUID_RE.find(text) {
        return Some(m.as_str().to_string());
    }
    if let Some(m) = HEX_RE.find(text) {
        return Some(m.as_str().to_string());
    }
    if let Some(m) = ISO_TS_RE.find(text) {
        return Some(m.as_str().to_string());
    }
    if let Some(m) = EPOCH_MS_RE.find(text) {
        return Some(m.as_str().to_string());
    }
    let consumed_epoch: HashSet<&str> = EPOCH_MS_RE.find_iter(text).map(|m| m.as_str()).collect();
    for m in NUMBER_RE.find_iter(text) {
        if !consumed_epoch.contains(m.as_str()) {
            return Some(m.as_str().to_string());
        }
    }
    None
}

const MAX_VARIATIONS_SHOWN: usize = 4;

fn collect_variations(messages: &[ConsoleMessage]) -> Vec<String> {
    let mut seen = Vec::new();
    let mut seen_set = HashSet::new();
    for msg in messages {
        if let Some(v) = extract_variation(&msg.text) {
            if seen_set.insert(v.clone()) {
                seen.push(v);
            }
        }
    }
    seen
}

/// Renders a variations list capped to [`MAX_VARIATIONS_SHOWN`] entries with
/// a `"+k more"` suffix, or `None` if there were no variations at all.
pub fn format_variations(variations: &[String]) -> Option<String> {
    if variations.is_empty() {
        return None;
    }
    if variations.len() <= MAX_VARIATIONS_SHOWN {
        Some(variations.join(", "))
    } else {
        let shown = variations[..MAX_VARIATIONS_SHOWN].join(", ");
        Some(format!("{shown}, +{} more", variations.len() - MAX_VARIATIONS_SHOWN))
    }
}

/// Compresses a slice of console messages with the single-pass greedy scan
/// from spec §4.C. `O(n * L_max)` with `L_max = min(20, floor(sqrt(n)))`.
pub fn compress(messages: &[ConsoleMessage]) -> Vec<CompressedPattern> {
    let mut out = Vec::new();
    let n = messages.len();
    let mut p = 0;

    while p < n {
        let remaining = n - p;
        let max_len = MAX_PATTERN_LEN
            .min((remaining as f64).sqrt() as usize)
            .min(remaining)
            .max(1);

        let mut best: Option<(usize, usize)> = None; // (L, k)

        for l in 1..=max_len {
            if p + l > n {
                break;
            }
            let first = &messages[p..p + l];
            let mut k = 1;
            loop {
                let start = p + k * l;
                if start + l > n {
                    break;
                }
                let window = &messages[start..start + l];
                let matches = window
                    .iter()
                    .zip(first.iter())
                    .all(|(w, f)| messages_equal_for_compression(w, f));
                if matches {
                    k += 1;
                } else {
                    break;
                }
            }
            if k >= 2 {
                let score = l * k;
                // On a tied score, keep the first (shortest-L, largest-k)
                // candidate found while scanning L ascending: e.g. 4 equal
                // messages score 4 both as L=1,k=4 and L=2,k=2, and the
                // worked example for this compressor (a single `x4` line,
                // not two `x2` lines) resolves that tie toward the shorter
                // pattern / more repetitions.
                let better = match best {
                    None => true,
                    Some((best_l, best_k)) => score > best_l * best_k,
                };
                if better {
                    best = Some((l, k));
                }
            }
        }

        match best {
            Some((l, k)) => {
                let span = &messages[p..p + l * k];
                let mut rep_occurrences: Vec<&[ConsoleMessage]> = Vec::with_capacity(k);
                for i in 0..k {
                    rep_occurrences.push(&span[i * l..(i + 1) * l]);
                }
                let flat: Vec<ConsoleMessage> = rep_occurrences
                    .iter()
                    .flat_map(|occ| occ.iter().cloned())
                    .collect();
                let variations = collect_variations(&flat);

                out.push(CompressedPattern {
                    pattern: messages[p..p + l].to_vec(),
                    count: k,
                    start_index: p,
                    variations,
                });
                p += l * k;
            }
            None => {
                out.push(CompressedPattern {
                    pattern: vec![messages[p].clone()],
                    count: 1,
                    start_index: p,
                    variations: Vec::new(),
                });
                p += 1;
            }
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::SystemTime;

    fn msg(text: &str) -> ConsoleMessage {
        ConsoleMessage {
            level: "log".to_string(),
            text: text.to_string(),
            timestamp: SystemTime::now(),
            navigation_epoch: 0,
            url: None,
            line_number: None,
            stack_locations: Vec::new(),
            stack_trace: None,
        }
    }

    #[test]
    fn normalizes_variable_substrings() {
        assert_eq!(normalize("Timeout 123ms"), "timeout <n>ms");
        assert_eq!(
            normalize("id 550e8400-e29b-41d4-a716-446655440000 ready"),
            "id <uuid> ready"
        );
    }

    #[test]
    fn collapses_singleton_run() {
        let logs = vec![msg("hello"), msg("world")];
        let compressed = compress(&logs);
        assert_eq!(compressed.len(), 2);
        assert!(compressed.iter().all(|p| p.count == 1));
    }

    #[test]
    fn collapses_exact_repeats() {
        let logs: Vec<_> = (0..4).map(|_| msg("tick")).collect();
        let compressed = compress(&logs);
        assert_eq!(compressed.len(), 1);
        assert_eq!(compressed[0].pattern.len(), 1);
        assert_eq!(compressed[0].count, 4);
    }

    #[test]
    fn collapses_near_identical_with_variations() {
        let logs = vec![
            msg("timeout 123ms"),
            msg("timeout 456ms"),
            msg("timeout 789ms"),
            msg("timeout 1011ms"),
        ];
        let compressed = compress(&logs);
        assert_eq!(compressed.len(), 1);
        assert_eq!(compressed[0].count, 4);
        assert_eq!(
            compressed[0].variations,
            vec!["123", "456", "789", "1011"]
        );
    }

    #[test]
    fn collapses_repeating_block() {
        let logs = vec![msg("a"), msg("b"), msg("a"), msg("b"), msg("a"), msg("b")];
        let compressed = compress(&logs);
        assert_eq!(compressed.len(), 1);
        assert_eq!(compressed[0].count, 3);
        assert_eq!(compressed[0].pattern.len(), 2);
    }

    #[test]
    fn idempotent_on_flattened_representation() {
        let logs: Vec<_> = (0..6).map(|_| msg("spam")).collect();
        let first = compress(&logs);
        let flattened: Vec<ConsoleMessage> = first
            .iter()
            .flat_map(|p| std::iter::repeat(p.pattern.clone()).take(p.count).flatten())
            .collect();
        let second = compress(&flattened);
        let multiset = |v: &[CompressedPattern]| -> Vec<(usize, usize)> {
            v.iter().map(|p| (p.pattern.len(), p.count)).collect()
        };
        assert_eq!(multiset(&first), multiset(&second));
    }
}
