//! Best-effort recovery of a JSON value from raw model output.
//!
//! Completions are supposed to contain one top-level JSON object, but in
//! practice arrive wrapped in markdown fences, prefixed with prose,
//! truncated at the output-token limit, or carrying small syntax defects
//! (trailing commas, stray backslashes). The extractor tries a cascade of
//! progressively more invasive recoveries and reports which level
//! succeeded. It is pure and total: every failure mode is a value, never
//! a panic.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::braces;

// ── Options ──────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct ExtractOptions {
    /// Key of the record array used for record-level salvage.
    pub array_key: String,
    /// The upstream completion metadata reported a length-limited stop.
    pub length_limited_stop: bool,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        ExtractOptions {
            array_key: "events".to_string(),
            length_limited_stop: false,
        }
    }
}

// ── Result ───────────────────────────────────────────────────────────

/// Where and why the parse gave up. Offsets are relative to the
/// fence-stripped text.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Diagnostic {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<usize>,
    /// ±50 characters of text around the failure point.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snippet: Option<String>,
    pub open_braces: usize,
    pub close_braces: usize,
}

/// Outcome of one extraction attempt, tagged by recovery level.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum Extraction {
    /// The text parsed as-is (after fence stripping).
    Clean { value: Value },
    /// Parsed after trailing-comma / stray-backslash repairs.
    Repaired { value: Value },
    /// Parsed after cutting the first balanced `{…}` out of surrounding
    /// prose.
    Extracted { value: Value },
    /// The document as a whole was unparseable, but individual records
    /// were recovered independently. Explicitly partial: callers must
    /// surface a partial-results warning.
    Salvaged {
        elements: Vec<Value>,
        /// Array elements that were damaged beyond repair, including an
        /// unterminated trailing fragment.
        discarded: usize,
        truncated: bool,
    },
    /// Nothing usable.
    Failed { diagnostic: Diagnostic },
}

impl Extraction {
    pub fn status(&self) -> &'static str {
        match self {
            Extraction::Clean { .. } => "clean",
            Extraction::Repaired { .. } => "repaired",
            Extraction::Extracted { .. } => "extracted",
            Extraction::Salvaged { .. } => "salvaged",
            Extraction::Failed { .. } => "failed",
        }
    }
}

// ── Pipeline ─────────────────────────────────────────────────────────

/// Recover the best-effort JSON value from `text`.
///
/// Recovery levels, each attempted only when the previous one fails:
/// direct parse → repaired parse → balanced-substring parse →
/// record-level salvage → diagnostic failure.
pub fn extract_json(text: &str, opts: &ExtractOptions) -> Extraction {
    let stripped = strip_code_fences(text);

    // 1. Direct parse.
    let direct_err = match serde_json::from_str::<Value>(stripped) {
        Ok(value) => return Extraction::Clean { value },
        Err(e) => e,
    };

    // 2. Idempotent repairs, then parse.
    let repaired = repair(stripped);
    if let Ok(value) = serde_json::from_str::<Value>(&repaired) {
        return Extraction::Repaired { value };
    }

    // 3. First balanced object cut out of surrounding prose.
    if let Some(span) = braces::balanced_object(stripped) {
        let candidate = repair(&stripped[span]);
        if let Ok(value) = serde_json::from_str::<Value>(&candidate) {
            return Extraction::Extracted { value };
        }
    }

    // 4.–5. Truncation detection, then record-level salvage.
    let truncated = opts.length_limited_stop || looks_truncated(stripped);
    let (elements, discarded) = salvage(stripped, &opts.array_key);
    if !elements.is_empty() {
        return Extraction::Salvaged {
            elements,
            discarded,
            truncated,
        };
    }

    // 6. Total failure.
    Extraction::Failed {
        diagnostic: diagnose(stripped, &direct_err),
    }
}

/// Strip a surrounding markdown code fence (```` ``` ```` or ` ```json `).
fn strip_code_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let s = trimmed.strip_prefix("```json").unwrap_or(trimmed);
    let s = s.strip_prefix("```").unwrap_or(s);
    let s = s.strip_suffix("```").unwrap_or(s);
    s.trim()
}

// ── Repairs ──────────────────────────────────────────────────────────

// Trailing comma before a closing `}` or `]`.
static RE_TRAILING_COMMA: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r",(\s*[}\]])").unwrap());

/// Characters that may legally follow a backslash in a JSON string.
const VALID_ESCAPES: &[char] = &['"', '\\', '/', 'b', 'f', 'n', 'r', 't', 'u'];

/// Apply the idempotent textual repairs: drop trailing commas, double
/// stray backslashes. Running the result through `repair` again is a
/// no-op.
fn repair(text: &str) -> String {
    let no_commas = RE_TRAILING_COMMA.replace_all(text, "$1");
    double_stray_backslashes(&no_commas)
}

/// A backslash not followed by a valid escape character is a raw
/// backslash the model forgot to escape; double it so the parser accepts
/// the string.
fn double_stray_backslashes(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.peek() {
            Some(&next) if VALID_ESCAPES.contains(&next) => {
                out.push('\\');
                out.push(next);
                chars.next();
            }
            _ => out.push_str("\\\\"),
        }
    }
    out
}

// ── Truncation & salvage ─────────────────────────────────────────────

/// A completion that opens a JSON object but never returns to a plausible
/// document end was cut off mid-stream.
fn looks_truncated(text: &str) -> bool {
    let t = text.trim_end();
    t.contains('{') && !(t.ends_with('}') || t.ends_with(']') || t.ends_with("```"))
}

/// Parse individual `{…}` elements of the `array_key` array, keeping the
/// readable ones and counting the damaged ones.
fn salvage(text: &str, array_key: &str) -> (Vec<Value>, usize) {
    let Some(body) = array_body(text, array_key) else {
        return (Vec::new(), 0);
    };
    let (spans, cut_mid_object) = braces::object_elements(body);

    let mut elements = Vec::new();
    let mut discarded = 0usize;
    for span in spans {
        let candidate = repair(&body[span]);
        match serde_json::from_str::<Value>(&candidate) {
            Ok(v) => elements.push(v),
            Err(_) => discarded += 1,
        }
    }
    if cut_mid_object {
        discarded += 1;
    }
    (elements, discarded)
}

/// The substring following `"<array_key>"` `:` `[`, or None when the
/// array is absent. Only whitespace may sit between key, colon and
/// bracket.
fn array_body<'a>(text: &'a str, array_key: &str) -> Option<&'a str> {
    let needle = format!("\"{array_key}\"");
    let key_at = text.find(&needle)?;
    let after_key = &text[key_at + needle.len()..];
    let colon = after_key.find(':')?;
    if !after_key[..colon].trim().is_empty() {
        return None;
    }
    let after_colon = &after_key[colon + 1..];
    let bracket = after_colon.find('[')?;
    if !after_colon[..bracket].trim().is_empty() {
        return None;
    }
    Some(&after_colon[bracket + 1..])
}

// ── Diagnostics ──────────────────────────────────────────────────────

fn diagnose(text: &str, err: &serde_json::Error) -> Diagnostic {
    let offset = byte_offset(text, err.line(), err.column());
    let snippet = offset.map(|o| snippet_around(text, o, 50));

    // Brace counts over the candidate span: first `{` to end of text.
    let candidate = text.find('{').map(|i| &text[i..]).unwrap_or(text);
    let (open_braces, close_braces) = braces::brace_counts(candidate);

    Diagnostic {
        offset,
        snippet,
        open_braces,
        close_braces,
    }
}

/// Convert the parser's 1-based line/column into a byte offset.
fn byte_offset(text: &str, line: usize, column: usize) -> Option<usize> {
    if line == 0 {
        return None;
    }
    let mut off = 0usize;
    for (i, l) in text.split('\n').enumerate() {
        if i + 1 == line {
            return Some(off + column.saturating_sub(1).min(l.len()));
        }
        off += l.len() + 1;
    }
    None
}

/// A window of `char_radius` characters on each side of `byte_offset`,
/// clamped to char boundaries.
fn snippet_around(text: &str, byte_offset: usize, char_radius: usize) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut byte_pos = 0;
    let mut char_idx = chars.len();
    for (i, ch) in chars.iter().enumerate() {
        if byte_pos >= byte_offset {
            char_idx = i;
            break;
        }
        byte_pos += ch.len_utf8();
    }

    let start = char_idx.saturating_sub(char_radius);
    let end = (char_idx + char_radius).min(chars.len());
    chars[start..end].iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn extract(text: &str) -> Extraction {
        extract_json(text, &ExtractOptions::default())
    }

    // ── Clean / fenced ───────────────────────────────────────────────

    #[test]
    fn test_clean_parse_round_trip() {
        let text = r#"{"events": [{"title": "A", "year": 1}]}"#;
        match extract(text) {
            Extraction::Clean { value } => {
                assert_eq!(value, serde_json::from_str::<Value>(text).unwrap());
            }
            other => panic!("expected clean, got {}", other.status()),
        }
    }

    #[test]
    fn test_fenced_equals_unfenced() {
        let body = r#"{"events": [{"title": "A"}]}"#;
        let fenced = format!("```json\n{body}\n```");
        match (extract(body), extract(&fenced)) {
            (Extraction::Clean { value: va }, Extraction::Clean { value: vb }) => {
                assert_eq!(va, vb);
            }
            (a, b) => panic!("expected clean/clean, got {}/{}", a.status(), b.status()),
        }
    }

    #[test]
    fn test_bare_fence_without_language_tag() {
        let fenced = "```\n{\"a\": 1}\n```";
        assert!(matches!(extract(fenced), Extraction::Clean { .. }));
    }

    #[test]
    fn test_string_internal_brace_returns_full_object() {
        let text = r#"{"a": "x}y"}"#;
        match extract(text) {
            Extraction::Clean { value } => assert_eq!(value["a"], "x}y"),
            other => panic!("expected clean, got {}", other.status()),
        }
    }

    // ── Repairs ──────────────────────────────────────────────────────

    #[test]
    fn test_trailing_comma_repaired() {
        let text = r#"{"events":[{"title":"A"},]}"#;
        match extract(text) {
            Extraction::Repaired { value } => {
                assert_eq!(value["events"].as_array().unwrap().len(), 1);
            }
            other => panic!("expected repaired, got {}", other.status()),
        }
    }

    #[test]
    fn test_stray_backslash_repaired() {
        // `\d` is not a valid JSON escape; the repair doubles it.
        let text = r#"{"title": "a\d"}"#;
        match extract(text) {
            Extraction::Repaired { value } => assert_eq!(value["title"], "a\\d"),
            other => panic!("expected repaired, got {}", other.status()),
        }
    }

    #[test]
    fn test_repair_preserves_valid_escapes() {
        let text = "{\"a\": \"line\\nbreak \\u0041 quote\\\"\"}";
        assert_eq!(repair(text), text);
    }

    #[test]
    fn test_repair_is_idempotent() {
        let messy = r#"{"a": "x\d", "b": [1, 2,], }"#;
        let once = repair(messy);
        assert_eq!(repair(&once), once);
    }

    #[test]
    fn test_repaired_output_reparses_clean() {
        let text = r#"{"events":[{"title":"A"},]}"#;
        let Extraction::Repaired { value } = extract(text) else {
            panic!("expected repaired");
        };
        let reserialized = serde_json::to_string(&value).unwrap();
        assert!(matches!(extract(&reserialized), Extraction::Clean { .. }));
    }

    // ── Substring extraction ─────────────────────────────────────────

    #[test]
    fn test_extracted_from_surrounding_prose() {
        let text = r#"Sure! Here is the timeline you asked for:
{"events": [{"title": "Fall of Rome", "year": 476}]}
Let me know if you need more."#;
        match extract(text) {
            Extraction::Extracted { value } => {
                assert_eq!(value["events"][0]["year"], json!(476));
            }
            other => panic!("expected extracted, got {}", other.status()),
        }
    }

    #[test]
    fn test_extracted_with_string_internal_brace_in_prose() {
        let text = r#"note: {"a": "x}y"} trailing words"#;
        match extract(text) {
            Extraction::Extracted { value } => assert_eq!(value["a"], "x}y"),
            other => panic!("expected extracted, got {}", other.status()),
        }
    }

    // ── Salvage ──────────────────────────────────────────────────────

    #[test]
    fn test_salvage_truncated_array() {
        let text = r#"{"events":[{"title":"A","year":1},{"title":"B","year":2},{"title":"C"#;
        match extract(text) {
            Extraction::Salvaged {
                elements,
                discarded,
                truncated,
            } => {
                assert_eq!(elements.len(), 2);
                assert_eq!(elements[0]["title"], "A");
                assert_eq!(elements[1]["title"], "B");
                assert!(discarded >= 1);
                assert!(truncated);
            }
            other => panic!("expected salvaged, got {}", other.status()),
        }
    }

    #[test]
    fn test_salvage_skips_damaged_middle_element() {
        // Middle element is unreadable even after repairs; neighbors
        // survive.
        let text = r#"{"events":[{"title":"A"},{"title": bad},{"title":"C"},{"x":"#;
        match extract(text) {
            Extraction::Salvaged {
                elements,
                discarded,
                ..
            } => {
                assert_eq!(elements.len(), 2);
                assert_eq!(elements[0]["title"], "A");
                assert_eq!(elements[1]["title"], "C");
                assert_eq!(discarded, 2); // bad element + truncated tail
            }
            other => panic!("expected salvaged, got {}", other.status()),
        }
    }

    #[test]
    fn test_salvage_respects_custom_array_key() {
        let text = r#"{"milestones":[{"title":"A"},{"title":"B"#;
        let opts = ExtractOptions {
            array_key: "milestones".to_string(),
            length_limited_stop: false,
        };
        match extract_json(text, &opts) {
            Extraction::Salvaged { elements, .. } => assert_eq!(elements.len(), 1),
            other => panic!("expected salvaged, got {}", other.status()),
        }
    }

    #[test]
    fn test_length_limited_hint_marks_truncated() {
        // The document ends in `}` so the text itself does not look
        // truncated, and the middle element is unreadable; only the
        // caller's metadata hint marks the result truncated.
        let text = r#"{"events":[{"title":"A"},{"title": bad}]}"#;
        let opts = ExtractOptions {
            array_key: "events".to_string(),
            length_limited_stop: true,
        };
        match extract_json(text, &opts) {
            Extraction::Salvaged {
                elements,
                discarded,
                truncated,
            } => {
                assert_eq!(elements.len(), 1);
                assert_eq!(discarded, 1);
                assert!(truncated);
            }
            other => panic!("expected salvaged, got {}", other.status()),
        }

        let untruncated = ExtractOptions::default();
        match extract_json(text, &untruncated) {
            Extraction::Salvaged { truncated, .. } => assert!(!truncated),
            other => panic!("expected salvaged, got {}", other.status()),
        }
    }

    // ── Failure ──────────────────────────────────────────────────────

    #[test]
    fn test_failed_without_any_braces() {
        match extract("I could not produce a timeline for that topic.") {
            Extraction::Failed { diagnostic } => {
                assert_eq!(diagnostic.open_braces, 0);
                assert_eq!(diagnostic.close_braces, 0);
            }
            other => panic!("expected failed, got {}", other.status()),
        }
    }

    #[test]
    fn test_failed_diagnostic_carries_offset_and_counts() {
        // `{` present but no salvageable records anywhere.
        let text = r#"{"events": { not json at all"#;
        match extract(text) {
            Extraction::Failed { diagnostic } => {
                assert!(diagnostic.offset.is_some());
                assert!(diagnostic.snippet.is_some());
                assert_eq!(diagnostic.open_braces, 2);
                assert_eq!(diagnostic.close_braces, 0);
            }
            other => panic!("expected failed, got {}", other.status()),
        }
    }

    #[test]
    fn test_snippet_window_is_char_safe() {
        let s = snippet_around("héllo wörld", 3, 2);
        assert!(!s.is_empty());
    }

    #[test]
    fn test_never_panics_on_garbage() {
        for text in ["", "   ", "```", "{{{{", "}}}}", "[1,2,", "\\\\\\", "\"{\""] {
            let _ = extract(text);
        }
    }
}
