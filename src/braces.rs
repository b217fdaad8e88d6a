//! String-aware brace scanning over candidate JSON text.
//!
//! Whole-document extraction and per-record salvage both need the same
//! scan: walk forward tracking `{`/`}` depth while honoring JSON string
//! syntax, so a `}` inside a quoted value or an escaped `\"` never
//! confuses the depth counter.

use std::ops::Range;

/// Incremental scanner state: brace depth, whether the cursor sits inside
/// a quoted string, and whether the previous character was a backslash.
#[derive(Debug, Default)]
pub struct BraceScanner {
    depth: i64,
    in_string: bool,
    escape_pending: bool,
    /// Depth has gone positive at least once.
    entered: bool,
}

impl BraceScanner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance over one character. Returns true when this character closed
    /// the outermost object, i.e. depth returned to zero after having gone
    /// positive.
    pub fn step(&mut self, c: char) -> bool {
        if self.in_string {
            if self.escape_pending {
                self.escape_pending = false;
            } else if c == '\\' {
                self.escape_pending = true;
            } else if c == '"' {
                self.in_string = false;
            }
            return false;
        }
        match c {
            '"' => self.in_string = true,
            '{' => {
                self.depth += 1;
                self.entered = true;
            }
            '}' => {
                self.depth -= 1;
                if self.entered && self.depth == 0 {
                    return true;
                }
            }
            _ => {}
        }
        false
    }

    pub fn in_string(&self) -> bool {
        self.in_string
    }

    /// An object was opened but never closed; the text ends mid-record.
    pub fn mid_object(&self) -> bool {
        self.entered && self.depth > 0
    }
}

/// Byte range of the first balanced `{…}` object in `text`, or None when
/// no object opens or the text ends before the opener is matched.
pub fn balanced_object(text: &str) -> Option<Range<usize>> {
    let start = text.find('{')?;
    let mut scanner = BraceScanner::new();
    for (i, c) in text[start..].char_indices() {
        if scanner.step(c) {
            return Some(start..start + i + c.len_utf8());
        }
    }
    None
}

/// Byte spans of complete top-level `{…}` elements inside an array body.
///
/// `body` starts just after the array's `[`. Scanning stops at the
/// array's own closing `]`; nested objects and arrays inside an element
/// are covered by the element's depth count. The second return reports
/// whether the scan ran off the end inside an unterminated object (a
/// truncated trailing fragment).
pub fn object_elements(body: &str) -> (Vec<Range<usize>>, bool) {
    let mut spans = Vec::new();
    let mut scanner = BraceScanner::new();
    let mut start: Option<usize> = None;

    for (i, c) in body.char_indices() {
        if start.is_none() && !scanner.in_string() {
            match c {
                '{' => start = Some(i),
                ']' => return (spans, false),
                _ => {}
            }
        }
        if scanner.step(c) {
            if let Some(s) = start.take() {
                spans.push(s..i + c.len_utf8());
            }
            scanner = BraceScanner::new();
        }
    }

    (spans, scanner.mid_object())
}

/// Raw `{` / `}` counts over a span, ignoring string state. Cheap
/// imbalance diagnostic for failure reports.
pub fn brace_counts(text: &str) -> (usize, usize) {
    let open = text.matches('{').count();
    let close = text.matches('}').count();
    (open, close)
}
