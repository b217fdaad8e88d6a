//! BC/AD resolution for ambiguously-expressed event years.
//!
//! Models emit the same timeline with year fields written as `-750`,
//! `"750"`, `"750 BC"` or `"750 CE"`, and frequently mark only the first
//! event of an all-BC sequence. Each record's year is classified into an
//! explicit signed value, a bare magnitude needing inference, or nothing;
//! bare magnitudes are then placed into an era using the neighboring
//! events of the same sequence.
//!
//! The inference cascade is a heuristic, not a proof: rules that pull
//! ancient-looking years toward BC trade precision for recall and can
//! misclassify isolated years in mixed-era timelines. The rule order and
//! the 1000/10000/2000 thresholds are load-bearing; change them only as
//! a product decision.

use std::sync::LazyLock;

use regex::Regex;
use timeline_types::{RawEvent, ResolvedEvent, YearInput};

// ── Year token classification ────────────────────────────────────────

// "750 BC" / "750BCE": digits negated.
static RE_BC: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^(\d+)\s*(?:BC|BCE)$").unwrap());
// "750 AD" / "750CE": the marker documents intent, no numeric effect.
static RE_AD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)^(\d+)\s*(?:AD|CE)$").unwrap());
// Purely numeric, era unknown.
static RE_BARE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\d+$").unwrap());

/// How one record expressed its year.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum YearToken {
    /// Carried its own sign: an explicit era marker, a JSON number, or a
    /// signed leading-integer fallback.
    Explicit(i64),
    /// Purely numeric string; era must be inferred from context.
    Bare(i64),
    /// Absent, empty, or unparseable. Never defaulted: a missing year
    /// stays missing so downstream code can fall back to a numbered
    /// sequence instead of inventing dates.
    Missing,
}

impl YearToken {
    /// The signed year this token resolves to on its own, without any
    /// neighbor context. Bare magnitudes count as provisionally positive.
    fn own_year(&self) -> Option<i64> {
        match *self {
            YearToken::Explicit(y) | YearToken::Bare(y) => Some(y),
            YearToken::Missing => None,
        }
    }
}

fn classify_year(year: Option<&YearInput>) -> YearToken {
    let text = match year {
        None => return YearToken::Missing,
        Some(YearInput::Number(n)) => return YearToken::Explicit(*n),
        Some(YearInput::Float(f)) => return YearToken::Explicit(*f as i64),
        Some(YearInput::Text(s)) => s.trim(),
    };
    if text.is_empty() {
        return YearToken::Missing;
    }

    if let Some(caps) = RE_BC.captures(text)
        && let Ok(n) = caps[1].parse::<i64>()
    {
        return YearToken::Explicit(-n);
    }
    if let Some(caps) = RE_AD.captures(text)
        && let Ok(n) = caps[1].parse::<i64>()
    {
        return YearToken::Explicit(n);
    }
    if RE_BARE.is_match(text)
        && let Ok(n) = text.parse::<i64>()
    {
        return YearToken::Bare(n);
    }

    // parseInt-style fallback: optional sign, decimal digits, trailing
    // junk ignored.
    match leading_int(text) {
        Some(n) => YearToken::Explicit(n),
        None => YearToken::Missing,
    }
}

fn leading_int(text: &str) -> Option<i64> {
    let bytes = text.as_bytes();
    let mut i = 0;
    let negative = match bytes.first() {
        Some(b'-') => {
            i = 1;
            true
        }
        Some(b'+') => {
            i = 1;
            false
        }
        _ => false,
    };
    let start = i;
    while i < bytes.len() && bytes[i].is_ascii_digit() {
        i += 1;
    }
    if i == start {
        return None;
    }
    let magnitude: i64 = text[start..i].parse().ok()?;
    Some(if negative { -magnitude } else { magnitude })
}

/// Explicit era marker carried by the raw field, if any. Only string
/// years can carry one.
fn era_marker(year: &YearInput) -> Option<Era> {
    let YearInput::Text(s) = year else { return None };
    let t = s.trim();
    if RE_BC.is_match(t) {
        Some(Era::Bc)
    } else if RE_AD.is_match(t) {
        Some(Era::Ad)
    } else {
        None
    }
}

// ── Context inference ────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Era {
    Bc,
    Ad,
}

/// Years below this are "ancient": a BC neighbor pulls them into BC even
/// when the sequence jumps non-monotonically within the era.
const ANCIENT_LIMIT: i64 = 1_000;
/// Upper bound of the "large ancient" band; long-range ancient sequences
/// are virtually always single-era below it.
const LARGE_ANCIENT_LIMIT: i64 = 10_000;
/// A year below this that steps backwards from an AD neighbor is still
/// AD (a birth year listed before a later event, not an era change).
const MODERN_LIMIT: i64 = 2_000;

/// Context for one bare year: its magnitude plus the signed years of its
/// immediate neighbors. The preceding year is the neighbor's final
/// resolved value (the pass runs forward); the following year comes from
/// the neighbor's own token only, so inference never depends on a result
/// that does not exist yet.
#[derive(Debug, Clone, Copy)]
struct Neighborhood {
    current: i64,
    prev: Option<i64>,
    next: Option<i64>,
}

impl Neighborhood {
    fn prev_bc(&self) -> Option<i64> {
        self.prev.filter(|y| *y < 0)
    }
    fn next_bc(&self) -> Option<i64> {
        self.next.filter(|y| *y < 0)
    }
    /// The following-record rules only apply when the preceding record
    /// gave no conclusive signal (no year, or BC without a magnitude
    /// match).
    fn prev_inconclusive(&self) -> bool {
        self.prev.is_none_or(|y| y < 0)
    }
    fn large_ancient(magnitude: i64) -> bool {
        (ANCIENT_LIMIT..LARGE_ANCIENT_LIMIT).contains(&magnitude)
    }
}

/// One step of the cascade: a named predicate over the neighborhood and
/// the era it assigns when it matches. Kept as a flat ordered table so
/// the precedence stays auditable and testable rule by rule.
struct Rule {
    #[allow(dead_code)]
    name: &'static str,
    applies: fn(&Neighborhood) -> Option<Era>,
}

fn prev_bc_within_magnitude(n: &Neighborhood) -> Option<Era> {
    let prev = n.prev_bc()?;
    (n.current <= prev.abs()).then_some(Era::Bc)
}

fn prev_bc_ancient(n: &Neighborhood) -> Option<Era> {
    n.prev_bc()?;
    (n.current < ANCIENT_LIMIT).then_some(Era::Bc)
}

fn prev_bc_large_ancient(n: &Neighborhood) -> Option<Era> {
    n.prev_bc()?;
    Neighborhood::large_ancient(n.current).then_some(Era::Bc)
}

fn next_bc_within_magnitude(n: &Neighborhood) -> Option<Era> {
    if !n.prev_inconclusive() {
        return None;
    }
    let next = n.next_bc()?;
    (n.current <= next.abs()).then_some(Era::Bc)
}

fn next_bc_ancient(n: &Neighborhood) -> Option<Era> {
    if !n.prev_inconclusive() {
        return None;
    }
    n.next_bc()?;
    (n.current < ANCIENT_LIMIT).then_some(Era::Bc)
}

fn next_bc_large_ancient(n: &Neighborhood) -> Option<Era> {
    if !n.prev_inconclusive() {
        return None;
    }
    n.next_bc()?;
    Neighborhood::large_ancient(n.current).then_some(Era::Bc)
}

fn bc_sandwich(n: &Neighborhood) -> Option<Era> {
    n.prev_bc()?;
    n.next_bc()?;
    Some(Era::Bc)
}

fn descending_large_ancient_run(n: &Neighborhood) -> Option<Era> {
    let prev = n.prev?.abs();
    let next = n.next?.abs();
    let all_large = Neighborhood::large_ancient(prev)
        && Neighborhood::large_ancient(n.current)
        && Neighborhood::large_ancient(next);
    (all_large && prev >= n.current && n.current >= next).then_some(Era::Bc)
}

fn prev_ad_monotonic(n: &Neighborhood) -> Option<Era> {
    let prev = n.prev.filter(|y| *y > 0)?;
    (n.current >= prev).then_some(Era::Ad)
}

fn prev_ad_earlier(n: &Neighborhood) -> Option<Era> {
    let prev = n.prev.filter(|y| *y > 0)?;
    (n.current < prev && n.current < MODERN_LIMIT).then_some(Era::Ad)
}

fn next_ad_forward(n: &Neighborhood) -> Option<Era> {
    let next = n.next.filter(|y| *y > 0)?;
    (n.current <= next).then_some(Era::Ad)
}

/// The cascade, in precedence order. First match wins; no match defaults
/// to AD (absence of any BC signal means the Common Era).
const RULES: &[Rule] = &[
    Rule { name: "prev-bc-within-magnitude", applies: prev_bc_within_magnitude },
    Rule { name: "prev-bc-ancient", applies: prev_bc_ancient },
    Rule { name: "prev-bc-large-ancient", applies: prev_bc_large_ancient },
    Rule { name: "next-bc-within-magnitude", applies: next_bc_within_magnitude },
    Rule { name: "next-bc-ancient", applies: next_bc_ancient },
    Rule { name: "next-bc-large-ancient", applies: next_bc_large_ancient },
    Rule { name: "bc-sandwich", applies: bc_sandwich },
    Rule { name: "descending-large-ancient-run", applies: descending_large_ancient_run },
    Rule { name: "prev-ad-monotonic", applies: prev_ad_monotonic },
    Rule { name: "prev-ad-earlier", applies: prev_ad_earlier },
    Rule { name: "next-ad-forward", applies: next_ad_forward },
];

fn infer_signed(current: i64, prev: Option<i64>, next: Option<i64>) -> i64 {
    let n = Neighborhood { current, prev, next };
    for rule in RULES {
        if let Some(era) = (rule.applies)(&n) {
            return match era {
                Era::Bc => -current,
                Era::Ad => current,
            };
        }
    }
    current
}

// ── Whole-sequence override ──────────────────────────────────────────

/// A full-sequence BC timeline where only the first event carried an
/// explicit "BC": every supplied year is large (≥ 1000), the magnitudes
/// never increase, and either some record says BC outright or none
/// carries any era marker at all. When it holds, every bare year is
/// negated uniformly instead of running the pairwise rules; explicitly
/// marked years keep their own sign.
fn whole_sequence_bc(records: &[RawEvent], tokens: &[YearToken]) -> bool {
    let magnitudes: Vec<i64> = tokens
        .iter()
        .filter_map(|t| t.own_year())
        .map(|y| y.abs())
        .collect();
    if magnitudes.is_empty() {
        return false;
    }
    if magnitudes.iter().any(|m| *m < ANCIENT_LIMIT) {
        return false;
    }
    if magnitudes.windows(2).any(|w| w[0] < w[1]) {
        return false;
    }

    let markers: Vec<Era> = records
        .iter()
        .filter_map(|r| r.year.as_ref().and_then(era_marker))
        .collect();
    markers.contains(&Era::Bc) || markers.is_empty()
}

// ── Resolver ─────────────────────────────────────────────────────────

/// Resolve every record's year to a signed value (negative = BC) or
/// flag it as undated. Output order matches input order; the function
/// never fails: unparseable and absent years propagate as `None`.
pub fn resolve_years(records: &[RawEvent]) -> Vec<ResolvedEvent> {
    let tokens: Vec<YearToken> = records
        .iter()
        .map(|r| classify_year(r.year.as_ref()))
        .collect();

    let all_bc = whole_sequence_bc(records, &tokens);

    // Forward pass: preceding context is already final, following context
    // comes from the neighbor's own token.
    let mut years: Vec<Option<i64>> = Vec::with_capacity(records.len());
    for (i, token) in tokens.iter().enumerate() {
        let year = match *token {
            YearToken::Missing => None,
            YearToken::Explicit(y) => Some(y),
            YearToken::Bare(magnitude) => {
                if all_bc {
                    Some(-magnitude)
                } else {
                    let prev = if i > 0 { years[i - 1] } else { None };
                    let next = tokens.get(i + 1).and_then(YearToken::own_year);
                    Some(infer_signed(magnitude, prev, next))
                }
            }
        };
        years.push(year);
    }

    records
        .iter()
        .zip(tokens.iter().zip(years))
        .map(|(record, (token, resolved_year))| {
            let (month, day) = normalize_month_day(record.month, record.day);
            ResolvedEvent {
                resolved_year,
                had_year_provided: *token != YearToken::Missing,
                month,
                day,
                title: record.title.clone(),
                description: record.description.clone(),
                number: record.number,
            }
        })
        .collect()
}

/// A month/day pair is accepted only when both are present; the pairs
/// (1,1) and (12,31) are the null-date fillers models emit and are
/// cleared rather than trusted.
fn normalize_month_day(month: Option<u32>, day: Option<u32>) -> (Option<u32>, Option<u32>) {
    match (month, day) {
        (Some(1), Some(1)) | (Some(12), Some(31)) => (None, None),
        (Some(m), Some(d)) => (Some(m), Some(d)),
        _ => (None, None),
    }
}
