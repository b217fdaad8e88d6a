use serde::{Deserialize, Serialize};

// ── Year field as emitted by the model ───────────────────────────────────

/// A year value as it appears in raw model output. Models are not
/// consistent: the same timeline may carry `-750`, `"750"`, `"750 BC"`
/// and `"750 CE"` side by side, so the field deserializes from either a
/// JSON number or a string and is classified later.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum YearInput {
    Number(i64),
    Float(f64),
    Text(String),
}

// ── Raw event record ─────────────────────────────────────────────────────

/// One event as deserialized from the model's JSON, before year
/// resolution. Every field except `title` is optional because truncated
/// or sloppy completions routinely omit them; unknown keys are ignored.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawEvent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<YearInput>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub month: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub day: Option<u32>,
    #[serde(default)]
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Sequence number assigned by the model, used when the set falls
    /// back to a numbered (dateless) presentation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub number: Option<u32>,
}

// ── Resolved event record ────────────────────────────────────────────────

/// A raw event after year/era resolution. `resolved_year` is signed
/// (negative = BC/BCE); `None` means no usable date and the record should
/// be treated as sequence-numbered instead of dated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolvedEvent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_year: Option<i64>,
    /// Whether the source record supplied a parseable year at all.
    /// Distinguishes "field absent" and "field unreadable" from a real
    /// date, so downstream code can decide between a dated timeline and
    /// a numbered sequence.
    pub had_year_provided: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub month: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub day: Option<u32>,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub number: Option<u32>,
}

// ── Assembled timeline ───────────────────────────────────────────────────

/// How a resolved event set should be presented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimelineMode {
    /// Most records carry usable years; show them on a dated axis.
    Dated,
    /// Too few usable years; show the records in sequence order.
    Numbered,
}

/// The caller-facing assembly of one extraction run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Timeline {
    pub mode: TimelineMode,
    pub events: Vec<ResolvedEvent>,
}
