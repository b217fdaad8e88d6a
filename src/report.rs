//! Normalization glue between the extractor and the resolver, plus the
//! aggregate report a batch run writes alongside its timelines.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use timeline_types::{RawEvent, ResolvedEvent, Timeline, TimelineMode};

use crate::extract::Extraction;

// ── Value → records ──────────────────────────────────────────────────

/// Pull raw event records out of a fully-parsed JSON value.
///
/// Accepts either a top-level object carrying the record array under
/// `array_key`, or the bare array itself. Each element is deserialized
/// leniently (unknown keys ignored); elements that don't fit the record
/// shape are dropped and counted rather than failing the set.
pub fn events_from_value(value: &Value, array_key: &str) -> (Vec<RawEvent>, usize) {
    let array = match value {
        Value::Array(items) => items.as_slice(),
        Value::Object(map) => match map.get(array_key).and_then(Value::as_array) {
            Some(items) => items.as_slice(),
            None => return (Vec::new(), 0),
        },
        _ => return (Vec::new(), 0),
    };
    events_from_elements(array)
}

/// Like [`events_from_value`], but over salvaged elements that were
/// parsed individually.
pub fn events_from_elements(elements: &[Value]) -> (Vec<RawEvent>, usize) {
    let mut events = Vec::new();
    let mut dropped = 0usize;
    for element in elements {
        match serde_json::from_value::<RawEvent>(element.clone()) {
            Ok(e) => events.push(e),
            Err(_) => dropped += 1,
        }
    }
    (events, dropped)
}

/// Drop records that carry neither a title nor any year/number handle.
/// There is nothing to display for them; they are usually the debris of
/// a truncated record.
pub fn drop_unusable(events: Vec<RawEvent>) -> (Vec<RawEvent>, usize) {
    let before = events.len();
    let kept: Vec<RawEvent> = events
        .into_iter()
        .filter(|e| {
            !e.title.trim().is_empty() || e.year.is_some() || e.number.is_some()
        })
        .collect();
    let dropped = before - kept.len();
    (kept, dropped)
}

// ── Timeline assembly ────────────────────────────────────────────────

/// Present a resolved set as a dated timeline only when at least half of
/// the records carry a usable year; otherwise fall back to a numbered
/// sequence.
pub fn assemble_timeline(events: Vec<ResolvedEvent>) -> Timeline {
    let dated = events.iter().filter(|e| e.resolved_year.is_some()).count();
    let mode = if dated * 2 < events.len() || events.is_empty() {
        TimelineMode::Numbered
    } else {
        TimelineMode::Dated
    };
    Timeline { mode, events }
}

// ── Aggregate report ─────────────────────────────────────────────────

/// Counters for a whole run, written to `output/report.json`.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct BatchReport {
    pub files: usize,
    // Extraction outcomes
    pub clean: usize,
    pub repaired: usize,
    pub extracted: usize,
    pub salvaged: usize,
    pub failed: usize,
    // Record-level accounting
    pub events_recovered: usize,
    pub fragments_discarded: usize,
    pub records_dropped: usize,
    // Resolution outcomes
    pub bc_years: usize,
    pub ad_years: usize,
    pub unresolved_years: usize,
    // Presentation outcomes
    pub dated_timelines: usize,
    pub numbered_timelines: usize,
}

impl BatchReport {
    pub fn record_extraction(&mut self, extraction: &Extraction) {
        self.files += 1;
        match extraction {
            Extraction::Clean { .. } => self.clean += 1,
            Extraction::Repaired { .. } => self.repaired += 1,
            Extraction::Extracted { .. } => self.extracted += 1,
            Extraction::Salvaged { discarded, .. } => {
                self.salvaged += 1;
                self.fragments_discarded += discarded;
            }
            Extraction::Failed { .. } => self.failed += 1,
        }
    }

    pub fn record_timeline(&mut self, timeline: &Timeline) {
        self.events_recovered += timeline.events.len();
        for event in &timeline.events {
            match event.resolved_year {
                Some(y) if y < 0 => self.bc_years += 1,
                Some(_) => self.ad_years += 1,
                None => self.unresolved_years += 1,
            }
        }
        match timeline.mode {
            TimelineMode::Dated => self.dated_timelines += 1,
            TimelineMode::Numbered => self.numbered_timelines += 1,
        }
    }
}
