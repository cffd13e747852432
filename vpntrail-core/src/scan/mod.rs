//! Event scanners
//!
//! Each supported browser × extension pair has a scanner that walks an
//! [`Artifact`] and recovers an ordered list of connect/disconnect events.
//!
//! | Extension | Chrome / Edge (log text) | Firefox (object store) |
//! |-----------|--------------------------|------------------------|
//! | TouchVPN | [`touchvpn::TouchVpnLogScanner`] | [`touchvpn::TouchVpnStoreScanner`] |
//! | ZenMate | [`zenmate::ZenMateLogScanner`] | [`zenmate::ZenMateStoreScanner`] |
//! | Browsec | [`browsec::BrowsecScanner`] (escaped grammar) | [`browsec::BrowsecScanner`] (plain grammar, `log` key) |
//!
//! ## Error Handling
//!
//! Scanners are fail-fast. When an anchor is found but the timestamp or
//! attributes around it do not match the grammar, the whole pass returns
//! [`Error::MalformedArtifact`]; no partial event list is produced.
//! Soft conditions are reported as [`Caution`]s in [`ScanOutcome::cautions`].

pub mod browsec;
pub mod touchvpn;
pub mod zenmate;

use crate::artifact::{Artifact, ObjectStore};
use crate::error::{Error, Result};
use crate::types::{Attributes, BrowserFamily, Caution, Event, EventKind, Extension, Variant};
use chrono::{DateTime, NaiveDateTime};
use serde_json::Value;

/// Events recovered from one artifact, in scan order.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ScanOutcome {
    pub events: Vec<Event>,
    pub cautions: Vec<Caution>,
}

impl ScanOutcome {
    /// Append an event, assigning the next sequence index.
    pub fn push(&mut self, timestamp: i64, kind: EventKind, attributes: Attributes) {
        let sequence_index = self.events.len();
        tracing::debug!(sequence_index, timestamp, kind = kind.as_str(), "Event recovered");
        self.events.push(Event {
            sequence_index,
            timestamp,
            kind,
            attributes,
        });
    }

    /// Record a caution once.
    pub fn caution(&mut self, caution: Caution) {
        if !self.cautions.contains(&caution) {
            self.cautions.push(caution);
        }
    }
}

/// Trait implemented by every vendor/browser scanner.
pub trait EventScanner {
    /// Which browser × extension pair this scanner handles
    fn variant(&self) -> Variant;

    /// Walk the artifact once and return the recovered events.
    ///
    /// Scanning is a pure function of artifact content.
    fn scan(&self, artifact: &Artifact) -> Result<ScanOutcome>;
}

/// Get the scanner for a browser × extension pair.
pub fn scanner_for(variant: Variant) -> Box<dyn EventScanner> {
    match (variant.browser.family(), variant.extension) {
        (BrowserFamily::Chromium, Extension::TouchVpn) => {
            Box::new(touchvpn::TouchVpnLogScanner::new(variant.browser))
        }
        (BrowserFamily::Firefox, Extension::TouchVpn) => Box::new(touchvpn::TouchVpnStoreScanner),
        (BrowserFamily::Chromium, Extension::ZenMate) => {
            Box::new(zenmate::ZenMateLogScanner::new(variant.browser))
        }
        (BrowserFamily::Firefox, Extension::ZenMate) => Box::new(zenmate::ZenMateStoreScanner),
        (BrowserFamily::Chromium, Extension::Browsec) => {
            Box::new(browsec::BrowsecScanner::chromium(variant.browser))
        }
        (BrowserFamily::Firefox, Extension::Browsec) => Box::new(browsec::BrowsecScanner::firefox()),
    }
}

/// Resolve user-supplied browser and extension names into a variant.
pub fn resolve_variant(browser: &str, extension: &str) -> Result<Variant> {
    match (browser.parse(), extension.parse()) {
        (Ok(browser), Ok(extension)) => Ok(Variant::new(browser, extension)),
        _ => Err(Error::UnsupportedCombination {
            browser: browser.to_string(),
            extension: extension.to_string(),
        }),
    }
}

// ============================================
// Helpers shared by the grammars
// ============================================

/// Forward-only cursor over log text.
///
/// Every anchor occurrence is visited exactly once: after a hit the cursor
/// moves past the anchor.
pub(crate) struct Cursor<'a> {
    text: &'a str,
    pos: usize,
}

impl<'a> Cursor<'a> {
    pub(crate) fn new(text: &'a str) -> Self {
        Self { text, pos: 0 }
    }

    pub(crate) fn starting_at(text: &'a str, pos: usize) -> Self {
        Self {
            text,
            pos: pos.min(text.len()),
        }
    }

    /// Byte offset of the next `anchor`, advancing past it.
    pub(crate) fn next_anchor(&mut self, anchor: &str) -> Option<usize> {
        let found = self.text[self.pos..].find(anchor)? + self.pos;
        self.pos = found + anchor.len();
        Some(found)
    }

    /// Byte offset of the next `anchor` without moving.
    pub(crate) fn peek_anchor(&self, anchor: &str) -> Option<usize> {
        self.text[self.pos..].find(anchor).map(|i| i + self.pos)
    }
}

/// Clamp `[start, start + len)` to the text and to UTF-8 boundaries.
pub(crate) fn window(text: &str, start: usize, len: usize) -> &str {
    let start = start.min(text.len());
    let mut end = start.saturating_add(len).min(text.len());
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[start..end]
}

pub(crate) fn malformed(variant: Variant, offset: usize, reason: impl Into<String>) -> Error {
    let reason = reason.into();
    tracing::warn!(%variant, offset, reason = %reason, "Malformed artifact");
    Error::MalformedArtifact {
        variant: variant.to_string(),
        offset,
        reason,
    }
}

/// The text body of a log artifact, or an error for an object store.
pub(crate) fn expect_text(variant: Variant, artifact: &Artifact) -> Result<&str> {
    match artifact {
        Artifact::Text(text) => Ok(text),
        Artifact::Store(_) => Err(malformed(variant, 0, "expected log text, got object store")),
    }
}

/// The object store of an artifact, or an error for log text.
pub(crate) fn expect_store(variant: Variant, artifact: &Artifact) -> Result<&dyn ObjectStore> {
    match artifact {
        Artifact::Store(store) => Ok(store.as_ref()),
        Artifact::Text(_) => Err(malformed(variant, 0, "expected object store, got log text")),
    }
}

/// Values above this are taken to be milliseconds (year 5138 in seconds).
const MILLIS_THRESHOLD: i64 = 100_000_000_000;

/// Parse a millisecond timestamp (plain or scientific notation) into whole seconds.
///
/// Extension logs serialize `Date.now()` either as an integer or as a double
/// such as `1.700000000123e+12`.
pub(crate) fn parse_millis(raw: &str) -> Option<i64> {
    if let Ok(ms) = raw.parse::<i64>() {
        return Some(ms.div_euclid(1000));
    }
    let ms = raw.parse::<f64>().ok()?;
    if !ms.is_finite() {
        return None;
    }
    Some((ms / 1000.0).floor() as i64)
}

/// Parse an ISO-8601 timestamp; a missing offset is read as UTC.
pub(crate) fn parse_iso(raw: &str) -> Option<i64> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.timestamp());
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|dt| dt.and_utc().timestamp())
}

/// Normalize a stored timestamp (seconds, milliseconds or ISO string) to epoch seconds.
pub(crate) fn epoch_seconds(value: &Value) -> Option<i64> {
    let from_int = |n: i64| {
        if n.abs() >= MILLIS_THRESHOLD {
            n.div_euclid(1000)
        } else {
            n
        }
    };

    match value {
        Value::Number(n) => match n.as_i64() {
            Some(i) => Some(from_int(i)),
            None => {
                let f = n.as_f64()?;
                if f.abs() >= MILLIS_THRESHOLD as f64 {
                    Some((f / 1000.0).floor() as i64)
                } else {
                    Some(f.floor() as i64)
                }
            }
        },
        Value::String(s) => {
            let trimmed = s.trim();
            match trimmed.parse::<i64>() {
                Ok(i) => Some(from_int(i)),
                Err(_) => parse_iso(trimmed),
            }
        }
        _ => None,
    }
}

/// Join the `address` field of every record in a list value.
pub(crate) fn join_addresses(value: Option<&Value>) -> String {
    value
        .and_then(Value::as_array)
        .map(|records| {
            records
                .iter()
                .filter_map(|r| r.get("address").and_then(Value::as_str))
                .collect::<Vec<_>>()
                .join(", ")
        })
        .unwrap_or_default()
}
