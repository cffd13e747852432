//! ZenMate scanners
//!
//! ZenMate only records when a connection was made (`dateConnected`) and to
//! which country (`proxyCountry`). There is no disconnect marker, so on
//! Chrome / Edge every `proxyCountry` record is a mode change: it closes the
//! previous session and opens a new one. The last session stays open.
//!
//! In the LevelDB log a stored value directly follows its key, separated by
//! a varint length byte:
//!
//! ```text
//! proxyCountry\x04"US"  ...  dateConnected\x1a"2023-11-14T22:13:20.000Z"
//! ```

use super::{
    epoch_seconds, expect_store, expect_text, malformed, parse_iso, window, Cursor, EventScanner,
    ScanOutcome,
};
use crate::artifact::Artifact;
use crate::error::Result;
use crate::types::{
    Attributes, Browser, Caution, EventKind, Extension, Variant, ATTR_COUNTRY, ATTR_PROXY,
};
use once_cell::sync::Lazy;
use regex::Regex;

const COUNTRY_ANCHOR: &str = "proxyCountry";

/// Bytes after the anchor searched for `dateConnected`.
const RECORD_WINDOW: usize = 800;

static COUNTRY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?s)\A.{0,4}?"(?P<country>[A-Za-z]{2})""#).unwrap());
static DATE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?s)dateConnected.{0,4}?"(?P<date>\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}(?:\.\d+)?(?:Z|[+-]\d{2}:\d{2})?)""#,
    )
    .unwrap()
});

/// Scanner for ZenMate LevelDB logs (Chrome, Edge).
pub struct ZenMateLogScanner {
    browser: Browser,
}

impl ZenMateLogScanner {
    pub fn new(browser: Browser) -> Self {
        Self { browser }
    }
}

impl EventScanner for ZenMateLogScanner {
    fn variant(&self) -> Variant {
        Variant::new(self.browser, Extension::ZenMate)
    }

    fn scan(&self, artifact: &Artifact) -> Result<ScanOutcome> {
        let variant = self.variant();
        let text = expect_text(variant, artifact)?;
        let mut outcome = ScanOutcome::default();
        let mut cursor = Cursor::new(text);

        while let Some(anchor) = cursor.next_anchor(COUNTRY_ANCHOR) {
            let value = window(text, anchor + COUNTRY_ANCHOR.len(), 8);
            let country = COUNTRY_RE
                .captures(value)
                .and_then(|caps| caps.name("country"))
                .ok_or_else(|| malformed(variant, anchor, "proxyCountry has no country code"))?
                .as_str();

            let record = window(text, anchor, RECORD_WINDOW);
            let raw_date = DATE_RE
                .captures(record)
                .and_then(|caps| caps.name("date"))
                .ok_or_else(|| malformed(variant, anchor, "no dateConnected after proxyCountry"))?
                .as_str();
            let timestamp = parse_iso(raw_date).ok_or_else(|| {
                malformed(variant, anchor, format!("unparsable dateConnected {:?}", raw_date))
            })?;

            let mut attributes = Attributes::new();
            attributes.insert(ATTR_PROXY.to_string(), country.to_string());
            attributes.insert(ATTR_COUNTRY.to_string(), country.to_string());
            outcome.push(timestamp, EventKind::Connect, attributes);
        }

        if outcome.events.is_empty() {
            outcome.caution(Caution::NoSessionMarkers);
        } else {
            outcome.caution(Caution::NoStopMarkers);
        }

        tracing::info!(%variant, events = outcome.events.len(), "Scanned log");
        Ok(outcome)
    }
}

/// Scanner for ZenMate IndexedDB state (Firefox).
pub struct ZenMateStoreScanner;

impl EventScanner for ZenMateStoreScanner {
    fn variant(&self) -> Variant {
        Variant::new(Browser::Firefox, Extension::ZenMate)
    }

    fn scan(&self, artifact: &Artifact) -> Result<ScanOutcome> {
        let variant = self.variant();
        let store = expect_store(variant, artifact)?;
        let mut outcome = ScanOutcome::default();

        if let Some(icon) = store.get("iconActive") {
            tracing::info!(%variant, icon_active = %icon, "Proxy status");
        }

        let date_connected = store.get("dateConnected").filter(|v| !v.is_null());
        let Some(date_connected) = date_connected else {
            tracing::warn!(%variant, keys = ?store.list_keys(), "No dateConnected in store");
            outcome.caution(Caution::NoSessionMarkers);
            return Ok(outcome);
        };

        let timestamp = epoch_seconds(&date_connected).ok_or_else(|| {
            malformed(
                variant,
                0,
                format!("unparsable dateConnected {}", date_connected),
            )
        })?;

        let country = store
            .get("proxyCountry")
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_default();

        let mut attributes = Attributes::new();
        attributes.insert(ATTR_PROXY.to_string(), country.clone());
        if !country.is_empty() {
            attributes.insert(ATTR_COUNTRY.to_string(), country);
        }
        outcome.push(timestamp, EventKind::Connect, attributes);
        outcome.caution(Caution::OpenEnded);

        Ok(outcome)
    }
}
