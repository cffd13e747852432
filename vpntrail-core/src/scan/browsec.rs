//! Browsec scanner
//!
//! Browsec keeps a rolling text log of its own. Every proxy state change
//! writes a pair of lines:
//!
//! ```text
//! Store: PAC update. New state: {"country":"nl","mode":"proxy","timestamp":1700000000123}
//! Store: low leverl PAC update. {"nl":["HTTPS nl-1.prmsrvs.com:443", ...]}
//! ```
//!
//! On Chrome / Edge the log lives inside a LevelDB value, so quotes are
//! escaped (`country\":\"nl`) and timestamps are doubles
//! (`1.700000000123e+12`). On Firefox the same log is stored under the `log`
//! key of the IndexedDB store, unescaped.
//!
//! Scanning starts at the last `Request servers list #0 started` line, which
//! Browsec writes when the extension (re)starts; older history in the log is
//! from a previous extension lifetime.
//!
//! A PAC update in `proxy` mode is a CONNECT (a country switch while
//! connected closes the previous session). Any other mode is a DISCONNECT
//! only while a session is open. Idle updates are skipped, except the first
//! update of a log without a start marker, whose connect was lost.

use super::{expect_store, expect_text, malformed, parse_millis, Cursor, EventScanner, ScanOutcome};
use crate::artifact::Artifact;
use crate::error::Result;
use crate::types::{
    Attributes, Browser, BrowserFamily, Caution, EventKind, Extension, Variant, ATTR_COUNTRY,
    ATTR_PROXY,
};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use std::borrow::Cow;

const SERVERS_ANCHOR: &str = "Request servers list #0 started";
const UPDATE_ANCHOR: &str = "Store: PAC update.";
const LOW_LEVEL_ANCHOR: &str = "Store: low leverl PAC update.";
const STATE_MARKER: &str = "New";
const PROXY_MODE: &str = "proxy";

/// Firefox store key holding the Browsec log text.
const STORE_LOG_KEY: &str = "log";

/// Named-capture patterns for one quoting style of the Browsec log.
struct BrowsecGrammar {
    country: Regex,
    mode: Regex,
    timestamp: Regex,
    server: Regex,
}

/// Chrome / Edge: JSON quotes escaped inside a LevelDB string value.
static ESCAPED: Lazy<BrowsecGrammar> = Lazy::new(|| BrowsecGrammar {
    country: Regex::new(r#"country\\"\s*:\s*\\"(?P<country>[A-Za-z]{2})"#).unwrap(),
    mode: Regex::new(r#"mode\\"\s*:\s*\\"(?P<mode>[a-z_]+)"#).unwrap(),
    timestamp: Regex::new(r#"timestamp\\"\s*:\s*(?P<ts>\d+(?:\.\d+)?(?:[eE][+-]?\d+)?)"#)
        .unwrap(),
    server: Regex::new(
        r#"(?P<country>[A-Za-z]{2})\\"\s*:\s*\[\s*\\"[A-Z]+\s+(?P<host>[^\s:\\"]+):443"#,
    )
    .unwrap(),
});

/// Firefox: plain JSON.
static PLAIN: Lazy<BrowsecGrammar> = Lazy::new(|| BrowsecGrammar {
    country: Regex::new(r#"country"\s*:\s*"(?P<country>[A-Za-z]{2})"#).unwrap(),
    mode: Regex::new(r#"mode"\s*:\s*"(?P<mode>[a-z_]+)"#).unwrap(),
    timestamp: Regex::new(r#"timestamp"\s*:\s*(?P<ts>\d+(?:\.\d+)?(?:[eE][+-]?\d+)?)"#).unwrap(),
    server: Regex::new(r#"(?P<country>[A-Za-z]{2})"\s*:\s*\[\s*"[A-Z]+\s+(?P<host>[^\s:"]+):443"#)
        .unwrap(),
});

/// Scanner for Browsec logs on every browser.
pub struct BrowsecScanner {
    browser: Browser,
    grammar: &'static BrowsecGrammar,
}

impl BrowsecScanner {
    /// Scanner for the LevelDB log of Chrome or Edge.
    pub fn chromium(browser: Browser) -> Self {
        Self {
            browser,
            grammar: &ESCAPED,
        }
    }

    /// Scanner for the `log` key of the Firefox object store.
    pub fn firefox() -> Self {
        Self {
            browser: Browser::Firefox,
            grammar: &PLAIN,
        }
    }

    /// Log text of the artifact; `None` when a store holds no log.
    fn log_text<'a>(&self, artifact: &'a Artifact) -> Result<Option<Cow<'a, str>>> {
        let variant = self.variant();
        match self.browser.family() {
            BrowserFamily::Chromium => Ok(Some(Cow::Borrowed(expect_text(variant, artifact)?))),
            BrowserFamily::Firefox => {
                let store = expect_store(variant, artifact)?;
                Ok(store.get(STORE_LOG_KEY).map(|value| match value {
                    Value::String(s) => Cow::Owned(s),
                    other => Cow::Owned(other.to_string()),
                }))
            }
        }
    }

    fn scan_text(&self, text: &str, outcome: &mut ScanOutcome) -> Result<()> {
        let variant = self.variant();
        let grammar = self.grammar;

        let anchored = text.rfind(SERVERS_ANCHOR);
        let start = match anchored {
            Some(pos) => pos,
            None => {
                tracing::debug!(%variant, "No extension start marker, scanning whole log");
                0
            }
        };
        let mut cursor = Cursor::starting_at(text, start);
        // Without a start marker the state before the first update is unknown.
        let mut on = false;
        let mut first = anchored.is_none();

        while let Some(update) = cursor.next_anchor(UPDATE_ANCHOR) {
            let record_end = cursor.peek_anchor(UPDATE_ANCHOR).unwrap_or(text.len());
            let record = &text[update..record_end];

            let state_pos = record
                .find(STATE_MARKER)
                .ok_or_else(|| malformed(variant, update, "PAC update without new state"))?;
            let state = &record[state_pos..];

            let country = grammar
                .country
                .captures(state)
                .and_then(|caps| caps.name("country"))
                .ok_or_else(|| malformed(variant, update, "PAC update without country"))?
                .as_str();
            let mode = grammar
                .mode
                .captures(state)
                .and_then(|caps| caps.name("mode"))
                .ok_or_else(|| malformed(variant, update, "PAC update without mode"))?
                .as_str();
            let raw_ts = grammar
                .timestamp
                .captures(state)
                .and_then(|caps| caps.name("ts"))
                .ok_or_else(|| malformed(variant, update, "PAC update without timestamp"))?
                .as_str();
            let timestamp = parse_millis(raw_ts).ok_or_else(|| {
                malformed(variant, update, format!("unparsable timestamp {:?}", raw_ts))
            })?;

            let host = record.find(LOW_LEVEL_ANCHOR).and_then(|low| {
                grammar
                    .server
                    .captures_iter(&record[low..])
                    .find(|caps| caps["country"].eq_ignore_ascii_case(country))
                    .map(|caps| caps["host"].to_string())
            });

            let kind = if mode == PROXY_MODE {
                EventKind::Connect
            } else if on || first {
                EventKind::Disconnect
            } else {
                tracing::debug!(%variant, offset = update, mode, "Skipping idle PAC update");
                continue;
            };
            first = false;
            on = kind == EventKind::Connect;

            if kind == EventKind::Connect && host.is_none() {
                return Err(malformed(
                    variant,
                    update,
                    format!("no low level PAC server for country {}", country),
                ));
            }

            let mut attributes = Attributes::new();
            attributes.insert(ATTR_PROXY.to_string(), host.unwrap_or_default());
            attributes.insert(ATTR_COUNTRY.to_string(), country.to_string());
            outcome.push(timestamp, kind, attributes);
        }

        Ok(())
    }
}

impl EventScanner for BrowsecScanner {
    fn variant(&self) -> Variant {
        Variant::new(self.browser, Extension::Browsec)
    }

    fn scan(&self, artifact: &Artifact) -> Result<ScanOutcome> {
        let variant = self.variant();
        let mut outcome = ScanOutcome::default();

        match self.log_text(artifact)? {
            Some(text) => self.scan_text(&text, &mut outcome)?,
            None => tracing::warn!(%variant, "Object store has no log key"),
        }

        if outcome.events.is_empty() {
            outcome.caution(Caution::NoSessionMarkers);
        }

        tracing::info!(%variant, events = outcome.events.len(), "Scanned log");
        Ok(outcome)
    }
}
