//! TouchVPN scanners
//!
//! ## Chrome / Edge
//!
//! TouchVPN writes its whole state to `chrome.storage.local` on every change,
//! so the LevelDB log holds one record per status transition. Each record
//! contains the key `Proxy.Status.status` followed by a JSON value such as
//! `{"status":"connected", ...}` and the active server hostnames. The
//! reporting queue written just before the status record carries the
//! transition time as `"ts":<milliseconds>`.
//!
//! ## Firefox
//!
//! Only the current state survives in IndexedDB: the status object, the
//! reporting queue and the server lists. At most one session can be
//! recovered, and either its start or its stop is unknown.

use super::{
    epoch_seconds, expect_store, expect_text, join_addresses, malformed, window, Cursor,
    EventScanner, ScanOutcome,
};
use crate::artifact::Artifact;
use crate::error::Result;
use crate::types::{Attributes, Browser, Caution, EventKind, Extension, Variant, ATTR_PROXY};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

const STATUS_ANCHOR: &str = "Proxy.Status.status";

/// Bytes after the anchor searched for status and server hostnames, cut
/// short at the next status record.
const RECORD_WINDOW: usize = 800;

static TS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#""ts"\s*:\s*(?P<ts>\d+(?:\.\d+)?(?:[eE][+-]?\d+)?)"#).unwrap());
static STATUS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#""status"\s*:\s*"(?P<status>[A-Za-z_]+)""#).unwrap());
static HOST_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r#"[^\s"]+\.com"#).unwrap());

const STORE_STATUS_KEY: &str = "Proxy.Status.status";
const STORE_QUEUE_KEY: &str = "Reporting.Internal.queue";
const STORE_ACTIVE_SERVERS_KEY: &str = "Proxy.Servers.active";
const STORE_CONFIG_KEY: &str = "Proxy.Config.config";

/// Scanner for TouchVPN LevelDB logs (Chrome, Edge).
pub struct TouchVpnLogScanner {
    browser: Browser,
}

impl TouchVpnLogScanner {
    pub fn new(browser: Browser) -> Self {
        Self { browser }
    }
}

impl EventScanner for TouchVpnLogScanner {
    fn variant(&self) -> Variant {
        Variant::new(self.browser, Extension::TouchVpn)
    }

    fn scan(&self, artifact: &Artifact) -> Result<ScanOutcome> {
        let variant = self.variant();
        let text = expect_text(variant, artifact)?;
        let mut outcome = ScanOutcome::default();
        let mut cursor = Cursor::new(text);
        // The timestamp for an anchor is searched back to the previous anchor only.
        let mut lookbehind_start = 0;

        while let Some(anchor) = cursor.next_anchor(STATUS_ANCHOR) {
            let lookbehind = &text[lookbehind_start..anchor];
            let raw_ts = TS_RE
                .captures_iter(lookbehind)
                .last()
                .and_then(|caps| caps.name("ts"))
                .ok_or_else(|| malformed(variant, anchor, "no \"ts\" before status record"))?;
            let timestamp = super::parse_millis(raw_ts.as_str()).ok_or_else(|| {
                malformed(
                    variant,
                    anchor,
                    format!("unparsable timestamp {:?}", raw_ts.as_str()),
                )
            })?;

            let record_end = cursor.peek_anchor(STATUS_ANCHOR).unwrap_or(text.len());
            let record = window(&text[..record_end], anchor, RECORD_WINDOW);
            let status = STATUS_RE
                .captures(record)
                .and_then(|caps| caps.name("status"))
                .ok_or_else(|| malformed(variant, anchor, "no \"status\" in status record"))?
                .as_str();

            // "connected" and "connecting" both mark the tunnel coming up.
            let kind = if status.starts_with("con") {
                EventKind::Connect
            } else {
                EventKind::Disconnect
            };

            let hosts: Vec<&str> = HOST_RE.find_iter(record).map(|m| m.as_str()).collect();
            let mut attributes = Attributes::new();
            attributes.insert(ATTR_PROXY.to_string(), hosts.join(", "));

            outcome.push(timestamp, kind, attributes);
            lookbehind_start = anchor + STATUS_ANCHOR.len();
        }

        if outcome.events.is_empty() {
            outcome.caution(Caution::NoSessionMarkers);
        }

        tracing::info!(%variant, events = outcome.events.len(), "Scanned log");
        Ok(outcome)
    }
}

/// Scanner for TouchVPN IndexedDB state (Firefox).
pub struct TouchVpnStoreScanner;

impl EventScanner for TouchVpnStoreScanner {
    fn variant(&self) -> Variant {
        Variant::new(Browser::Firefox, Extension::TouchVpn)
    }

    fn scan(&self, artifact: &Artifact) -> Result<ScanOutcome> {
        let variant = self.variant();
        let store = expect_store(variant, artifact)?;
        let mut outcome = ScanOutcome::default();

        let status = store
            .get(STORE_STATUS_KEY)
            .and_then(|v| v.get("status").and_then(Value::as_str).map(str::to_string))
            .unwrap_or_default();
        tracing::info!(%variant, status = %status, "Proxy status");

        let last_report = store
            .get(STORE_QUEUE_KEY)
            .and_then(|queue| queue.as_array().and_then(|q| q.last().cloned()));

        let Some(report) = last_report else {
            tracing::warn!(%variant, "Reporting queue is empty, no timestamp available");
            outcome.caution(Caution::NoSessionMarkers);
            return Ok(outcome);
        };

        let timestamp = report
            .get("payload")
            .and_then(|p| p.get("ts"))
            .and_then(epoch_seconds)
            .ok_or_else(|| malformed(variant, 0, "last reporting entry has no payload.ts"))?;

        let mut attributes = Attributes::new();
        if status == "connected" {
            let servers = store.get(STORE_ACTIVE_SERVERS_KEY);
            attributes.insert(ATTR_PROXY.to_string(), join_addresses(servers.as_ref()));
            outcome.push(timestamp, EventKind::Connect, attributes);
            outcome.caution(Caution::OpenEnded);
        } else {
            let free = store
                .get(STORE_CONFIG_KEY)
                .and_then(|config| config.get("free").cloned());
            attributes.insert(ATTR_PROXY.to_string(), join_addresses(free.as_ref()));
            outcome.push(timestamp, EventKind::Disconnect, attributes);
            outcome.caution(Caution::OpenStart);
        }

        Ok(outcome)
    }
}
