//! Core domain types for vpntrail
//!
//! ## Terminology
//!
//! | Term | Definition |
//! |------|------------|
//! | **Artifact** | A forensic capture left by a VPN extension (log text or object store) |
//! | **Anchor** | A fixed substring in a log that marks the start of an event record |
//! | **Event** | A connect or disconnect recovered from an artifact |
//! | **Session** | An interval of VPN-tunnel activity with proxy attributes |
//! | **Visit** | One row of the browser's visited-URL timeline |
//! | **Sentinel** | A placeholder boundary (`0` or [`SENTINEL_MAX`]) for an unknown start or stop |

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Stop timestamp assigned to a session that never closed (2033-05-18).
///
/// Far enough in the future that an open session contains every visit
/// recorded after its start.
pub const SENTINEL_MAX: i64 = 1_999_999_999;

/// Start timestamp assigned to a session whose start was never recorded.
pub const SENTINEL_MIN: i64 = 0;

/// Attribute key holding the display string written to the `Proxy` column.
pub const ATTR_PROXY: &str = "proxy";

/// Attribute key holding a two-letter proxy country code.
pub const ATTR_COUNTRY: &str = "country";

/// String attributes attached to events and sessions.
pub type Attributes = BTreeMap<String, String>;

// ============================================
// Browser / Extension
// ============================================

/// Browser that produced the artifact and history file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Browser {
    Chrome,
    Edge,
    Firefox,
}

impl Browser {
    /// Returns the display name for this browser
    pub fn display_name(&self) -> &'static str {
        match self {
            Browser::Chrome => "Chrome",
            Browser::Edge => "Edge",
            Browser::Firefox => "Firefox",
        }
    }

    /// Returns the lowercase identifier used in file names
    pub fn as_str(&self) -> &'static str {
        match self {
            Browser::Chrome => "chrome",
            Browser::Edge => "edge",
            Browser::Firefox => "firefox",
        }
    }

    /// Chrome and Edge share storage layouts; Firefox has its own.
    pub fn family(&self) -> BrowserFamily {
        match self {
            Browser::Chrome | Browser::Edge => BrowserFamily::Chromium,
            Browser::Firefox => BrowserFamily::Firefox,
        }
    }
}

impl std::fmt::Display for Browser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Browser {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "chrome" => Ok(Browser::Chrome),
            "edge" => Ok(Browser::Edge),
            "firefox" => Ok(Browser::Firefox),
            _ => Err(format!("unknown browser: {}", s)),
        }
    }
}

/// Storage layout family shared by several browsers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BrowserFamily {
    /// Chrome and Edge: LevelDB extension logs, `History` database
    Chromium,
    /// Firefox: IndexedDB object stores, `places.sqlite`
    Firefox,
}

/// VPN browser extension that left the artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Extension {
    TouchVpn,
    ZenMate,
    Browsec,
}

impl Extension {
    /// Returns the display name for this extension
    pub fn display_name(&self) -> &'static str {
        match self {
            Extension::TouchVpn => "TouchVPN",
            Extension::ZenMate => "ZenMate",
            Extension::Browsec => "Browsec",
        }
    }

    /// Returns the lowercase identifier used in file names
    pub fn as_str(&self) -> &'static str {
        match self {
            Extension::TouchVpn => "touchvpn",
            Extension::ZenMate => "zenmate",
            Extension::Browsec => "browsec",
        }
    }

    /// Whether this vendor ships a static proxy reference table.
    pub fn has_proxy_list(&self) -> bool {
        matches!(self, Extension::ZenMate)
    }
}

impl std::fmt::Display for Extension {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Extension {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "touchvpn" => Ok(Extension::TouchVpn),
            "zenmate" => Ok(Extension::ZenMate),
            "browsec" => Ok(Extension::Browsec),
            _ => Err(format!("unknown extension: {}", s)),
        }
    }
}

/// A browser × extension pair; selects the scanner grammar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Variant {
    pub browser: Browser,
    pub extension: Extension,
}

impl Variant {
    pub fn new(browser: Browser, extension: Extension) -> Self {
        Self { browser, extension }
    }
}

impl std::fmt::Display for Variant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}/{}",
            self.browser.display_name(),
            self.extension.display_name()
        )
    }
}

// ============================================
// Events and Sessions
// ============================================

/// Kind of status transition recovered from an artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Connect,
    Disconnect,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Connect => "connect",
            EventKind::Disconnect => "disconnect",
        }
    }
}

/// A single connect/disconnect recovered by a scanner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// Position in scan order, starting at 0
    pub sequence_index: usize,
    /// Epoch seconds
    pub timestamp: i64,
    pub kind: EventKind,
    pub attributes: Attributes,
}

/// A reconstructed interval of VPN activity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// 1-based, sequential in emission order
    pub id: i64,
    /// Epoch seconds, [`SENTINEL_MIN`] if the start was never recorded
    pub start: i64,
    /// Epoch seconds, [`SENTINEL_MAX`] if the session never closed
    pub stop: i64,
    pub attributes: Attributes,
}

impl Session {
    /// Inclusive interval containment.
    pub fn contains(&self, ts: i64) -> bool {
        self.start <= ts && ts <= self.stop
    }

    pub fn is_open_ended(&self) -> bool {
        self.stop == SENTINEL_MAX
    }

    pub fn is_open_start(&self) -> bool {
        self.start == SENTINEL_MIN
    }

    /// Display string persisted in the `Proxy` column.
    pub fn proxy(&self) -> Option<&str> {
        self.attributes.get(ATTR_PROXY).map(String::as_str)
    }
}

// ============================================
// History
// ============================================

/// One visit from the browser history timeline, normalized to epoch seconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Visit {
    pub id: i64,
    pub timestamp: i64,
    pub url: String,
    pub title: String,
}

/// A visit joined with the proxy of the session that contains it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorrelatedRecord {
    /// Epoch seconds
    pub visit_time: i64,
    pub url: String,
    pub title: String,
    /// `None` when no session contains the visit
    pub proxy_attributes: Option<String>,
}

impl CorrelatedRecord {
    pub fn is_matched(&self) -> bool {
        self.proxy_attributes.is_some()
    }
}

// ============================================
// Cautions
// ============================================

/// Soft conditions surfaced to the investigator; never abort a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Caution {
    /// A session has no recorded stop and extends to [`SENTINEL_MAX`]
    OpenEnded,
    /// A session has no recorded start and begins at the epoch
    OpenStart,
    /// The grammar records only connection times, so each session closes at the next start
    NoStopMarkers,
    /// The artifact contained no recoverable markers at all
    NoSessionMarkers,
    /// The proxy reference dataset was not found
    MissingProxyList(PathBuf),
}

impl std::fmt::Display for Caution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Caution::OpenEnded => write!(
                f,
                "there is no timestamp for VPN-stop, so the VPN history includes all of the history after VPN-start"
            ),
            Caution::OpenStart => write!(
                f,
                "there is no timestamp for VPN-start, so the VPN history includes all of the history until VPN-stop"
            ),
            Caution::NoStopMarkers => write!(
                f,
                "there is no timestamp for VPN-stop, so the VPN history includes all of the history between timestamps for VPN-start"
            ),
            Caution::NoSessionMarkers => write!(
                f,
                "there is no timestamp in the artifact, so no VPN session could be recovered"
            ),
            Caution::MissingProxyList(path) => write!(
                f,
                "proxy reference list {} not found, proxy_list table was not created",
                path.display()
            ),
        }
    }
}
