//! # vpntrail-core
//!
//! Core library for vpntrail - a forensic extractor for browser VPN extensions.
//!
//! This library provides:
//! - Artifact discovery and reading (LevelDB log text, IndexedDB store exports)
//! - Per-variant event scanners for TouchVPN, ZenMate and Browsec
//! - Session reconstruction and history correlation
//! - The SQLite result database
//! - Configuration management
//! - Logging infrastructure
//!
//! ## Architecture
//!
//! A run is a strictly sequential pipeline:
//! - **Scan:** artifact → ordered connect/disconnect events
//! - **Build:** events → sessions `[start, stop]` with proxy attributes
//! - **Correlate:** browser history visits ⋈ sessions
//! - **Materialize:** `history`, `vpn`, `vpn_history` (+ `proxy_list`) tables
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::path::PathBuf;
//! use vpntrail_core::{pipeline, resolve_variant, ExtractionRequest};
//!
//! let request = ExtractionRequest {
//!     variant: resolve_variant("chrome", "touchvpn").expect("supported variant"),
//!     artifact_dir: PathBuf::from("Local Extension Settings/bihmplhobchoageeokmgbdihknkjbknd"),
//!     history_path: PathBuf::from("History"),
//!     output_dir: PathBuf::from("."),
//!     proxy_list: None,
//! };
//! let report = pipeline::run(&request).expect("extraction failed");
//! println!("{} sessions", report.sessions.len());
//! ```

// Re-export commonly used items at the crate root
pub use artifact::{Artifact, KeyValueStore, ObjectStore};
pub use config::Config;
pub use db::OutputDatabase;
pub use error::{Error, Result};
pub use pipeline::{ExtractionReport, ExtractionRequest, Reconstruction, Stage};
pub use scan::{resolve_variant, scanner_for, EventScanner, ScanOutcome};
pub use types::*;

// Public modules
pub mod artifact;
pub mod config;
pub mod correlate;
pub mod db;
pub mod error;
pub mod history;
pub mod logging;
pub mod pipeline;
pub mod proxy_list;
pub mod scan;
pub mod session;
pub mod types;
