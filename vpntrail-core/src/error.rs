//! Error types for vpntrail-core

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for the vpntrail-core library
#[derive(Error, Debug)]
pub enum Error {
    /// Database error
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// No artifact file matched the discovery pattern
    #[error("no artifact matching {pattern} found in {}", path.display())]
    ArtifactNotFound { path: PathBuf, pattern: String },

    /// An anchor was located but its timestamp/attribute window did not parse
    #[error("malformed {variant} artifact at offset {offset}: {reason}")]
    MalformedArtifact {
        variant: String,
        offset: usize,
        reason: String,
    },

    /// Browser/extension pair has no scanner
    #[error("unsupported combination: {browser} with {extension}")]
    UnsupportedCombination { browser: String, extension: String },

    /// Browser history file could not be read
    #[error("history error: {0}")]
    History(String),
}

/// Result type alias for vpntrail-core
pub type Result<T> = std::result::Result<T, Error>;
