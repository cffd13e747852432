//! Artifact reader
//!
//! Locates and opens the capture an extension left behind:
//!
//! - **Chrome / Edge** keep extension state in a LevelDB directory
//!   (`Local Extension Settings/<extension-id>/`). Its `*.log` write-ahead log
//!   is read as lossy UTF-8 text.
//! - **Firefox** keeps extension state in IndexedDB. The store is read from a
//!   JSON export of its object store (`*.json`).

mod store;

pub use store::{KeyValueStore, ObjectStore};

use crate::error::{Error, Result};
use crate::types::BrowserFamily;
use std::path::{Path, PathBuf};

/// Shape of the artifact a browser family leaves behind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    /// Free-form log text
    Log,
    /// Key-value object store
    Store,
}

impl ArtifactKind {
    pub fn for_family(family: BrowserFamily) -> Self {
        match family {
            BrowserFamily::Chromium => ArtifactKind::Log,
            BrowserFamily::Firefox => ArtifactKind::Store,
        }
    }

    /// Glob pattern for this kind, relative to the artifact directory.
    pub fn pattern(&self) -> &'static str {
        match self {
            ArtifactKind::Log => "*.log",
            ArtifactKind::Store => "*.json",
        }
    }
}

/// An opened capture. Immutable once read.
pub enum Artifact {
    Text(String),
    Store(Box<dyn ObjectStore>),
}

impl Artifact {
    /// Wrap raw bytes as text, replacing invalid UTF-8 sequences.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Artifact::Text(String::from_utf8_lossy(bytes).into_owned())
    }

    pub fn from_store(store: impl ObjectStore + 'static) -> Self {
        Artifact::Store(Box::new(store))
    }

    pub fn kind(&self) -> ArtifactKind {
        match self {
            Artifact::Text(_) => ArtifactKind::Log,
            Artifact::Store(_) => ArtifactKind::Store,
        }
    }
}

/// Find the artifact file of the given kind inside `dir`.
///
/// LevelDB keeps a single live log, so the first `*.log` is used. For object
/// store exports the last match in sorted order is used, which is the most
/// recent when exports carry a timestamp or sequence in their name.
pub fn discover(dir: &Path, kind: ArtifactKind) -> Result<PathBuf> {
    let full_pattern = dir.join(kind.pattern());
    let pattern_str = full_pattern.to_string_lossy();

    let entries = glob::glob(&pattern_str)
        .map_err(|e| Error::Config(format!("invalid artifact pattern: {}", e)))?;

    let mut matches: Vec<PathBuf> = entries.flatten().filter(|p| p.is_file()).collect();
    matches.sort();

    let chosen = match kind {
        ArtifactKind::Log => matches.into_iter().next(),
        ArtifactKind::Store => matches.into_iter().last(),
    };

    chosen.ok_or_else(|| Error::ArtifactNotFound {
        path: dir.to_path_buf(),
        pattern: kind.pattern().to_string(),
    })
}

/// Read the artifact at `path`.
pub fn load(path: &Path, kind: ArtifactKind) -> Result<Artifact> {
    if !path.exists() {
        return Err(Error::ArtifactNotFound {
            path: path.to_path_buf(),
            pattern: kind.pattern().to_string(),
        });
    }

    let artifact = match kind {
        ArtifactKind::Log => Artifact::from_bytes(&std::fs::read(path)?),
        ArtifactKind::Store => Artifact::from_store(KeyValueStore::from_json_file(path)?),
    };

    tracing::info!(path = %path.display(), kind = ?kind, "Artifact loaded");
    Ok(artifact)
}

/// Discover and read the artifact for a browser family in one step.
pub fn open(dir: &Path, family: BrowserFamily) -> Result<(PathBuf, Artifact)> {
    let kind = ArtifactKind::for_family(family);
    let path = discover(dir, kind)?;
    let artifact = load(&path, kind)?;
    Ok((path, artifact))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_discover_first_log() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("000005.log"), "b").unwrap();
        std::fs::write(dir.path().join("000003.log"), "a").unwrap();
        std::fs::write(dir.path().join("CURRENT"), "MANIFEST-000001").unwrap();

        let path = discover(dir.path(), ArtifactKind::Log).unwrap();
        assert!(path.ends_with("000003.log"));
    }

    #[test]
    fn test_discover_last_store() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("export-1.json"), "{}").unwrap();
        std::fs::write(dir.path().join("export-2.json"), "{}").unwrap();

        let path = discover(dir.path(), ArtifactKind::Store).unwrap();
        assert!(path.ends_with("export-2.json"));
    }

    #[test]
    fn test_discover_missing() {
        let dir = TempDir::new().unwrap();
        let err = discover(dir.path(), ArtifactKind::Log).unwrap_err();
        assert!(matches!(err, Error::ArtifactNotFound { .. }));
    }

    #[test]
    fn test_load_lossy_text() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("000003.log");
        std::fs::write(&path, b"Proxy\xff\x01status").unwrap();

        match load(&path, ArtifactKind::Log).unwrap() {
            Artifact::Text(text) => {
                assert!(text.starts_with("Proxy"));
                assert!(text.ends_with("status"));
            }
            Artifact::Store(_) => panic!("expected text artifact"),
        }
    }

    #[test]
    fn test_kind_for_family() {
        assert_eq!(
            ArtifactKind::for_family(BrowserFamily::Chromium),
            ArtifactKind::Log
        );
        assert_eq!(
            ArtifactKind::for_family(BrowserFamily::Firefox),
            ArtifactKind::Store
        );
    }
}
