//! Key-value object store adapter
//!
//! Firefox extensions persist their state in IndexedDB. Scanners only ever
//! need keyed lookups into that state, so the adapter exposes nothing more
//! than [`ObjectStore::get`] and [`ObjectStore::list_keys`].

use crate::error::Result;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;

/// Read-only keyed access to an extension's persisted state.
pub trait ObjectStore {
    /// Value stored under `key`, or `None` if absent.
    fn get(&self, key: &str) -> Option<Value>;

    /// All keys present in the store.
    fn list_keys(&self) -> Vec<String>;
}

/// Object store loaded from a JSON export (one top-level object, key → value).
#[derive(Debug, Clone, Default)]
pub struct KeyValueStore {
    entries: BTreeMap<String, Value>,
}

impl KeyValueStore {
    pub fn from_map(entries: BTreeMap<String, Value>) -> Self {
        Self { entries }
    }

    pub fn from_json_str(content: &str) -> Result<Self> {
        let entries: BTreeMap<String, Value> = serde_json::from_str(content)?;
        Ok(Self { entries })
    }

    pub fn from_json_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let store = Self::from_json_str(&content)?;
        tracing::debug!(
            path = %path.display(),
            keys = store.entries.len(),
            "Loaded object store"
        );
        Ok(store)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl ObjectStore for KeyValueStore {
    fn get(&self, key: &str) -> Option<Value> {
        self.entries.get(key).cloned()
    }

    fn list_keys(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }
}
