//! Persistent cache for remote metadata requests.
//!
//! Responses are memoized as JSON values in a single file, keyed by
//! namespace and request key, so repeated imports of the same DOI never
//! hit the network twice. On a miss the caller's fetch runs after a short
//! politeness delay.

use crate::error::Result;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Pause before an uncached remote request.
const POLITENESS_DELAY: Duration = Duration::from_millis(400);

type CacheMap = BTreeMap<String, BTreeMap<String, Value>>;

/// On-disk request memo, loaded eagerly and rewritten after every insert.
pub struct RequestCache {
    path: PathBuf,
    entries: CacheMap,
}

impl RequestCache {
    /// Load the cache at `path`, starting empty when the file is absent.
    pub fn open(path: &Path) -> Result<Self> {
        let entries = if path.exists() {
            serde_json::from_str(&fs::read_to_string(path)?)?
        } else {
            CacheMap::new()
        };
        Ok(Self {
            path: path.to_path_buf(),
            entries,
        })
    }

    pub fn get(&self, namespace: &str, key: &str) -> Option<&Value> {
        self.entries.get(namespace).and_then(|ns| ns.get(key))
    }

    /// Return the cached response, or run `fetch` (after the politeness
    /// delay) and persist its result.
    pub fn get_or_fetch<F>(&mut self, namespace: &str, key: &str, fetch: F) -> Result<Value>
    where
        F: FnOnce() -> Result<Value>,
    {
        if let Some(hit) = self.get(namespace, key) {
            debug!(namespace, key, "request cache hit");
            return Ok(hit.clone());
        }

        std::thread::sleep(POLITENESS_DELAY);
        let value = fetch()?;

        self.entries
            .entry(namespace.to_string())
            .or_default()
            .insert(key.to_string(), value.clone());
        self.save()?;
        Ok(value)
    }

    fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, serde_json::to_string(&self.entries)?)?;
        Ok(())
    }
}
