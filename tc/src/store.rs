//! Core TierStore implementation

use eyre::{Context, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// A cached entry together with the provenance needed for staleness checks
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entry<T> {
    /// The key this entry was stored under (filenames are hashes, so the
    /// key is kept inside the entry to detect hash collisions)
    pub key: String,
    /// Tier-specific payload
    pub payload: T,
    /// Fingerprint of the source content that produced the payload
    pub fingerprint: u64,
    /// Modification time of the source, unix milliseconds
    pub mtime_ms: i64,
    /// When the entry was written, unix milliseconds
    pub stored_at_ms: i64,
}

/// The tiered cache store
pub struct TierStore {
    /// Base path for storage
    base_path: PathBuf,
}

impl TierStore {
    /// Open or create a tier store at the given path
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let base_path = path.as_ref().to_path_buf();
        fs::create_dir_all(&base_path).context("Failed to create store directory")?;
        debug!(?base_path, "Opened tier store");
        Ok(Self { base_path })
    }

    /// Load an entry from a namespace
    ///
    /// Returns `Ok(None)` on absence, on a hash collision with a different
    /// key, and on an unreadable or undecodable entry file - a damaged
    /// entry is a cache miss, never an error surfaced to the caller.
    pub fn load<T: DeserializeOwned>(&self, namespace: &str, key: &str) -> Result<Option<Entry<T>>> {
        let path = self.entry_path(namespace, key);
        if !path.exists() {
            return Ok(None);
        }

        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) => {
                warn!(namespace, key, error = %e, "Failed to read cache entry, treating as miss");
                return Ok(None);
            }
        };

        match serde_json::from_str::<Entry<T>>(&content) {
            Ok(entry) if entry.key == key => Ok(Some(entry)),
            Ok(entry) => {
                warn!(namespace, key, stored_key = %entry.key, "Cache key collision, treating as miss");
                Ok(None)
            }
            Err(e) => {
                warn!(namespace, key, error = %e, "Failed to decode cache entry, treating as miss");
                Ok(None)
            }
        }
    }

    /// Store an entry into a namespace
    pub fn store<T: Serialize>(
        &self,
        namespace: &str,
        key: &str,
        payload: &T,
        fingerprint: u64,
        mtime_ms: i64,
    ) -> Result<()> {
        let dir = self.base_path.join(namespace);
        fs::create_dir_all(&dir).context(format!("Failed to create namespace directory: {namespace}"))?;

        let entry = Entry {
            key: key.to_string(),
            payload,
            fingerprint,
            mtime_ms,
            stored_at_ms: now_ms(),
        };

        let json = serde_json::to_string(&entry)?;
        let path = self.entry_path(namespace, key);
        fs::write(&path, json).context(format!("Failed to write cache entry: {}", path.display()))?;
        Ok(())
    }

    /// Remove a single entry, if present
    pub fn remove(&self, namespace: &str, key: &str) -> Result<()> {
        let path = self.entry_path(namespace, key);
        if path.exists() {
            fs::remove_file(&path).context(format!("Failed to remove cache entry: {}", path.display()))?;
        }
        Ok(())
    }

    /// Drop every entry in a namespace
    pub fn clear_namespace(&self, namespace: &str) -> Result<()> {
        let dir = self.base_path.join(namespace);
        if dir.exists() {
            fs::remove_dir_all(&dir).context(format!("Failed to clear namespace: {namespace}"))?;
            debug!(namespace, "Cleared namespace");
        }
        Ok(())
    }

    /// Read a meta slot
    pub fn get_meta<T: DeserializeOwned>(&self, slot: &str) -> Result<Option<T>> {
        let path = self.meta_path(slot);
        if !path.exists() {
            return Ok(None);
        }

        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) => {
                warn!(slot, error = %e, "Failed to read meta slot, treating as absent");
                return Ok(None);
            }
        };

        match serde_json::from_str(&content) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                warn!(slot, error = %e, "Failed to decode meta slot, treating as absent");
                Ok(None)
            }
        }
    }

    /// Write a meta slot
    pub fn put_meta<T: Serialize>(&self, slot: &str, value: &T) -> Result<()> {
        let dir = self.base_path.join("meta");
        fs::create_dir_all(&dir).context("Failed to create meta directory")?;

        let json = serde_json::to_string(value)?;
        let path = self.meta_path(slot);
        fs::write(&path, json).context(format!("Failed to write meta slot: {slot}"))?;
        Ok(())
    }

    fn entry_path(&self, namespace: &str, key: &str) -> PathBuf {
        self.base_path
            .join(namespace)
            .join(format!("{:016x}.json", fingerprint(key.as_bytes())))
    }

    fn meta_path(&self, slot: &str) -> PathBuf {
        let name: String = slot
            .chars()
            .map(|c| if c.is_alphanumeric() { c } else { '-' })
            .collect();
        self.base_path.join("meta").join(format!("{name}.json"))
    }
}

/// Content hash for change detection (not cryptographic)
pub fn fingerprint(data: &[u8]) -> u64 {
    use std::hash::{Hash, Hasher};
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    data.hash(&mut hasher);
    hasher.finish()
}

/// Current time as unix milliseconds
pub fn now_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn open_store() -> (TempDir, TierStore) {
        let dir = TempDir::new().unwrap();
        let store = TierStore::open(dir.path().join("cache")).unwrap();
        (dir, store)
    }

    #[test]
    fn test_store_and_load() {
        let (_dir, store) = open_store();
        let payload = vec!["a".to_string(), "b".to_string()];
        let fp = fingerprint(b"content");

        store.store("raw", "notes/todo.md", &payload, fp, 1234).unwrap();

        let entry = store.load::<Vec<String>>("raw", "notes/todo.md").unwrap().unwrap();
        assert_eq!(entry.key, "notes/todo.md");
        assert_eq!(entry.payload, payload);
        assert_eq!(entry.fingerprint, fp);
        assert_eq!(entry.mtime_ms, 1234);
    }

    #[test]
    fn test_load_absent() {
        let (_dir, store) = open_store();
        let entry = store.load::<Vec<String>>("raw", "missing.md").unwrap();
        assert!(entry.is_none());
    }

    #[test]
    fn test_namespaces_are_independent() {
        let (_dir, store) = open_store();
        store.store("raw", "a.md", &1u32, 1, 1).unwrap();
        store.store("augmented", "a.md", &2u32, 2, 2).unwrap();

        assert_eq!(store.load::<u32>("raw", "a.md").unwrap().unwrap().payload, 1);
        assert_eq!(store.load::<u32>("augmented", "a.md").unwrap().unwrap().payload, 2);
    }

    #[test]
    fn test_remove() {
        let (_dir, store) = open_store();
        store.store("raw", "a.md", &1u32, 1, 1).unwrap();
        store.remove("raw", "a.md").unwrap();
        assert!(store.load::<u32>("raw", "a.md").unwrap().is_none());

        // Removing an absent entry is a no-op
        store.remove("raw", "a.md").unwrap();
    }

    #[test]
    fn test_clear_namespace() {
        let (_dir, store) = open_store();
        store.store("raw", "a.md", &1u32, 1, 1).unwrap();
        store.store("raw", "b.md", &2u32, 2, 2).unwrap();
        store.store("augmented", "a.md", &3u32, 3, 3).unwrap();

        store.clear_namespace("raw").unwrap();

        assert!(store.load::<u32>("raw", "a.md").unwrap().is_none());
        assert!(store.load::<u32>("raw", "b.md").unwrap().is_none());
        assert!(store.load::<u32>("augmented", "a.md").unwrap().is_some());
    }

    #[test]
    fn test_overwrite_entry() {
        let (_dir, store) = open_store();
        store.store("raw", "a.md", &1u32, 1, 1).unwrap();
        store.store("raw", "a.md", &2u32, 5, 6).unwrap();

        let entry = store.load::<u32>("raw", "a.md").unwrap().unwrap();
        assert_eq!(entry.payload, 2);
        assert_eq!(entry.fingerprint, 5);
        assert_eq!(entry.mtime_ms, 6);
    }

    #[test]
    fn test_damaged_entry_is_a_miss() {
        let (_dir, store) = open_store();
        store.store("raw", "a.md", &1u32, 1, 1).unwrap();

        // Corrupt the entry file on disk
        let path = store.entry_path("raw", "a.md");
        fs::write(&path, "not json").unwrap();

        assert!(store.load::<u32>("raw", "a.md").unwrap().is_none());
    }

    #[test]
    fn test_meta_slots() {
        let (_dir, store) = open_store();
        assert!(store.get_meta::<Vec<String>>("filter:suppressed-inline").unwrap().is_none());

        let paths = vec!["a.md".to_string(), "b.md".to_string()];
        store.put_meta("filter:suppressed-inline", &paths).unwrap();

        let loaded = store.get_meta::<Vec<String>>("filter:suppressed-inline").unwrap().unwrap();
        assert_eq!(loaded, paths);
    }

    #[test]
    fn test_fingerprint_deterministic() {
        assert_eq!(fingerprint(b"hello"), fingerprint(b"hello"));
        assert_ne!(fingerprint(b"hello"), fingerprint(b"hello "));
    }
}
