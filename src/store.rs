//! # Persisted Key-Value Store
//!
//! Every piece of state the engine keeps between runs lives behind [`KeyValueStore`]: the
//! cached location, today's prayer set, the active notification batch and the user's settings.
//! Values are JSON strings so a corrupted entry can be detected and discarded.
//!
//! - [`MemoryStore`]: process-local, used by tests and short-lived tools
//! - [`FileStore`]: one `<key>.json` file per entry in a directory

use crate::error::Result;
use parking_lot::Mutex;
use serde::{de::DeserializeOwned, Serialize};
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::PathBuf;
use tracing::warn;

pub const LOCATION_KEY: &str = "location";
pub const PRAYER_TIMES_KEY: &str = "prayer_times";
pub const NOTIFICATION_BATCH_KEY: &str = "notification_batch";
pub const CALCULATION_METHOD_KEY: &str = "calculation_method";
pub const ADJUSTMENTS_KEY: &str = "prayer_adjustments";
pub const CONVENTIONS_KEY: &str = "calculation_conventions";

pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn put(&self, key: &str, value: &str) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;
}

/// Load and deserialize `key`.
///
/// An entry that no longer deserializes is removed and reported as absent; it is never
/// repaired in place.
pub fn load_json<T: DeserializeOwned>(store: &dyn KeyValueStore, key: &str) -> Result<Option<T>> {
    let Some(raw) = store.get(key)? else {
        return Ok(None);
    };
    match serde_json::from_str(&raw) {
        Ok(value) => Ok(Some(value)),
        Err(err) => {
            warn!(key, error = %err, "Discarding corrupted store entry");
            store.remove(key)?;
            Ok(None)
        }
    }
}

pub fn save_json<T: Serialize>(store: &dyn KeyValueStore, key: &str, value: &T) -> Result<()> {
    let data = serde_json::to_string(value)?;
    store.put(key, &data)
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.lock().get(key).cloned())
    }

    fn put(&self, key: &str, value: &str) -> Result<()> {
        self.entries.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.entries.lock().remove(key);
        Ok(())
    }
}

/// Stores each key as `<dir>/<key>.json`.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Create the directory if needed.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(FileStore { dir })
    }

    fn path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        match fs::read_to_string(self.path(key)) {
            Ok(data) => Ok(Some(data)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    fn put(&self, key: &str, value: &str) -> Result<()> {
        // Write-then-rename so a crash never leaves a half-written entry
        let tmp = self.dir.join(format!(".{key}.tmp"));
        fs::write(&tmp, value)?;
        fs::rename(&tmp, self.path(key))?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        match fs::remove_file(self.path(key)) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PrayerAdjustments;
    use tempfile::TempDir;

    #[test]
    fn test_file_store_persists_across_instances() {
        let dir = TempDir::new().unwrap();
        let adj = PrayerAdjustments {
            fajr: 3,
            ..Default::default()
        };

        let store = FileStore::open(dir.path()).unwrap();
        save_json(&store, ADJUSTMENTS_KEY, &adj).unwrap();

        let reopened = FileStore::open(dir.path()).unwrap();
        let loaded: Option<PrayerAdjustments> = load_json(&reopened, ADJUSTMENTS_KEY).unwrap();
        assert_eq!(loaded, Some(adj));
    }

    #[test]
    fn test_file_store_missing_key_is_none() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        assert_eq!(store.get("nothing").unwrap(), None);
        store.remove("nothing").unwrap();
    }

    #[test]
    fn test_corrupted_entry_is_discarded() {
        let store = MemoryStore::new();
        store.put(ADJUSTMENTS_KEY, "{not json").unwrap();

        let loaded: Option<PrayerAdjustments> = load_json(&store, ADJUSTMENTS_KEY).unwrap();
        assert!(loaded.is_none());
        assert_eq!(store.get(ADJUSTMENTS_KEY).unwrap(), None);
    }
}
