use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::error::{Result, SearchError};

/// String key/value store with last-writer-wins semantics, shaped like browser local storage.
pub trait Storage {
    fn get(&self, key: &str) -> Option<String>;

    fn set(&self, key: &str, value: &str);

    fn remove(&self, key: &str);
}

#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: RwLock<BTreeMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> BTreeMap<String, String> {
        self.entries.read().clone()
    }
}

impl Storage for MemoryStorage {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.read().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) {
        self.entries.write().insert(key.to_string(), value.to_string());
    }

    fn remove(&self, key: &str) {
        self.entries.write().remove(key);
    }
}

impl<S: Storage + ?Sized> Storage for std::sync::Arc<S> {
    fn get(&self, key: &str) -> Option<String> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &str) {
        (**self).set(key, value)
    }

    fn remove(&self, key: &str) {
        (**self).remove(key)
    }
}

/// JSON object on disk, rewritten after every change.
///
/// Write failures are logged and otherwise dropped; the in-memory view stays current.
#[derive(Debug)]
pub struct FileStorage {
    path: PathBuf,
    entries: RwLock<BTreeMap<String, String>>,
}

impl FileStorage {
    /// Opens `path`, starting empty when the file does not exist yet.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let entries = match fs::read_to_string(&path) {
            Ok(raw) if raw.trim().is_empty() => BTreeMap::new(),
            Ok(raw) => serde_json::from_str(&raw)?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "storage file absent, starting empty");
                BTreeMap::new()
            }
            Err(err) => return Err(SearchError::io(&path, err)),
        };
        Ok(Self {
            path,
            entries: RwLock::new(entries),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self) {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            if let Err(err) = fs::create_dir_all(parent) {
                warn!(error = %err, "failed to create storage directory");
                return;
            }
        }
        let bytes = match serde_json::to_vec_pretty(&*self.entries.read()) {
            Ok(bytes) => bytes,
            Err(err) => {
                warn!(error = %err, "failed to serialize storage");
                return;
            }
        };
        if let Err(err) = fs::write(&self.path, bytes) {
            warn!(error = %err, path = %self.path.display(), "failed to write storage file");
        }
    }
}

impl Storage for FileStorage {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.read().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) {
        self.entries.write().insert(key.to_string(), value.to_string());
        self.flush();
    }

    fn remove(&self, key: &str) {
        let removed = self.entries.write().remove(key).is_some();
        if removed {
            self.flush();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_storage_last_write_wins() {
        let storage = MemoryStorage::new();
        storage.set("k", "1");
        storage.set("k", "2");
        assert_eq!(storage.get("k").as_deref(), Some("2"));
        storage.remove("k");
        storage.remove("k");
        assert_eq!(storage.get("k"), None);
    }

    #[test]
    fn file_storage_persists_across_opens() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("prefs.json");
        {
            let storage = FileStorage::open(&path).unwrap();
            assert_eq!(storage.get("bibletexts-dark-mode"), None);
            storage.set("bibletexts-dark-mode", "true");
            storage.set("bibletexts-font-size", "20");
            storage.remove("bibletexts-font-size");
        }
        let storage = FileStorage::open(&path).unwrap();
        assert_eq!(storage.get("bibletexts-dark-mode").as_deref(), Some("true"));
        assert_eq!(storage.get("bibletexts-font-size"), None);
    }

    #[test]
    fn file_storage_rejects_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prefs.json");
        fs::write(&path, "[1, 2").unwrap();
        assert!(matches!(FileStorage::open(&path), Err(SearchError::Json(_))));
    }
}
