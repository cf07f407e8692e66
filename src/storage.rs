use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;

use crate::errors::{AppError, ResultExt};

/// Storage keys used by this service. All values are plain JSON blobs.
pub const OFFLINE_QUEUE_KEY: &str = "offline_actions";
pub const INTERACTION_LOG_KEY: &str = "contact_interactions";

/// Port for the persisted key-value blobs behind the offline queue and the
/// interaction log.
///
/// The production implementation is a single JSON file; tests substitute an
/// in-memory map. Implementations must be safe to share across handlers.
pub trait BlobStore: Send + Sync {
    /// Reads the blob stored under `key`, if any.
    fn get(&self, key: &str) -> Result<Option<String>, AppError>;

    /// Writes `value` under `key`, replacing any previous blob.
    fn put(&self, key: &str, value: &str) -> Result<(), AppError>;

    /// Removes the blob under `key`. Missing keys are not an error.
    fn remove(&self, key: &str) -> Result<(), AppError>;
}

/// File-backed blob store: one JSON object file mapping keys to blob strings.
///
/// Every mutation rewrites the whole file. The blobs here are small (an
/// offline queue and an interaction log), so simplicity wins over an
/// append-only format. A process-wide mutex serializes file access; this is
/// NOT a cross-process lock.
pub struct JsonFileStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    fn load_map(&self) -> Result<HashMap<String, String>, AppError> {
        if !self.path.exists() {
            return Ok(HashMap::new());
        }
        let raw = fs::read_to_string(&self.path)
            .context(format!("reading blob store {}", self.path.display()))?;
        if raw.trim().is_empty() {
            return Ok(HashMap::new());
        }
        let map = serde_json::from_str(&raw).map_err(|e| {
            AppError::StorageError(format!(
                "blob store {} is corrupt: {}",
                self.path.display(),
                e
            ))
        })?;
        Ok(map)
    }

    fn save_map(&self, map: &HashMap<String, String>) -> Result<(), AppError> {
        let raw = serde_json::to_string_pretty(map)?;
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .context(format!("creating blob store dir {}", parent.display()))?;
            }
        }
        fs::write(&self.path, raw)
            .context(format!("writing blob store {}", self.path.display()))?;
        Ok(())
    }

    fn locked(&self) -> std::sync::MutexGuard<'_, ()> {
        // A poisoned lock only means a previous holder panicked while doing
        // pure file IO; the map on disk is still the authority.
        match self.lock.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl BlobStore for JsonFileStore {
    fn get(&self, key: &str) -> Result<Option<String>, AppError> {
        let _guard = self.locked();
        Ok(self.load_map()?.get(key).cloned())
    }

    fn put(&self, key: &str, value: &str) -> Result<(), AppError> {
        let _guard = self.locked();
        let mut map = self.load_map()?;
        map.insert(key.to_string(), value.to_string());
        self.save_map(&map)
    }

    fn remove(&self, key: &str) -> Result<(), AppError> {
        let _guard = self.locked();
        let mut map = self.load_map()?;
        if map.remove(key).is_some() {
            self.save_map(&map)?;
        }
        Ok(())
    }
}

/// In-memory blob store for tests.
#[derive(Default)]
pub struct MemoryStore {
    map: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl BlobStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, AppError> {
        let map = self
            .map
            .lock()
            .map_err(|_| AppError::StorageError("memory store lock poisoned".to_string()))?;
        Ok(map.get(key).cloned())
    }

    fn put(&self, key: &str, value: &str) -> Result<(), AppError> {
        let mut map = self
            .map
            .lock()
            .map_err(|_| AppError::StorageError("memory store lock poisoned".to_string()))?;
        map.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), AppError> {
        let mut map = self
            .map
            .lock()
            .map_err(|_| AppError::StorageError("memory store lock poisoned".to_string()))?;
        map.remove(key);
        Ok(())
    }
}
