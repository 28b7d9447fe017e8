//! Single-slot persistence for the last successfully fetched forecast.

use std::{
    collections::HashMap,
    fmt::Debug,
    fs,
    path::{Path, PathBuf},
    sync::Mutex,
};

use tracing::{debug, warn};

use crate::{
    error::{Result, WeatherError},
    model::WeatherData,
};

/// Fixed key under which the aggregate is stored.
pub const CACHE_SLOT: &str = "weather_data";

/// Generic string key-value storage.
pub trait KeyValueStore: Send + Sync + Debug {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn put(&self, key: &str, value: &str) -> Result<()>;
}

/// Stores each key as `<dir>/<key>.json`.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let path = self.path_for(key);
        if !path.exists() {
            return Ok(None);
        }

        fs::read_to_string(&path)
            .map(Some)
            .map_err(|e| WeatherError::Cache(format!("read {}: {e}", path.display())))
    }

    fn put(&self, key: &str, value: &str) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .map_err(|e| WeatherError::Cache(format!("create {}: {e}", self.dir.display())))?;

        let path = self.path_for(key);
        let tmp = path.with_extension("json.tmp");

        // Rename is atomic on the same filesystem; readers see old or new, never half.
        fs::write(&tmp, value)
            .map_err(|e| WeatherError::Cache(format!("write {}: {e}", tmp.display())))?;
        fs::rename(&tmp, &path)
            .map_err(|e| WeatherError::Cache(format!("replace {}: {e}", path.display())))?;

        Ok(())
    }
}

/// In-process store; contents vanish with the process.
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
        let entries = self
            .entries
            .lock()
            .map_err(|_| WeatherError::Cache("memory store poisoned".into()))?;
        Ok(entries.get(key).cloned())
    }

    fn put(&self, key: &str, value: &str) -> Result<()> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| WeatherError::Cache("memory store poisoned".into()))?;
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// Last-known-good forecast, one slot, no history.
#[derive(Debug)]
pub struct LocalCache<S = Box<dyn KeyValueStore>> {
    store: S,
    // Serializes overlapping save/load from concurrent fetches.
    lock: Mutex<()>,
}

impl<S: KeyValueStore> LocalCache<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            lock: Mutex::new(()),
        }
    }

    /// Overwrite the slot. Failures are returned, never swallowed.
    pub fn save(&self, data: &WeatherData) -> Result<()> {
        let json = serde_json::to_string(data)
            .map_err(|e| WeatherError::Cache(format!("serialize: {e}")))?;

        let _guard = self
            .lock
            .lock()
            .map_err(|_| WeatherError::Cache("cache lock poisoned".into()))?;
        self.store.put(CACHE_SLOT, &json)?;

        debug!(days = data.weekly_forecast().len(), "forecast cached");
        Ok(())
    }

    /// Most recently saved aggregate. Unreadable or corrupt slots read as empty.
    pub fn load(&self) -> Option<WeatherData> {
        let raw = {
            let _guard = self.lock.lock().ok()?;
            match self.store.get(CACHE_SLOT) {
                Ok(raw) => raw?,
                Err(e) => {
                    warn!(error = %e, "cache read failed, treating as empty");
                    return None;
                }
            }
        };

        match serde_json::from_str(&raw) {
            Ok(data) => Some(data),
            Err(e) => {
                warn!(error = %e, "cached forecast is corrupt, treating as empty");
                None
            }
        }
    }
}

impl LocalCache {
    /// Type-erased cache, the form the pipeline holds.
    pub fn boxed(store: impl KeyValueStore + 'static) -> Self {
        Self::new(Box::new(store))
    }
}

impl KeyValueStore for Box<dyn KeyValueStore> {
    fn get(&self, key: &str) -> Result<Option<String>> {
        (**self).get(key)
    }

    fn put(&self, key: &str, value: &str) -> Result<()> {
        (**self).put(key, value)
    }
}
