use crate::api::Error;
use chrono::{Local, NaiveDate};
use serde_json::Value;
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::task::JoinHandle;

const STORAGE_SYSTEMS_FILE_NAME: &str = "alphacloud_storagesystems.json";

/// Today's date in local time.
pub fn today() -> NaiveDate {
    Local::now().date_naive()
}

/// Raw `data` payloads keyed by the date they were queried for.
#[derive(Debug, Clone, Default)]
pub struct DateCache {
    entries: HashMap<NaiveDate, Value>,
}

impl DateCache {
    pub fn get(&self, date: &NaiveDate) -> Option<&Value> {
        self.entries.get(date)
    }

    /// Stores `data` for `date` unless `date` is today, whose data still changes.
    pub fn insert(&mut self, date: NaiveDate, data: Value) -> bool {
        if date == today() {
            return false;
        }
        self.entries.insert(date, data);
        true
    }

    pub fn remove(&mut self, date: &NaiveDate) {
        self.entries.remove(date);
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Single JSON array persisted to a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiskCache {
    path: PathBuf,
}

impl DiskCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        DiskCache { path: path.into() }
    }

    /// `<cache dir>/alphacloud_storagesystems.json`, if the platform has a cache directory.
    pub fn storage_systems() -> Option<Self> {
        dirs_next::cache_dir().map(|dir| DiskCache::new(dir.join(STORAGE_SYSTEMS_FILE_NAME)))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the cached array. Failures are logged and reported as `None`.
    pub async fn load(&self) -> Option<Vec<Value>> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                log::debug!("No cache file at {}", self.path.display());
                return None;
            }
            Err(e) => {
                log::debug!("Failed to open cache file {}: {}", self.path.display(), e);
                return None;
            }
        };

        match serde_json::from_slice::<Value>(&bytes) {
            Ok(Value::Array(array)) => Some(array),
            Ok(_) => {
                log::warn!("Cache file {} does not contain an array", self.path.display());
                None
            }
            Err(e) => {
                log::warn!("Failed to parse cache file {}: {}", self.path.display(), e);
                None
            }
        }
    }

    /// Writes `data` in compact form, creating the parent directory if needed.
    pub async fn write(&self, data: &Value) -> Result<(), Error> {
        let bytes = serde_json::to_vec(data).map_err(|e| Error::Cache(e.to_string()))?;
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| Error::Cache(format!("{}: {}", parent.display(), e)))?;
        }
        tokio::fs::write(&self.path, bytes)
            .await
            .map_err(|e| Error::Cache(format!("{}: {}", self.path.display(), e)))
    }

    /// Writes `data` in the background, failures are only logged.
    pub fn store(&self, data: Value) -> Option<JoinHandle<()>> {
        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(runtime) => runtime,
            Err(e) => {
                log::warn!("Cannot write cache outside of a tokio runtime: {}", e);
                return None;
            }
        };

        let cache = self.clone();
        Some(runtime.spawn(async move {
            if let Err(e) = cache.write(&data).await {
                log::warn!("Failed to write cache: {}", e);
            }
        }))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use serde_json::json;

    #[test]
    fn date_cache_skips_today() {
        let mut cache = DateCache::default();
        assert!(!cache.insert(today(), json!({"epv": 1.0})));
        assert!(cache.is_empty());

        let date = NaiveDate::from_ymd_opt(2023, 1, 1).unwrap();
        assert!(cache.insert(date, json!({"epv": 1.0})));
        assert_eq!(Some(&json!({"epv": 1.0})), cache.get(&date));

        cache.remove(&date);
        assert!(cache.get(&date).is_none());
    }

    #[tokio::test]
    async fn disk_cache_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DiskCache::new(dir.path().join("nested").join("cache.json"));
        assert!(cache.load().await.is_none());

        let data = json!([{"sysSn": "SERIAL"}]);
        cache.store(data.clone()).unwrap().await.unwrap();

        assert_eq!(
            r#"[{"sysSn":"SERIAL"}]"#,
            std::fs::read_to_string(cache.path()).unwrap()
        );
        assert_eq!(Some(vec![json!({"sysSn": "SERIAL"})]), cache.load().await);
    }

    #[tokio::test]
    async fn disk_cache_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DiskCache::new(dir.path().join("cache.json"));

        std::fs::write(cache.path(), "[{").unwrap();
        assert!(cache.load().await.is_none());

        std::fs::write(cache.path(), "{}").unwrap();
        assert!(cache.load().await.is_none());
    }
}
