use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fs2::FileExt;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::error::{Error, Result};

const MAX_BACKUP_GENERATIONS: usize = 3;

/// Namespaced key-value persistence (whole-value reads and writes)
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Value>>;
    async fn set(&self, key: &str, value: Value) -> Result<()>;
}

/// In-process store, used by tests and the replay driver
#[derive(Debug, Default)]
pub struct MemoryStore {
    data: Mutex<HashMap<String, Value>>,
    fail_writes: AtomicBool,
    writes: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every following `set` fail until switched back
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Number of successful writes so far
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn snapshot(&self, key: &str) -> Option<Value> {
        self.data.lock().get(key).cloned()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.data.lock().get(key).cloned())
    }

    async fn set(&self, key: &str, value: Value) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(Error::storage(format!("write to '{key}' rejected")));
        }
        self.data.lock().insert(key.to_string(), value);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// On-disk document format
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoreDocument {
    #[serde(default)]
    values: BTreeMap<String, Value>,
    updated_at: DateTime<Utc>,
}

impl Default for StoreDocument {
    fn default() -> Self {
        Self {
            values: BTreeMap::new(),
            updated_at: Utc::now(),
        }
    }
}

/// JSON document on disk with atomic writes and rolling backups
pub struct FileStore {
    path: PathBuf,
    lock: tokio::sync::Mutex<()>,
}

impl FileStore {
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }
        Ok(Self {
            path,
            lock: tokio::sync::Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_document(&self) -> Result<StoreDocument> {
        if !self.path.exists() {
            return Ok(StoreDocument::default());
        }
        let content = fs::read_to_string(&self.path).await?;
        if content.trim().is_empty() {
            return Ok(StoreDocument::default());
        }
        Ok(serde_json::from_str(&content)?)
    }

    async fn write_document(&self, doc: &StoreDocument) -> Result<()> {
        // Another process holding the lock means another authority is live.
        let lock_file = std::fs::OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(self.path.with_extension("lock"))?;
        lock_file
            .try_lock_exclusive()
            .map_err(|e| Error::storage(format!("store is locked: {e}")))?;

        self.create_backup().await?;

        let json = serde_json::to_string_pretty(doc)?;

        // Atomic write: write to temp file, then rename
        let temp_path = self.path.with_extension("tmp");
        let mut file = fs::File::create(&temp_path).await?;
        file.write_all(json.as_bytes()).await?;
        file.sync_all().await?;
        drop(file);

        fs::rename(&temp_path, &self.path).await?;

        let _ = FileExt::unlock(&lock_file);
        Ok(())
    }

    /// Roll backups: .bak.2 -> .bak.3, .bak.1 -> .bak.2, .bak -> .bak.1
    async fn create_backup(&self) -> Result<()> {
        if !self.path.exists() {
            return Ok(());
        }

        for i in (1..MAX_BACKUP_GENERATIONS).rev() {
            let from = if i == 1 {
                self.path.with_extension("bak")
            } else {
                self.path.with_extension(format!("bak.{}", i))
            };
            let to = self.path.with_extension(format!("bak.{}", i + 1));

            if from.exists() {
                if to.exists() {
                    let _ = fs::remove_file(&to).await;
                }
                fs::rename(&from, &to).await?;
            }
        }

        let bak = self.path.with_extension("bak");
        if bak.exists() {
            let _ = fs::remove_file(&bak).await;
        }
        fs::copy(&self.path, &bak).await?;

        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for FileStore {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        let _lock = self.lock.lock().await;
        let doc = self.read_document().await?;
        Ok(doc.values.get(key).cloned())
    }

    async fn set(&self, key: &str, value: Value) -> Result<()> {
        let _lock = self.lock.lock().await;
        let mut doc = self.read_document().await?;
        doc.values.insert(key.to_string(), value);
        doc.updated_at = Utc::now();
        self.write_document(&doc).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_file_store_round_trip() {
        let dir = tempdir().unwrap();
        let store = FileStore::open(dir.path().join("store.json")).await.unwrap();

        assert!(store.get("groupTabs").await.unwrap().is_none());
        store.set("groupTabs", json!({ "1": { "id": 1 } })).await.unwrap();
        store.set("settings", json!({ "showNotifications": false })).await.unwrap();

        let reopened = FileStore::open(dir.path().join("store.json")).await.unwrap();
        assert_eq!(
            reopened.get("groupTabs").await.unwrap(),
            Some(json!({ "1": { "id": 1 } }))
        );
        assert_eq!(
            reopened.get("settings").await.unwrap(),
            Some(json!({ "showNotifications": false }))
        );
    }

    #[tokio::test]
    async fn test_file_store_keeps_backups() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.json");
        let store = FileStore::open(&path).await.unwrap();

        for n in 0..3 {
            store.set("settings", json!({ "n": n })).await.unwrap();
        }
        assert!(path.with_extension("bak").exists());
        assert!(path.with_extension("bak.2").exists());
        assert!(!path.with_extension("tmp").exists());
    }

    #[tokio::test]
    async fn test_memory_store_failure_injection() {
        let store = MemoryStore::new();
        store.set("a", json!(1)).await.unwrap();
        store.set_fail_writes(true);
        assert!(store.set("a", json!(2)).await.is_err());
        assert_eq!(store.snapshot("a"), Some(json!(1)));
        assert_eq!(store.write_count(), 1);
    }
}
