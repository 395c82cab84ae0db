//! Remote mirror stores with change notifications.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use tabwarden_core::{Error, Result};

/// A key changed in the remote mirror.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteChange {
    pub key: String,
    /// New value, `None` when the key was removed.
    pub new_value: Option<Value>,
}

/// Network-backed key-value store shared across devices.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Value>>;

    /// Write one key. Fails with [`Error::QuotaExceeded`] when the item is
    /// larger than the store accepts.
    async fn set(&self, key: &str, value: Value) -> Result<()>;

    /// Subscribe to changes of any key.
    fn subscribe(&self) -> broadcast::Receiver<RemoteChange>;
}

const CHANGE_CHANNEL_CAPACITY: usize = 64;

/// Serialized size of an item as the quota sees it: key plus JSON value.
fn item_size(key: &str, value: &Value) -> Result<usize> {
    Ok(key.len() + serde_json::to_string(value)?.len())
}

fn check_quota(key: &str, value: &Value, limit: Option<usize>) -> Result<()> {
    if let Some(limit) = limit {
        let size = item_size(key, value)?;
        if size > limit {
            return Err(Error::QuotaExceeded { size, limit });
        }
    }
    Ok(())
}

/// In-memory remote with an optional per-item quota.
pub struct MemoryRemote {
    items: RwLock<BTreeMap<String, Value>>,
    item_quota: Option<usize>,
    changes: broadcast::Sender<RemoteChange>,
}

impl MemoryRemote {
    pub fn new() -> Self {
        Self::with_quota(None)
    }

    pub fn with_quota(item_quota: Option<usize>) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            items: RwLock::new(BTreeMap::new()),
            item_quota,
            changes,
        }
    }

    /// Simulate a write made by another device.
    pub fn apply_foreign_write(&self, key: &str, value: Value) {
        self.items.write().insert(key.to_string(), value.clone());
        let _ = self.changes.send(RemoteChange {
            key: key.to_string(),
            new_value: Some(value),
        });
    }
}

impl Default for MemoryRemote {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RemoteStore for MemoryRemote {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.items.read().get(key).cloned())
    }

    async fn set(&self, key: &str, value: Value) -> Result<()> {
        check_quota(key, &value, self.item_quota)?;
        self.items.write().insert(key.to_string(), value.clone());
        let _ = self.changes.send(RemoteChange {
            key: key.to_string(),
            new_value: Some(value),
        });
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<RemoteChange> {
        self.changes.subscribe()
    }
}

/// Remote mirror kept as a JSON file in a synced directory.
///
/// Writes from this process notify immediately. Writes from other devices
/// are picked up by [`JsonFileRemote::refresh`], which the poller calls on
/// an interval.
pub struct JsonFileRemote {
    path: PathBuf,
    items: RwLock<BTreeMap<String, Value>>,
    item_quota: Option<usize>,
    changes: broadcast::Sender<RemoteChange>,
}

impl JsonFileRemote {
    pub fn open(path: impl AsRef<Path>, item_quota: Option<usize>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let items = read_items(&path)?;
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);

        info!(
            "JsonFileRemote opened: {} keys, path={}",
            items.len(),
            path.display()
        );

        Ok(Self {
            path,
            items: RwLock::new(items),
            item_quota,
            changes,
        })
    }

    /// Re-read the file and notify for every key whose value changed.
    /// Returns the number of changed keys.
    pub fn refresh(&self) -> Result<usize> {
        let on_disk = read_items(&self.path)?;
        let mut items = self.items.write();

        let mut changed = Vec::new();
        for (key, value) in &on_disk {
            if items.get(key) != Some(value) {
                changed.push(RemoteChange {
                    key: key.clone(),
                    new_value: Some(value.clone()),
                });
            }
        }
        for key in items.keys() {
            if !on_disk.contains_key(key) {
                changed.push(RemoteChange {
                    key: key.clone(),
                    new_value: None,
                });
            }
        }
        *items = on_disk;
        drop(items);

        let count = changed.len();
        for change in changed {
            let _ = self.changes.send(change);
        }
        if count > 0 {
            debug!("Remote file {} changed: {} keys", self.path.display(), count);
        }
        Ok(count)
    }

    /// Poll the file for foreign writes every `interval`.
    pub fn spawn_poller(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let remote = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                if let Err(e) = remote.refresh() {
                    warn!("Failed to refresh remote mirror: {}", e);
                }
            }
        })
    }

    fn persist(&self, items: &BTreeMap<String, Value>) -> Result<()> {
        let json = serde_json::to_string_pretty(items)?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json).map_err(|e| Error::Remote(e.to_string()))?;
        std::fs::rename(&tmp, &self.path).map_err(|e| Error::Remote(e.to_string()))?;
        Ok(())
    }
}

fn read_items(path: &Path) -> Result<BTreeMap<String, Value>> {
    match std::fs::read_to_string(path) {
        Ok(data) if data.trim().is_empty() => Ok(BTreeMap::new()),
        Ok(data) => serde_json::from_str(&data)
            .map_err(|e| Error::Remote(format!("{}: {}", path.display(), e))),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
        Err(e) => Err(Error::Remote(e.to_string())),
    }
}

#[async_trait]
impl RemoteStore for JsonFileRemote {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.items.read().get(key).cloned())
    }

    async fn set(&self, key: &str, value: Value) -> Result<()> {
        check_quota(key, &value, self.item_quota)?;
        {
            let mut items = self.items.write();
            let mut next = items.clone();
            next.insert(key.to_string(), value.clone());
            self.persist(&next)?;
            *items = next;
        }
        let _ = self.changes.send(RemoteChange {
            key: key.to_string(),
            new_value: Some(value),
        });
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<RemoteChange> {
        self.changes.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_memory_remote_quota() {
        let remote = MemoryRemote::with_quota(Some(32));
        remote.set("k", json!({"a": 1})).await.unwrap();

        let big = json!({ "urls": ["https://a-very-long-url.example.com/path/to/page"] });
        let err = remote.set("k", big).await.unwrap_err();
        assert!(matches!(err, Error::QuotaExceeded { limit: 32, .. }));
        // Rejected write leaves the previous value
        assert_eq!(remote.get("k").await.unwrap(), Some(json!({"a": 1})));
    }

    #[tokio::test]
    async fn test_memory_remote_notifies() {
        let remote = MemoryRemote::new();
        let mut rx = remote.subscribe();
        remote.set("k", json!({"mtime": 5})).await.unwrap();

        let change = rx.recv().await.unwrap();
        assert_eq!(change.key, "k");
        assert_eq!(change.new_value, Some(json!({"mtime": 5})));
    }

    #[tokio::test]
    async fn test_file_remote_refresh_detects_foreign_write() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("remote.json");
        let remote = JsonFileRemote::open(&path, None).unwrap();
        remote.set("k", json!({"mtime": 1})).await.unwrap();

        let mut rx = remote.subscribe();
        // Nothing changed on disk yet
        assert_eq!(remote.refresh().unwrap(), 0);

        std::fs::write(&path, r#"{"k": {"mtime": 2}}"#).unwrap();
        assert_eq!(remote.refresh().unwrap(), 1);

        let change = rx.recv().await.unwrap();
        assert_eq!(change.new_value, Some(json!({"mtime": 2})));
        assert_eq!(remote.get("k").await.unwrap(), Some(json!({"mtime": 2})));
    }

    #[tokio::test]
    async fn test_file_remote_poller_reports_foreign_write() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("remote.json");
        let remote = Arc::new(JsonFileRemote::open(&path, None).unwrap());
        let mut rx = remote.subscribe();
        let poller = remote.spawn_poller(Duration::from_millis(10));

        std::fs::write(&path, r#"{"pdt:other": {"mtime": 7}}"#).unwrap();
        let change = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            change,
            RemoteChange {
                key: "pdt:other".to_string(),
                new_value: Some(json!({"mtime": 7})),
            }
        );
        poller.abort();
    }

    #[tokio::test]
    async fn test_file_remote_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("remote.json");
        {
            let remote = JsonFileRemote::open(&path, Some(8192)).unwrap();
            remote.set("k", json!({"version": 1})).await.unwrap();
        }
        let reopened = JsonFileRemote::open(&path, Some(8192)).unwrap();
        assert_eq!(reopened.get("k").await.unwrap(), Some(json!({"version": 1})));
    }
}
