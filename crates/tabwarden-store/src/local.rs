//! Local key-value stores.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use tabwarden_core::{Error, Result};

use crate::bridge::StorageBridge;

/// Full contents of a flat key-value store.
pub type Snapshot = BTreeMap<String, Value>;

/// Flat key-value store local to this installation.
#[async_trait]
pub trait LocalStore: Send + Sync {
    /// Read every key.
    async fn get_all(&self) -> Result<Snapshot>;

    /// Read one key.
    async fn get(&self, key: &str) -> Result<Option<Value>>;

    /// Write the given keys, leaving others as they are.
    async fn set_many(&self, entries: Snapshot) -> Result<()>;

    /// Replace the whole store with `entries`. Readers observe either the
    /// old or the new contents, never a partially cleared store.
    async fn replace_all(&self, entries: Snapshot) -> Result<()>;

    /// Write one key.
    async fn set(&self, key: &str, value: Value) -> Result<()> {
        let mut entries = Snapshot::new();
        entries.insert(key.to_string(), value);
        self.set_many(entries).await
    }
}

/// In-memory store.
#[derive(Default)]
pub struct MemoryStore {
    entries: RwLock<Snapshot>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entries(entries: Snapshot) -> Self {
        Self {
            entries: RwLock::new(entries),
        }
    }
}

#[async_trait]
impl LocalStore for MemoryStore {
    async fn get_all(&self) -> Result<Snapshot> {
        Ok(self.entries.read().clone())
    }

    async fn get(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.entries.read().get(key).cloned())
    }

    async fn set_many(&self, entries: Snapshot) -> Result<()> {
        self.entries.write().extend(entries);
        Ok(())
    }

    async fn replace_all(&self, entries: Snapshot) -> Result<()> {
        *self.entries.write() = entries;
        Ok(())
    }
}

/// Store persisted as one JSON object on disk.
///
/// Reads come from an in-memory cache. Writes re-read the file under the
/// write lock, so keys written by another process survive, then rewrite it
/// through a temporary sibling and a rename.
pub struct JsonFileStore {
    path: PathBuf,
    entries: RwLock<Snapshot>,
    /// Set when a write found the file changed by someone else.
    external_change: AtomicBool,
}

impl JsonFileStore {
    /// Open the store at `path`, starting empty if the file does not exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let entries = read_entries(&path)?;

        info!(
            "JsonFileStore opened: {} keys, path={}",
            entries.len(),
            path.display()
        );

        Ok(Self {
            path,
            entries: RwLock::new(entries),
            external_change: AtomicBool::new(false),
        })
    }

    /// Reload the cache from disk. Returns true when another process changed
    /// the file since the last refresh.
    pub fn refresh(&self) -> Result<bool> {
        let on_disk = read_entries(&self.path)?;
        let changed = {
            let mut current = self.entries.write();
            let differs = *current != on_disk;
            if differs {
                *current = on_disk;
            }
            differs
        };
        let merged = self.external_change.swap(false, Ordering::SeqCst);
        if changed {
            debug!("Local store {} changed on disk", self.path.display());
        }
        Ok(changed || merged)
    }

    /// Refresh every `interval` and tell the bridge's restore subscribers
    /// when another process rewrote the file.
    pub fn spawn_poller(
        self: &Arc<Self>,
        bridge: Arc<StorageBridge>,
        interval: Duration,
    ) -> JoinHandle<()> {
        let store = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                match store.refresh() {
                    Ok(true) => {
                        info!("Local store changed by another process, reloading");
                        bridge.notify_external_change();
                    }
                    Ok(false) => {}
                    Err(e) => warn!("Failed to refresh local store: {}", e),
                }
            }
        })
    }

    fn persist(&self, entries: &Snapshot) -> Result<()> {
        let json = serde_json::to_string_pretty(entries)?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &self.path)?;
        debug!("Persisted {} keys to {}", entries.len(), self.path.display());
        Ok(())
    }
}

fn read_entries(path: &Path) -> Result<Snapshot> {
    match std::fs::read_to_string(path) {
        Ok(data) if !data.trim().is_empty() => serde_json::from_str::<Snapshot>(&data)
            .map_err(|e| Error::Storage(format!("{}: {}", path.display(), e))),
        Ok(_) => Ok(Snapshot::new()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Snapshot::new()),
        Err(e) => Err(e.into()),
    }
}

#[async_trait]
impl LocalStore for JsonFileStore {
    async fn get_all(&self) -> Result<Snapshot> {
        Ok(self.entries.read().clone())
    }

    async fn get(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.entries.read().get(key).cloned())
    }

    async fn set_many(&self, entries: Snapshot) -> Result<()> {
        let mut current = self.entries.write();
        let mut next = read_entries(&self.path)?;
        if next != *current {
            self.external_change.store(true, Ordering::SeqCst);
        }
        next.extend(entries);
        self.persist(&next)?;
        *current = next;
        Ok(())
    }

    async fn replace_all(&self, entries: Snapshot) -> Result<()> {
        let mut current = self.entries.write();
        self.persist(&entries)?;
        *current = entries;
        Ok(())
    }
}
