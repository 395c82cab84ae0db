//! Storage bridge — local store access and last-writer-wins remote sync.

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use tabwarden_core::keys;
use tabwarden_core::{Error, Result};

use crate::local::{LocalStore, Snapshot};
use crate::remote::RemoteStore;

/// Result of [`StorageBridge::push`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    /// The remote mirror accepted the blob.
    Synced { version: i64, mtime: i64 },
    /// The remote rejected the write (or none is configured); the stamp was
    /// persisted locally only.
    LocalOnly { version: i64, mtime: i64 },
}

impl PushOutcome {
    pub fn is_synced(&self) -> bool {
        matches!(self, PushOutcome::Synced { .. })
    }
}

/// Result of [`StorageBridge::pull`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PullOutcome {
    NoRemoteData,
    AlreadyCurrent,
    Updated,
}

/// What caused the local store to be replaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestoreSource {
    Pull,
    Mirror,
    Import,
    /// Another process rewrote the local store.
    External,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RestoreEvent {
    pub source: RestoreSource,
}

/// `mtime` of a blob; absent or non-numeric counts as 0.
fn mtime_of(blob: &Snapshot) -> i64 {
    blob.get(keys::MTIME).and_then(Value::as_i64).unwrap_or(0)
}

fn version_of(blob: &Snapshot) -> i64 {
    blob.get(keys::VERSION).and_then(Value::as_i64).unwrap_or(0)
}

/// The single freshness rule shared by manual pulls and the live mirror.
pub fn is_newer(remote: &Snapshot, local: &Snapshot) -> bool {
    mtime_of(remote) > mtime_of(local)
}

/// A remote value usable as a restore source: a non-empty object.
fn as_blob(value: Value) -> Option<Snapshot> {
    match value {
        Value::Object(map) if !map.is_empty() => Some(map.into_iter().collect()),
        _ => None,
    }
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Handle to the background mirror task.
pub struct MirrorHandle {
    task: JoinHandle<()>,
}

impl MirrorHandle {
    pub fn stop(&self) {
        self.task.abort();
    }
}

impl Drop for MirrorHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Local store plus an optional remote mirror under a fixed key.
pub struct StorageBridge {
    local: Arc<dyn LocalStore>,
    remote: Option<Arc<dyn RemoteStore>>,
    remote_key: String,
    restores: broadcast::Sender<RestoreEvent>,
}

impl StorageBridge {
    pub fn new(
        local: Arc<dyn LocalStore>,
        remote: Option<Arc<dyn RemoteStore>>,
        remote_key: impl Into<String>,
    ) -> Self {
        let (restores, _) = broadcast::channel(16);
        Self {
            local,
            remote,
            remote_key: remote_key.into(),
            restores,
        }
    }

    /// Bridge with no remote mirror.
    pub fn local_only(local: Arc<dyn LocalStore>) -> Self {
        Self::new(local, None, String::new())
    }

    pub fn remote_key(&self) -> &str {
        &self.remote_key
    }

    pub fn has_remote(&self) -> bool {
        self.remote.is_some()
    }

    /// Notified after every restore, whatever its source.
    pub fn subscribe_restores(&self) -> broadcast::Receiver<RestoreEvent> {
        self.restores.subscribe()
    }

    // ---------------------------------------------------------------
    // Local access
    // ---------------------------------------------------------------

    /// The entire local store.
    pub async fn snapshot(&self) -> Result<Snapshot> {
        self.local.get_all().await
    }

    /// Replace the local store with exactly `obj`.
    pub async fn restore(&self, obj: Snapshot) -> Result<()> {
        self.local.replace_all(obj).await
    }

    pub async fn get(&self, key: &str) -> Result<Option<Value>> {
        self.local.get(key).await
    }

    pub async fn set(&self, key: &str, value: Value) -> Result<()> {
        self.local.set(key, value).await
    }

    pub async fn set_many(&self, entries: Snapshot) -> Result<()> {
        self.local.set_many(entries).await
    }

    pub(crate) fn notify_restore(&self, source: RestoreSource) {
        let _ = self.restores.send(RestoreEvent { source });
    }

    /// Tell restore subscribers the local store changed underneath them.
    pub fn notify_external_change(&self) {
        self.notify_restore(RestoreSource::External);
    }

    // ---------------------------------------------------------------
    // Remote sync
    // ---------------------------------------------------------------

    /// Stamp the local snapshot and write it to the remote mirror.
    ///
    /// A rejected remote write degrades to persisting the stamp locally;
    /// only a failing local write is an error.
    pub async fn push(&self) -> Result<PushOutcome> {
        let local = self.local.get_all().await?;
        let version = version_of(&local) + 1;
        let mtime = now_millis().max(mtime_of(&local) + 1);

        let mut stamp = Snapshot::new();
        stamp.insert(keys::VERSION.to_string(), Value::from(version));
        stamp.insert(keys::MTIME.to_string(), Value::from(mtime));

        let mut blob = local;
        blob.extend(stamp.clone());

        let remote_result = match &self.remote {
            Some(remote) => {
                let payload = Value::Object(blob.into_iter().collect());
                remote.set(&self.remote_key, payload).await
            }
            None => Err(Error::Remote("no remote mirror configured".into())),
        };

        match remote_result {
            Ok(()) => {
                self.local.set_many(stamp).await?;
                info!("Pushed version {} (mtime {}) to remote", version, mtime);
                Ok(PushOutcome::Synced { version, mtime })
            }
            Err(e) => {
                warn!("Remote write rejected, keeping change local: {}", e);
                self.local.set_many(stamp).await?;
                Ok(PushOutcome::LocalOnly { version, mtime })
            }
        }
    }

    async fn fetch_remote(&self) -> Result<Option<Snapshot>> {
        let Some(remote) = &self.remote else {
            return Ok(None);
        };
        Ok(remote.get(&self.remote_key).await?.and_then(as_blob))
    }

    /// Fetch the remote blob and restore local from it when it is newer, or
    /// unconditionally with `force`.
    pub async fn pull(&self, force: bool) -> Result<PullOutcome> {
        let Some(remote) = self.fetch_remote().await? else {
            return Ok(PullOutcome::NoRemoteData);
        };

        if !force {
            let local = self.local.get_all().await?;
            if !is_newer(&remote, &local) {
                debug!(
                    "Remote mtime {} not newer than local {}",
                    mtime_of(&remote),
                    mtime_of(&local)
                );
                return Ok(PullOutcome::AlreadyCurrent);
            }
        }

        info!("Restoring local store from remote (mtime {})", mtime_of(&remote));
        self.restore(remote).await?;
        self.notify_restore(RestoreSource::Pull);
        Ok(PullOutcome::Updated)
    }

    // ---------------------------------------------------------------
    // Sync switch
    // ---------------------------------------------------------------

    pub async fn sync_enabled(&self) -> Result<bool> {
        Ok(self
            .local
            .get(keys::SYNC_ENABLED)
            .await?
            .and_then(|v| v.as_bool())
            .unwrap_or(true))
    }

    pub async fn set_sync_enabled(&self, enabled: bool) -> Result<()> {
        self.local.set(keys::SYNC_ENABLED, Value::Bool(enabled)).await
    }

    /// Push, then force-pull so local equals what the mirror now holds.
    pub async fn sync_now(&self) -> Result<PushOutcome> {
        if !self.sync_enabled().await? {
            return Err(Error::SyncDisabled);
        }
        let outcome = self.push().await?;
        if outcome.is_synced() {
            self.pull(true).await?;
        }
        Ok(outcome)
    }

    // ---------------------------------------------------------------
    // Live mirror
    // ---------------------------------------------------------------

    /// Restore local from the remote once if the remote is newer.
    pub async fn reconcile_once(&self) -> Result<PullOutcome> {
        let Some(remote) = self.fetch_remote().await? else {
            return Ok(PullOutcome::NoRemoteData);
        };
        let local = self.local.get_all().await?;
        if !is_newer(&remote, &local) {
            return Ok(PullOutcome::AlreadyCurrent);
        }
        self.restore(remote).await?;
        self.notify_restore(RestoreSource::Mirror);
        info!("Local store restored from newer remote at startup");
        Ok(PullOutcome::Updated)
    }

    /// Reconcile once, then restore local every time the watched remote key
    /// changes to a non-empty value. Returns `None` without a remote.
    pub fn start_mirror(self: &Arc<Self>) -> Option<MirrorHandle> {
        let remote = self.remote.as_ref()?;
        let mut changes = remote.subscribe();
        let bridge = Arc::clone(self);

        let task = tokio::spawn(async move {
            if let Err(e) = bridge.reconcile_once().await {
                warn!("Initial remote reconcile failed: {}", e);
            }

            loop {
                let change = match changes.recv().await {
                    Ok(change) => change,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("Mirror lagged behind {} remote changes", skipped);
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                };
                if change.key != bridge.remote_key {
                    continue;
                }
                let Some(blob) = change.new_value.and_then(as_blob) else {
                    continue;
                };
                // Own push echoes and stale foreign blobs are not newer
                match bridge.local.get_all().await {
                    Ok(local) if is_newer(&blob, &local) => {}
                    Ok(local) => {
                        debug!(
                            "Ignoring remote change with mtime {} (local {})",
                            mtime_of(&blob),
                            mtime_of(&local)
                        );
                        continue;
                    }
                    Err(e) => {
                        warn!("Failed to read local store for mirror: {}", e);
                        continue;
                    }
                }
                match bridge.restore(blob).await {
                    Ok(()) => {
                        debug!("Mirrored remote change into local store");
                        bridge.notify_restore(RestoreSource::Mirror);
                    }
                    Err(e) => warn!("Failed to mirror remote change: {}", e),
                }
            }
        });

        Some(MirrorHandle { task })
    }
}
