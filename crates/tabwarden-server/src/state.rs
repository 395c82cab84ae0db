//! Shared application state.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::info;

use tabwarden_core::ServiceConfig;
use tabwarden_engine::Engine;
use tabwarden_store::{JsonFileRemote, JsonFileStore, RemoteStore, StorageBridge};

use crate::relay::RelayHost;

/// The on-disk stores of one installation.
pub struct Storage {
    pub bridge: Arc<StorageBridge>,
    pub local: Arc<JsonFileStore>,
    pub remote: Arc<JsonFileRemote>,
}

impl Storage {
    /// Open the local store and the file-backed remote mirror.
    pub fn open(config: &ServiceConfig) -> anyhow::Result<Self> {
        let paths = &config.data_paths;
        let local = JsonFileStore::open(&paths.local_store)
            .map_err(|e| anyhow::anyhow!("Failed to open local store: {}", e))?;
        let remote = JsonFileRemote::open(paths.remote_store(), Some(config.remote_item_quota))
            .map_err(|e| anyhow::anyhow!("Failed to open remote mirror: {}", e))?;
        let local = Arc::new(local);
        let remote = Arc::new(remote);

        let bridge = StorageBridge::new(
            local.clone(),
            Some(remote.clone() as Arc<dyn RemoteStore>),
            config.remote_key(),
        );
        info!("Storage opened, remote key {}", bridge.remote_key());

        Ok(Self {
            bridge: Arc::new(bridge),
            local,
            remote,
        })
    }

    /// Watch the remote file for writes from other devices.
    pub fn spawn_remote_poller(&self, config: &ServiceConfig) -> JoinHandle<()> {
        self.remote
            .spawn_poller(Duration::from_secs(config.remote_poll_secs))
    }

    /// Watch the local store for writes from CLI commands run alongside
    /// the server.
    pub fn spawn_local_poller(&self, config: &ServiceConfig) -> JoinHandle<()> {
        self.local.spawn_poller(
            self.bridge.clone(),
            Duration::from_secs(config.remote_poll_secs),
        )
    }
}

/// Shared application state accessible from all route handlers.
pub struct AppState {
    pub bridge: Arc<StorageBridge>,
    pub relay: Arc<RelayHost>,
    pub engine: Arc<Engine>,
}

impl AppState {
    pub fn new(bridge: Arc<StorageBridge>, relay: Arc<RelayHost>) -> Self {
        let engine = Arc::new(Engine::new(bridge.clone(), relay.clone()));
        Self {
            bridge,
            relay,
            engine,
        }
    }
}
