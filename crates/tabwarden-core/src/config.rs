//! Configuration and data directory management.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::info;

/// Paths to all Tabwarden data files.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataPaths {
    /// Root data directory (e.g., `data/`).
    pub root: PathBuf,
    /// Local key-value store (`data/local.json`).
    pub local_store: PathBuf,
    /// Installation identity (`data/installation-id`).
    pub installation_id: PathBuf,
    /// Directory of the file-backed remote mirror (`data/sync/`).
    pub sync_dir: PathBuf,
    /// Settings exports (`data/exports/`).
    pub exports: PathBuf,
}

impl DataPaths {
    /// Create data paths from a root directory. Creates directories if needed.
    pub fn new(root: impl AsRef<Path>) -> std::io::Result<Self> {
        let root = root.as_ref().to_path_buf();
        let paths = Self {
            local_store: root.join("local.json"),
            installation_id: root.join("installation-id"),
            sync_dir: root.join("sync"),
            exports: root.join("exports"),
            root,
        };
        paths.ensure_dirs()?;
        Ok(paths)
    }

    /// Remote mirror file inside the sync directory.
    pub fn remote_store(&self) -> PathBuf {
        self.sync_dir.join("remote.json")
    }

    fn ensure_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.root)?;
        std::fs::create_dir_all(&self.sync_dir)?;
        std::fs::create_dir_all(&self.exports)?;
        Ok(())
    }
}

/// Top-level service configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// HTTP relay port.
    pub port: u16,
    /// Data directory paths.
    pub data_paths: DataPaths,
    /// Stable identity of this installation.
    pub installation_id: String,
    /// Maximum serialized size of one remote item, in bytes.
    pub remote_item_quota: usize,
    /// How often the file-backed remote is re-read for foreign writes.
    pub remote_poll_secs: u64,
}

/// Per-item quota of the browser's sync area.
pub const DEFAULT_REMOTE_ITEM_QUOTA: usize = 8192;

impl ServiceConfig {
    /// Create configuration from environment and defaults.
    pub fn from_env(data_dir: impl AsRef<Path>) -> std::io::Result<Self> {
        let port = std::env::var("TABWARDEN_PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(3117);

        let remote_item_quota = std::env::var("TABWARDEN_REMOTE_ITEM_QUOTA")
            .ok()
            .and_then(|q| q.parse().ok())
            .unwrap_or(DEFAULT_REMOTE_ITEM_QUOTA);

        let remote_poll_secs = std::env::var("TABWARDEN_REMOTE_POLL_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .filter(|s| *s > 0)
            .unwrap_or(5);

        let mut data_paths = DataPaths::new(data_dir)?;
        if let Ok(sync_dir) = std::env::var("TABWARDEN_SYNC_DIR") {
            data_paths.sync_dir = PathBuf::from(sync_dir);
            std::fs::create_dir_all(&data_paths.sync_dir)?;
        }

        let installation_id = load_or_create_installation_id(&data_paths.installation_id)?;

        Ok(Self {
            port,
            data_paths,
            installation_id,
            remote_item_quota,
            remote_poll_secs,
        })
    }

    /// Key under which this installation's blob lives in the remote mirror.
    pub fn remote_key(&self) -> String {
        remote_key_for(&self.installation_id)
    }
}

/// Derive the remote mirror key from an installation identity.
pub fn remote_key_for(installation_id: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(installation_id.as_bytes());
    let result = hasher.finalize();
    format!("pdt:{}", hex::encode(&result[..16]))
}

fn load_or_create_installation_id(path: &Path) -> std::io::Result<String> {
    if let Ok(existing) = std::fs::read_to_string(path) {
        let existing = existing.trim();
        if !existing.is_empty() {
            return Ok(existing.to_string());
        }
    }
    let id = uuid::Uuid::new_v4().to_string();
    std::fs::write(path, &id)?;
    info!("Generated installation id {}", id);
    Ok(id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_paths_layout() {
        let dir = tempfile::tempdir().unwrap();
        let paths = DataPaths::new(dir.path().join("data")).unwrap();
        assert!(paths.sync_dir.is_dir());
        assert!(paths.exports.is_dir());
        assert!(paths.local_store.ends_with("local.json"));
        assert!(paths.remote_store().ends_with("sync/remote.json"));
    }

    #[test]
    fn test_installation_id_is_stable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("installation-id");
        let first = load_or_create_installation_id(&path).unwrap();
        let second = load_or_create_installation_id(&path).unwrap();
        assert_eq!(first, second);
        assert!(uuid::Uuid::parse_str(&first).is_ok());
    }

    #[test]
    fn test_remote_key_derivation() {
        let a = remote_key_for("install-a");
        assert_eq!(a, remote_key_for("install-a"));
        assert_ne!(a, remote_key_for("install-b"));
        assert!(a.starts_with("pdt:"));
        assert_eq!(a.len(), "pdt:".len() + 32);
    }
}
