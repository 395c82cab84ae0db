//! Settings export and import.

use serde_json::Value;
use tracing::info;

use tabwarden_core::{Error, Result};

use crate::bridge::{RestoreSource, StorageBridge};
use crate::local::Snapshot;

/// Suggested download name for an export.
pub const EXPORT_FILE_NAME: &str = "duplicate-tab-settings.json";

/// The full local snapshot as pretty-printed JSON.
pub async fn export_json(bridge: &StorageBridge) -> Result<String> {
    let snapshot = bridge.snapshot().await?;
    Ok(serde_json::to_string_pretty(&snapshot)?)
}

/// Replace the local store with the JSON object in `text`.
///
/// Anything that is not a JSON object is rejected before the store is
/// touched. Returns the number of keys written.
pub async fn import_json(bridge: &StorageBridge, text: &str) -> Result<usize> {
    let parsed: Value =
        serde_json::from_str(text).map_err(|e| Error::MalformedImport(e.to_string()))?;
    let Value::Object(map) = parsed else {
        return Err(Error::MalformedImport("expected a JSON object".into()));
    };

    let snapshot: Snapshot = map.into_iter().collect();
    let count = snapshot.len();
    bridge.restore(snapshot).await?;
    bridge.notify_restore(RestoreSource::Import);
    info!("Imported {} keys, local store replaced", count);
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::local::MemoryStore;
    use serde_json::json;
    use std::sync::Arc;

    fn bridge() -> StorageBridge {
        let mut entries = Snapshot::new();
        entries.insert("old".into(), json!(true));
        entries.insert("hosts".into(), json!(["example.com"]));
        StorageBridge::local_only(Arc::new(MemoryStore::with_entries(entries)))
    }

    #[tokio::test]
    async fn test_export_then_import_preserves_store() {
        let bridge = bridge();
        let before = bridge.snapshot().await.unwrap();
        let exported = export_json(&bridge).await.unwrap();

        assert_eq!(import_json(&bridge, &exported).await.unwrap(), 2);
        assert_eq!(bridge.snapshot().await.unwrap(), before);
    }

    #[tokio::test]
    async fn test_import_replaces_everything() {
        let bridge = bridge();
        let mut restores = bridge.subscribe_restores();
        import_json(&bridge, r#"{"hash": true}"#).await.unwrap();

        let after = bridge.snapshot().await.unwrap();
        assert_eq!(after.len(), 1);
        assert_eq!(after.get("hash"), Some(&json!(true)));
        assert_eq!(restores.try_recv().unwrap().source, RestoreSource::Import);
    }

    #[tokio::test]
    async fn test_malformed_import_leaves_store_untouched() {
        let bridge = bridge();
        let before = bridge.snapshot().await.unwrap();

        for bad in ["{not json", "[1, 2]", "\"text\"", ""] {
            let err = import_json(&bridge, bad).await.unwrap_err();
            assert!(matches!(err, Error::MalformedImport(_)), "{bad}: {err}");
        }
        assert_eq!(bridge.snapshot().await.unwrap(), before);
    }
}
