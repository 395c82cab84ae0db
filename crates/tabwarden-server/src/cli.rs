//! One-shot subcommands that operate on the stores without serving.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::info;

use tabwarden_core::{Options, ServiceConfig, Tab, WindowId};
use tabwarden_engine::{plan_closures, IgnoreLists};
use tabwarden_store::{export_json, import_json, EXPORT_FILE_NAME};

use crate::routes::storage::{pull_name, push_json};
use crate::state::Storage;

/// Input of `scan`: a bare tab array or a relay snapshot body.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ScanInput {
    Tabs(Vec<Tab>),
    Snapshot {
        tabs: Vec<Tab>,
        #[serde(default, rename = "focusedWindowId")]
        focused_window_id: Option<WindowId>,
    },
}

pub async fn export(config: &ServiceConfig, target: Option<PathBuf>) -> anyhow::Result<()> {
    let storage = Storage::open(config)?;
    let target = target.unwrap_or_else(|| config.data_paths.exports.join(EXPORT_FILE_NAME));
    let text = export_json(&storage.bridge).await?;
    std::fs::write(&target, text)?;
    println!("Exported settings to {}", target.display());
    Ok(())
}

pub async fn import(config: &ServiceConfig, source: &Path) -> anyhow::Result<()> {
    let storage = Storage::open(config)?;
    let text = std::fs::read_to_string(source)?;
    let count = import_json(&storage.bridge, &text).await?;
    println!("Imported {} keys from {}", count, source.display());
    Ok(())
}

pub async fn push(config: &ServiceConfig) -> anyhow::Result<()> {
    let storage = Storage::open(config)?;
    let outcome = storage.bridge.push().await?;
    println!("{}", push_json(outcome));
    if !outcome.is_synced() {
        anyhow::bail!("remote mirror rejected the push; stamp kept locally");
    }
    Ok(())
}

pub async fn pull(config: &ServiceConfig, force: bool) -> anyhow::Result<()> {
    let storage = Storage::open(config)?;
    let outcome = storage.bridge.pull(force).await?;
    println!("Pull: {}", pull_name(outcome));
    Ok(())
}

pub async fn sync_now(config: &ServiceConfig) -> anyhow::Result<()> {
    let storage = Storage::open(config)?;
    let outcome = storage.bridge.sync_now().await?;
    println!("{}", push_json(outcome));
    if !outcome.is_synced() {
        anyhow::bail!("remote mirror rejected the push; stamp kept locally");
    }
    Ok(())
}

/// Print the ids a scan would close, without closing anything.
pub async fn scan(config: &ServiceConfig, tabs_file: &Path) -> anyhow::Result<()> {
    let storage = Storage::open(config)?;
    let stored = storage.bridge.snapshot().await?;
    let options = Options::from_store(&stored);
    let ignored = IgnoreLists::from_store(&stored);

    let input: ScanInput = serde_json::from_str(&std::fs::read_to_string(tabs_file)?)?;
    let tabs = match input {
        ScanInput::Tabs(tabs) => tabs,
        ScanInput::Snapshot {
            tabs,
            focused_window_id: Some(window),
        } if options.windows => tabs.into_iter().filter(|t| t.window_id == window).collect(),
        ScanInput::Snapshot { tabs, .. } => tabs,
    };

    if options.is_disabled() {
        println!("All triggers are off; a scan would close nothing");
        return Ok(());
    }

    let plan = plan_closures(&tabs, &options, &ignored);
    info!("Dry run over {} tabs: {} groups", tabs.len(), plan.groups);
    println!("Groups:   {}", plan.groups);
    println!("Keep:     {:?}", plan.survivors);
    println!("Close:    {:?}", plan.closures);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_scan_input_shapes() {
        let bare: ScanInput =
            serde_json::from_value(json!([{"id": 1, "url": "https://a/", "windowId": 1}])).unwrap();
        assert!(matches!(bare, ScanInput::Tabs(ref tabs) if tabs.len() == 1));

        let snapshot: ScanInput = serde_json::from_value(json!({
            "tabs": [{"id": 1, "windowId": 2}],
            "focusedWindowId": 2
        }))
        .unwrap();
        assert!(matches!(
            snapshot,
            ScanInput::Snapshot { focused_window_id: Some(2), .. }
        ));
    }

    #[tokio::test]
    async fn test_export_then_import_files() {
        let dir = tempfile::tempdir().unwrap();
        let config = ServiceConfig::from_env(dir.path()).unwrap();
        let file = dir.path().join("settings.json");

        std::fs::write(&file, r#"{"old": false}"#).unwrap();
        import(&config, &file).await.unwrap();

        let out = dir.path().join("out.json");
        export(&config, Some(out.clone())).await.unwrap();
        let exported: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(out).unwrap()).unwrap();
        assert_eq!(exported, json!({"old": false}));

        std::fs::write(&file, "[]").unwrap();
        assert!(import(&config, &file).await.is_err());
    }
}
