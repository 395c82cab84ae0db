//! Host-facing types, matching the browser tab API surface.

use serde::{Deserialize, Serialize};

pub type TabId = i64;
pub type WindowId = i64;

/// Top-level keys of the local store besides the option names.
pub mod keys {
    pub const URLS: &str = "urls";
    pub const HOSTS: &str = "hosts";
    pub const DATA_PREFIX: &str = "data:";
    pub const VERSION: &str = "version";
    pub const MTIME: &str = "mtime";
    pub const SYNC_ENABLED: &str = "syncEnabled";
}

/// Snapshot of one browser tab, owned by the host.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tab {
    pub id: TabId,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default, rename = "pendingUrl", skip_serializing_if = "Option::is_none")]
    pub pending_url: Option<String>,
    #[serde(rename = "windowId")]
    pub window_id: WindowId,
    #[serde(default)]
    pub pinned: bool,
    #[serde(default)]
    pub active: bool,
    #[serde(default)]
    pub incognito: bool,
    /// Container / partition identifier.
    #[serde(default, rename = "cookieStoreId", skip_serializing_if = "Option::is_none")]
    pub cookie_store_id: Option<String>,
}

impl Tab {
    /// The committed URL, else the URL still loading.
    pub fn known_url(&self) -> Option<&str> {
        self.url
            .as_deref()
            .filter(|u| !u.is_empty())
            .or(self.pending_url.as_deref().filter(|u| !u.is_empty()))
    }
}

/// Tab query scope.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TabQuery {
    #[serde(rename = "lastFocusedWindow")]
    pub last_focused_window: bool,
    pub active: bool,
}

impl TabQuery {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn focused_window() -> Self {
        Self {
            last_focused_window: true,
            active: false,
        }
    }

    pub fn current_tab() -> Self {
        Self {
            last_focused_window: true,
            active: true,
        }
    }
}

/// Toolbar indicator for a tab.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IconState {
    Enabled,
    Disabled,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tab_wire_names() {
        let tab: Tab = serde_json::from_value(serde_json::json!({
            "id": 7,
            "url": "https://example.com/",
            "windowId": 2,
            "active": true,
            "cookieStoreId": "firefox-container-1"
        }))
        .unwrap();
        assert_eq!(tab.window_id, 2);
        assert!(tab.active);
        assert!(!tab.pinned);
        assert_eq!(tab.cookie_store_id.as_deref(), Some("firefox-container-1"));
    }

    #[test]
    fn test_known_url_prefers_committed() {
        let mut tab = Tab {
            id: 1,
            url: Some(String::new()),
            pending_url: Some("https://loading.example/".into()),
            ..Default::default()
        };
        assert_eq!(tab.known_url(), Some("https://loading.example/"));

        tab.url = Some("https://done.example/".into());
        assert_eq!(tab.known_url(), Some("https://done.example/"));
    }
}
