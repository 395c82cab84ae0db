//! Relay host — the engine's view of the extension's tabs.
//!
//! The companion extension posts snapshots and events; the engine's
//! removals and icon changes are queued as commands the extension drains.

use std::collections::BTreeMap;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use tabwarden_core::{Error, IconState, Result, Tab, TabId, TabQuery, WindowId};
use tabwarden_engine::TabHost;

/// Commands kept when the extension stops draining the queue.
const MAX_QUEUED_COMMANDS: usize = 1024;

/// A host operation for the extension to carry out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum HostCommand {
    Remove {
        #[serde(rename = "tabId")]
        tab_id: TabId,
    },
    SetIcon {
        #[serde(rename = "tabId")]
        tab_id: TabId,
        state: IconState,
    },
}

#[derive(Debug, Default)]
struct TabView {
    tabs: BTreeMap<TabId, Tab>,
    focused_window: Option<WindowId>,
}

/// [`TabHost`] backed by the last snapshot the extension reported.
#[derive(Debug, Default)]
pub struct RelayHost {
    view: RwLock<TabView>,
    commands: Mutex<Vec<HostCommand>>,
}

impl RelayHost {
    pub fn new() -> Self {
        Self::default()
    }

    // ---------------------------------------------------------------
    // View updates from the extension
    // ---------------------------------------------------------------

    /// Replace the whole tab view.
    pub fn replace_snapshot(&self, tabs: Vec<Tab>, focused_window: Option<WindowId>) {
        let count = tabs.len();
        let mut view = self.view.write();
        view.tabs = tabs.into_iter().map(|t| (t.id, t)).collect();
        view.focused_window = focused_window;
        info!("Tab snapshot: {} tabs, focused window {:?}", count, focused_window);
    }

    /// Insert or update one tab.
    pub fn upsert(&self, tab: Tab) {
        self.view.write().tabs.insert(tab.id, tab);
    }

    /// Mark a tab active in its window and focus that window.
    pub fn mark_active(&self, tab_id: TabId) {
        let mut view = self.view.write();
        let Some(window) = view.tabs.get(&tab_id).map(|t| t.window_id) else {
            debug!("Activated tab {} is not in the view", tab_id);
            return;
        };
        for tab in view.tabs.values_mut().filter(|t| t.window_id == window) {
            tab.active = tab.id == tab_id;
        }
        view.focused_window = Some(window);
    }

    pub fn tab_count(&self) -> usize {
        self.view.read().tabs.len()
    }

    // ---------------------------------------------------------------
    // Command queue
    // ---------------------------------------------------------------

    /// Drain the queued commands, oldest first.
    pub fn take_commands(&self) -> Vec<HostCommand> {
        std::mem::take(&mut *self.commands.lock())
    }

    /// Queue a command. A newer icon state replaces a queued one for the
    /// same tab, and removing a tab drops its queued icon changes.
    fn queue(&self, command: HostCommand) {
        let tab_id = match &command {
            HostCommand::Remove { tab_id } | HostCommand::SetIcon { tab_id, .. } => *tab_id,
        };
        let mut commands = self.commands.lock();
        commands.retain(|c| !matches!(c, HostCommand::SetIcon { tab_id: t, .. } if *t == tab_id));
        if commands.len() >= MAX_QUEUED_COMMANDS {
            let dropped = commands.len() + 1 - MAX_QUEUED_COMMANDS;
            commands.drain(..dropped);
            warn!("Command queue full, dropped {} oldest commands", dropped);
        }
        commands.push(command);
    }
}

#[async_trait]
impl TabHost for RelayHost {
    async fn query(&self, query: TabQuery) -> Result<Vec<Tab>> {
        let view = self.view.read();
        // Without a focused window, every window counts as focused
        let in_scope = |tab: &Tab| {
            !query.last_focused_window
                || view.focused_window.map_or(true, |w| tab.window_id == w)
        };
        Ok(view
            .tabs
            .values()
            .filter(|t| in_scope(*t))
            .filter(|t| !query.active || t.active)
            .cloned()
            .collect())
    }

    async fn get(&self, id: TabId) -> Result<Option<Tab>> {
        Ok(self.view.read().tabs.get(&id).cloned())
    }

    async fn remove(&self, id: TabId) -> Result<()> {
        if self.view.write().tabs.remove(&id).is_none() {
            return Err(Error::TabGone(id));
        }
        self.queue(HostCommand::Remove { tab_id: id });
        Ok(())
    }

    async fn set_icon(&self, id: TabId, state: IconState) -> Result<()> {
        if !self.view.read().tabs.contains_key(&id) {
            return Err(Error::TabGone(id));
        }
        self.queue(HostCommand::SetIcon { tab_id: id, state });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tab(id: TabId, window_id: WindowId) -> Tab {
        Tab {
            id,
            url: Some(format!("https://site.example/{}", id)),
            window_id,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_query_scopes_to_focused_window() {
        let relay = RelayHost::new();
        relay.replace_snapshot(vec![tab(1, 1), tab(2, 2), tab(3, 2)], Some(2));

        let ids = |tabs: Vec<Tab>| tabs.into_iter().map(|t| t.id).collect::<Vec<_>>();
        assert_eq!(ids(relay.query(TabQuery::all()).await.unwrap()), vec![1, 2, 3]);
        assert_eq!(ids(relay.query(TabQuery::focused_window()).await.unwrap()), vec![2, 3]);

        relay.mark_active(1);
        assert_eq!(ids(relay.query(TabQuery::current_tab()).await.unwrap()), vec![1]);
    }

    #[tokio::test]
    async fn test_mark_active_clears_siblings() {
        let relay = RelayHost::new();
        let mut first = tab(1, 1);
        first.active = true;
        relay.replace_snapshot(vec![first, tab(2, 1), tab(3, 2)], Some(1));

        relay.mark_active(2);
        assert!(!relay.get(1).await.unwrap().unwrap().active);
        assert!(relay.get(2).await.unwrap().unwrap().active);
        assert!(!relay.get(3).await.unwrap().unwrap().active);
    }

    #[tokio::test]
    async fn test_remove_queues_command_once() {
        let relay = RelayHost::new();
        relay.replace_snapshot(vec![tab(1, 1), tab(2, 1)], None);

        relay.remove(2).await.unwrap();
        assert!(matches!(relay.remove(2).await, Err(Error::TabGone(2))));
        assert!(matches!(
            relay.set_icon(2, IconState::Enabled).await,
            Err(Error::TabGone(2))
        ));
        relay.set_icon(1, IconState::Disabled).await.unwrap();

        let commands = relay.take_commands();
        assert_eq!(
            serde_json::to_value(&commands).unwrap(),
            json!([
                {"type": "remove", "tabId": 2},
                {"type": "setIcon", "tabId": 1, "state": "disabled"},
            ])
        );
        assert!(relay.take_commands().is_empty());
        assert_eq!(relay.tab_count(), 1);
    }

    #[tokio::test]
    async fn test_queue_coalesces_icons_and_stays_bounded() {
        let relay = RelayHost::new();
        relay.replace_snapshot(vec![tab(1, 1), tab(2, 1)], None);

        relay.set_icon(1, IconState::Enabled).await.unwrap();
        relay.set_icon(2, IconState::Enabled).await.unwrap();
        relay.set_icon(1, IconState::Disabled).await.unwrap();
        relay.remove(2).await.unwrap();
        assert_eq!(
            relay.take_commands(),
            vec![
                HostCommand::SetIcon { tab_id: 1, state: IconState::Disabled },
                HostCommand::Remove { tab_id: 2 },
            ]
        );

        // Nobody drains: only the newest commands are kept
        let count = MAX_QUEUED_COMMANDS as TabId + 10;
        relay.replace_snapshot((1..=count).map(|id| tab(id, 1)).collect(), None);
        for id in 1..=count {
            relay.remove(id).await.unwrap();
        }
        let commands = relay.take_commands();
        assert_eq!(commands.len(), MAX_QUEUED_COMMANDS);
        assert_eq!(commands[0], HostCommand::Remove { tab_id: 11 });
        assert_eq!(commands.last(), Some(&HostCommand::Remove { tab_id: count }));
    }
}
