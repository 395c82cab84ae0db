//! Engine — in-memory options and ignore lists, scans, icon reflection.

use std::sync::{Arc, Weak};
use std::time::Duration;

use futures::future::join_all;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use tabwarden_core::{Error, IconState, OptionKey, Options, Result, TabId, TabQuery};
use tabwarden_store::StorageBridge;

use crate::dedup::plan_closures;
use crate::host::TabHost;
use crate::ignore::{toggled, IgnoreKind, IgnoreLists};
use crate::scheduler::{schedule_after, ScheduledTask, Trigger};

/// Delay between a tab event and the icon refresh for that tab.
const ICON_REFRESH_DELAY: Duration = Duration::from_millis(100);
/// Wait between lookups of a tab whose URL is not known yet.
const ICON_RETRY_DELAY: Duration = Duration::from_millis(500);
const ICON_MAX_ATTEMPTS: usize = 10;

/// Tab lifecycle event kinds that trigger a scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TabEventKind {
    Create,
    Attach,
    Replace,
    Update,
}

impl TabEventKind {
    pub fn trigger(&self) -> Trigger {
        match self {
            Self::Create => Trigger::Create,
            Self::Attach => Trigger::Attach,
            Self::Replace => Trigger::Replace,
            Self::Update => Trigger::Update,
        }
    }
}

/// A tab lifecycle event from the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TabEvent {
    pub kind: TabEventKind,
    pub tab_id: TabId,
    pub url: Option<String>,
}

/// Outcome of one scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScanReport {
    pub trigger: Trigger,
    /// The trigger was disabled or the engine is off; no tabs were queried.
    pub skipped: bool,
    pub groups: usize,
    /// Tabs the scan attempted to close.
    pub closed: Vec<TabId>,
}

impl ScanReport {
    fn skipped(trigger: Trigger) -> Self {
        Self {
            trigger,
            skipped: true,
            groups: 0,
            closed: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default)]
struct EngineState {
    options: Options,
    ignored: IgnoreLists,
}

/// The duplicate tab engine.
///
/// Scans read a copy of the options and ignore lists taken at scan start;
/// concurrent toggles apply to the next scan.
pub struct Engine {
    bridge: Arc<StorageBridge>,
    host: Arc<dyn TabHost>,
    state: RwLock<EngineState>,
}

impl Engine {
    pub fn new(bridge: Arc<StorageBridge>, host: Arc<dyn TabHost>) -> Self {
        Self {
            bridge,
            host,
            state: RwLock::new(EngineState::default()),
        }
    }

    pub fn bridge(&self) -> &Arc<StorageBridge> {
        &self.bridge
    }

    pub fn options(&self) -> Options {
        self.state.read().options
    }

    pub fn ignored(&self) -> IgnoreLists {
        self.state.read().ignored.clone()
    }

    pub fn is_disabled(&self) -> bool {
        self.state.read().options.is_disabled()
    }

    // ---------------------------------------------------------------
    // Lifecycle
    // ---------------------------------------------------------------

    /// Load options and ignore lists from the local store.
    ///
    /// An empty local store is first filled from the remote mirror; if that
    /// yields nothing the defaults are written.
    pub async fn load(&self) -> Result<()> {
        let mut stored = self.bridge.snapshot().await?;

        if stored.is_empty() && self.bridge.has_remote() {
            match self.bridge.pull(true).await {
                Ok(outcome) => debug!("Empty local store, remote pull: {:?}", outcome),
                Err(e) => warn!("Remote pull on first load failed: {}", e),
            }
            stored = self.bridge.snapshot().await?;
        }

        if stored.is_empty() {
            let defaults = Options::default().to_entries();
            self.bridge.set_many(defaults.clone()).await?;
            stored = defaults;
            info!("First run: wrote default options");
        }

        let options = Options::from_store(&stored);
        let ignored = IgnoreLists::from_store(&stored);
        info!(
            "Engine loaded: {} ignored urls, {} ignored hosts, disabled={}",
            ignored.urls.len(),
            ignored.hosts.len(),
            options.is_disabled()
        );
        *self.state.write() = EngineState { options, ignored };
        Ok(())
    }

    /// Re-read options and ignore lists, keeping the current values on error.
    pub async fn reload(&self) {
        if let Err(e) = self.load().await {
            warn!("Failed to reload engine state: {}", e);
        }
    }

    /// Load, follow store restores, and schedule the start scan.
    pub async fn start(self: &Arc<Self>) -> Result<ScheduledTask> {
        self.load().await?;
        self.watch_restores();
        Ok(self.schedule_scan(Trigger::Start))
    }

    /// Reload whenever the local store is replaced or rewritten by another
    /// process. Ends when the engine is dropped.
    pub fn watch_restores(self: &Arc<Self>) -> JoinHandle<()> {
        let mut restores = self.bridge.subscribe_restores();
        let engine: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            loop {
                match restores.recv().await {
                    Ok(event) => {
                        let Some(engine) = engine.upgrade() else { break };
                        debug!("Local store restored ({:?}), reloading", event.source);
                        engine.reload().await;
                    }
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }

    // ---------------------------------------------------------------
    // Scans
    // ---------------------------------------------------------------

    /// Run one scan now.
    pub async fn check_tabs(&self, trigger: Trigger) -> ScanReport {
        let (options, ignored) = {
            let state = self.state.read();
            (state.options, state.ignored.clone())
        };

        if !options.get(trigger.option_key()) || options.is_disabled() {
            debug!("Scan '{}' skipped: trigger disabled", trigger);
            return ScanReport::skipped(trigger);
        }

        let query = if options.windows {
            TabQuery::focused_window()
        } else {
            TabQuery::all()
        };
        let tabs = match self.host.query(query).await {
            Ok(tabs) => tabs,
            Err(e) => {
                warn!("Scan '{}' could not query tabs: {}", trigger, e);
                return ScanReport::skipped(trigger);
            }
        };

        let plan = plan_closures(&tabs, &options, &ignored);
        debug!(
            "Scan '{}': {} tabs, {} groups, {} to close",
            trigger,
            tabs.len(),
            plan.groups,
            plan.closures.len()
        );

        join_all(plan.closures.iter().map(|id| self.safe_remove(*id))).await;
        if !plan.closures.is_empty() {
            info!("Closed {} duplicate tabs: {:?}", plan.closures.len(), plan.closures);
        }

        ScanReport {
            trigger,
            skipped: false,
            groups: plan.groups,
            closed: plan.closures,
        }
    }

    /// Close a tab, treating failures as already closed.
    async fn safe_remove(&self, id: TabId) {
        if let Err(e) = self.host.remove(id).await {
            debug!("Tab {} not removed: {}", id, e);
        }
    }

    pub fn schedule_scan(self: &Arc<Self>, trigger: Trigger) -> ScheduledTask {
        let engine = Arc::clone(self);
        schedule_after(trigger.delay(), async move {
            engine.check_tabs(trigger).await;
        })
    }

    /// Schedule a scan and an icon refresh for a tab lifecycle event.
    pub fn on_tab_event(self: &Arc<Self>, event: TabEvent) -> ScheduledTask {
        let engine = Arc::clone(self);
        let TabEvent { kind, tab_id, url } = event;
        schedule_after(ICON_REFRESH_DELAY, async move {
            engine.refresh_icon(tab_id, url).await;
        });
        self.schedule_scan(kind.trigger())
    }

    /// Refresh the icon of a newly activated tab.
    pub fn on_activated(self: &Arc<Self>, tab_id: TabId) -> ScheduledTask {
        let engine = Arc::clone(self);
        schedule_after(Duration::ZERO, async move {
            engine.refresh_icon(tab_id, None).await;
        })
    }

    // ---------------------------------------------------------------
    // Icon reflection
    // ---------------------------------------------------------------

    pub fn icon_state_for(&self, url: &str) -> IconState {
        let state = self.state.read();
        if state.options.is_disabled() || state.ignored.is_ignored(url) {
            IconState::Disabled
        } else {
            IconState::Enabled
        }
    }

    /// Recompute a tab's indicator, looking its URL up when not given.
    pub async fn refresh_icon(&self, tab_id: TabId, url: Option<String>) {
        let mut url = url.filter(|u| !u.is_empty());
        let mut attempts = 0;

        while url.is_none() {
            attempts += 1;
            match self.host.get(tab_id).await {
                Ok(Some(tab)) => url = tab.known_url().map(str::to_string),
                Ok(None) | Err(_) => {
                    debug!("Tab {} gone before icon refresh", tab_id);
                    return;
                }
            }
            if url.is_none() {
                if attempts >= ICON_MAX_ATTEMPTS {
                    debug!("Tab {} still has no URL, giving up on icon", tab_id);
                    return;
                }
                tokio::time::sleep(ICON_RETRY_DELAY).await;
            }
        }

        let Some(url) = url else { return };
        let state = self.icon_state_for(&url);
        if let Err(e) = self.host.set_icon(tab_id, state).await {
            debug!("Icon update for tab {} failed: {}", tab_id, e);
        }
    }

    /// Refresh the icon of the active tab in the last-focused window.
    pub async fn update_current_icon(&self) {
        match self.host.query(TabQuery::current_tab()).await {
            Ok(tabs) => {
                if let Some(tab) = tabs.into_iter().next() {
                    let url = tab.known_url().map(str::to_string);
                    self.refresh_icon(tab.id, url).await;
                }
            }
            Err(e) => debug!("No current tab for icon refresh: {}", e),
        }
    }

    // ---------------------------------------------------------------
    // Mutations
    // ---------------------------------------------------------------

    /// Set one option. The in-memory flag changes first; a failed write is
    /// logged and not rolled back.
    pub async fn set_option(&self, name: &str, enable: bool) -> Result<()> {
        let key = OptionKey::from_name(name).ok_or_else(|| Error::UnknownOption(name.to_string()))?;
        self.state.write().options.set(key, enable);

        if let Err(e) = self.bridge.set(key.name(), Value::Bool(enable)).await {
            warn!("Option '{}' changed in memory but not persisted: {}", key, e);
        }
        info!("Option '{}' set to {}", key, enable);
        Ok(())
    }

    /// Add (`ignore = true`) or remove `value` from an ignore list. Returns
    /// whether the list changed.
    pub async fn toggle_ignore(&self, kind: IgnoreKind, ignore: bool, value: &str) -> bool {
        let updated = {
            let mut state = self.state.write();
            let Some(list) = toggled(state.ignored.list(kind), value, ignore) else {
                return false;
            };
            state.ignored.set_list(kind, list.clone());
            list
        };

        let stored = Value::Array(updated.into_iter().map(Value::String).collect());
        if let Err(e) = self.bridge.set(kind.store_key(), stored).await {
            warn!("Ignore list '{}' changed in memory but not persisted: {}", kind.store_key(), e);
        }
        info!(
            "{} '{}' {} ignore list",
            if ignore { "Added" } else { "Removed" },
            value,
            if ignore { "to" } else { "from" }
        );
        true
    }
}
