//! The browser primitives the engine calls into.

use async_trait::async_trait;

use tabwarden_core::{IconState, Result, Tab, TabId, TabQuery};

/// Browser tab API as seen by the engine.
#[async_trait]
pub trait TabHost: Send + Sync {
    /// Tabs matching `query`.
    async fn query(&self, query: TabQuery) -> Result<Vec<Tab>>;

    /// A single tab, `None` once it no longer exists.
    async fn get(&self, id: TabId) -> Result<Option<Tab>>;

    /// Close a tab. Fails with `TabGone` when it was already closed.
    async fn remove(&self, id: TabId) -> Result<()>;

    /// Set the toolbar indicator of a tab.
    async fn set_icon(&self, id: TabId, state: IconState) -> Result<()>;
}
