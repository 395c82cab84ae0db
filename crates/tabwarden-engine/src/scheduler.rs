//! Delayed scan triggers.
//!
//! Triggers are not coalesced: every event schedules its own delayed task.
//! Scans are idempotent, so a superseded task running anyway only costs a
//! redundant no-op scan.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;

use tabwarden_core::OptionKey;

/// What caused a scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trigger {
    Start,
    Create,
    Attach,
    Replace,
    Update,
    Datachange,
}

impl Trigger {
    /// Debounce before the scan runs. Attach waits longer so the host can
    /// settle a tab moving between windows.
    pub fn delay(&self) -> Duration {
        match self {
            Self::Start => Duration::from_millis(100),
            Self::Attach => Duration::from_millis(500),
            Self::Create | Self::Replace | Self::Update | Self::Datachange => {
                Duration::from_millis(10)
            }
        }
    }

    /// The option that enables this trigger.
    pub fn option_key(&self) -> OptionKey {
        match self {
            Self::Start => OptionKey::Start,
            Self::Create => OptionKey::Create,
            Self::Attach => OptionKey::Attach,
            Self::Replace => OptionKey::Replace,
            Self::Update => OptionKey::Update,
            Self::Datachange => OptionKey::Datachange,
        }
    }

    pub fn name(&self) -> &'static str {
        self.option_key().name()
    }
}

impl std::fmt::Display for Trigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Handle to a delayed task. Dropping it does not cancel the task.
#[derive(Debug)]
pub struct ScheduledTask {
    handle: JoinHandle<()>,
}

impl ScheduledTask {
    /// Cancel the task if it has not run yet.
    pub fn cancel(&self) {
        self.handle.abort();
    }

    /// Wait for the task to run (or be cancelled).
    pub async fn join(self) {
        let _ = self.handle.await;
    }
}

/// Run `task` once `delay` has elapsed.
pub fn schedule_after<F>(delay: Duration, task: F) -> ScheduledTask
where
    F: Future<Output = ()> + Send + 'static,
{
    let handle = tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        task.await;
    });
    ScheduledTask { handle }
}
