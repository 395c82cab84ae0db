//! Tab routes — live tab view, lifecycle events, queued host commands.

use std::sync::Arc;

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tracing::debug;

use tabwarden_core::{Tab, TabId, WindowId};
use tabwarden_engine::{TabEvent, TabEventKind};

use crate::relay::HostCommand;
use crate::state::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/tabs/snapshot", post(post_snapshot))
        .route("/tabs/event", post(post_event))
        .route("/tabs/activated", post(post_activated))
        .route("/tabs/commands", get(get_commands))
}

// ---------------------------------------------------------------
// Body types
// ---------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct SnapshotBody {
    tabs: Vec<Tab>,
    #[serde(default, rename = "focusedWindowId")]
    focused_window_id: Option<WindowId>,
}

#[derive(Debug, Deserialize)]
struct EventBody {
    event: TabEventKind,
    tab: Tab,
}

#[derive(Debug, Deserialize)]
struct ActivatedBody {
    #[serde(rename = "tabId")]
    tab_id: TabId,
}

#[derive(Serialize)]
struct SuccessResponse {
    success: bool,
    tabs: usize,
}

// ---------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------

/// POST /api/tabs/snapshot — replace the view of the live tab set.
async fn post_snapshot(
    State(state): State<Arc<AppState>>,
    Json(body): Json<SnapshotBody>,
) -> Json<SuccessResponse> {
    state.relay.replace_snapshot(body.tabs, body.focused_window_id);
    Json(SuccessResponse {
        success: true,
        tabs: state.relay.tab_count(),
    })
}

/// POST /api/tabs/event — record the tab and schedule the matching scan.
async fn post_event(
    State(state): State<Arc<AppState>>,
    Json(body): Json<EventBody>,
) -> Json<SuccessResponse> {
    let event = TabEvent {
        kind: body.event,
        tab_id: body.tab.id,
        url: body.tab.known_url().map(str::to_string),
    };
    debug!("Tab event {:?} for tab {}", event.kind, event.tab_id);

    state.relay.upsert(body.tab);
    state.engine.on_tab_event(event);
    Json(SuccessResponse {
        success: true,
        tabs: state.relay.tab_count(),
    })
}

/// POST /api/tabs/activated — mark the tab active and refresh its icon.
async fn post_activated(
    State(state): State<Arc<AppState>>,
    Json(body): Json<ActivatedBody>,
) -> Json<SuccessResponse> {
    state.relay.mark_active(body.tab_id);
    state.engine.on_activated(body.tab_id);
    Json(SuccessResponse {
        success: true,
        tabs: state.relay.tab_count(),
    })
}

/// GET /api/tabs/commands — drain the queued host commands.
async fn get_commands(State(state): State<Arc<AppState>>) -> Json<Vec<HostCommand>> {
    Json(state.relay.take_commands())
}
