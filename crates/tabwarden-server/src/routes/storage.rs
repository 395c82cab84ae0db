//! Storage and sync routes — export/import and the remote mirror.

use std::sync::Arc;

use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use tabwarden_store::{export_json, import_json, PullOutcome, PushOutcome, EXPORT_FILE_NAME};

use super::error_response;
use crate::state::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/storage/export", get(export_settings))
        .route("/storage/import", post(import_settings))
        .route("/sync/push", post(sync_push))
        .route("/sync/pull", post(sync_pull))
        .route("/sync/now", post(sync_now))
        .route("/sync/enabled", get(get_sync_enabled).put(put_sync_enabled))
}

#[derive(Debug, Deserialize)]
struct PullBody {
    #[serde(default)]
    force: bool,
}

#[derive(Debug, Deserialize)]
struct EnabledBody {
    enabled: bool,
}

pub(crate) fn push_json(outcome: PushOutcome) -> serde_json::Value {
    let (synced, version, mtime) = match outcome {
        PushOutcome::Synced { version, mtime } => (true, version, mtime),
        PushOutcome::LocalOnly { version, mtime } => (false, version, mtime),
    };
    json!({ "synced": synced, "version": version, "mtime": mtime })
}

pub(crate) fn pull_name(outcome: PullOutcome) -> &'static str {
    match outcome {
        PullOutcome::NoRemoteData => "noRemoteData",
        PullOutcome::AlreadyCurrent => "alreadyCurrent",
        PullOutcome::Updated => "updated",
    }
}

// ---------------------------------------------------------------
// Export / import
// ---------------------------------------------------------------

/// GET /api/storage/export — the whole local store as a download.
async fn export_settings(State(state): State<Arc<AppState>>) -> Response {
    match export_json(&state.bridge).await {
        Ok(text) => (
            [
                (header::CONTENT_TYPE, "application/json".to_string()),
                (
                    header::CONTENT_DISPOSITION,
                    format!("attachment; filename=\"{}\"", EXPORT_FILE_NAME),
                ),
            ],
            text,
        )
            .into_response(),
        Err(e) => error_response(e).into_response(),
    }
}

/// POST /api/storage/import — replace the local store with the body object.
async fn import_settings(State(state): State<Arc<AppState>>, body: String) -> impl IntoResponse {
    match import_json(&state.bridge, &body).await {
        Ok(count) => (StatusCode::OK, Json(json!({ "success": true, "imported": count }))),
        Err(e) => error_response(e),
    }
}

// ---------------------------------------------------------------
// Sync
// ---------------------------------------------------------------

/// POST /api/sync/push
async fn sync_push(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.bridge.push().await {
        Ok(outcome) => (StatusCode::OK, Json(push_json(outcome))),
        Err(e) => error_response(e),
    }
}

/// POST /api/sync/pull — `{force}` skips the recency check.
async fn sync_pull(
    State(state): State<Arc<AppState>>,
    Json(body): Json<PullBody>,
) -> impl IntoResponse {
    match state.bridge.pull(body.force).await {
        Ok(outcome) => (
            StatusCode::OK,
            Json(json!({ "outcome": pull_name(outcome) })),
        ),
        Err(e) => error_response(e),
    }
}

/// POST /api/sync/now — push, then adopt what the mirror holds.
async fn sync_now(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.bridge.sync_now().await {
        Ok(outcome) => (StatusCode::OK, Json(push_json(outcome))),
        Err(e) => error_response(e),
    }
}

async fn get_sync_enabled(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.bridge.sync_enabled().await {
        Ok(enabled) => (StatusCode::OK, Json(json!({ "enabled": enabled }))),
        Err(e) => error_response(e),
    }
}

async fn put_sync_enabled(
    State(state): State<Arc<AppState>>,
    Json(body): Json<EnabledBody>,
) -> impl IntoResponse {
    match state.bridge.set_sync_enabled(body.enabled).await {
        Ok(()) => {
            info!("Sync {}", if body.enabled { "enabled" } else { "disabled" });
            (StatusCode::OK, Json(json!({ "enabled": body.enabled })))
        }
        Err(e) => error_response(e),
    }
}
