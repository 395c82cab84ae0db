//! Message protocol route for the settings and popup pages.

use std::sync::Arc;

use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};

use tabwarden_engine::{handle_message, MessageRequest, MessageResponse};

use crate::state::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/message", post(post_message))
}

/// POST /api/message — answers `null` when nothing matched or handling failed.
async fn post_message(
    State(state): State<Arc<AppState>>,
    Json(request): Json<MessageRequest>,
) -> Json<MessageResponse> {
    Json(handle_message(&state.engine, request).await)
}
