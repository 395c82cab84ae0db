//! HTTP route handlers for the companion extension.

pub mod message;
pub mod storage;
pub mod tabs;

use std::sync::Arc;

use axum::http::StatusCode;
use axum::{Json, Router};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use tabwarden_core::Error;

use crate::state::AppState;

/// Build the main Axum router with all routes.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .nest("/api", api_routes())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

fn api_routes() -> Router<Arc<AppState>> {
    Router::new()
        .merge(message::routes())
        .merge(tabs::routes())
        .merge(storage::routes())
}

/// Map an error to a status code and a `{ "error": ... }` body.
pub(crate) fn error_response(e: Error) -> (StatusCode, Json<serde_json::Value>) {
    let status = match e {
        Error::MalformedImport(_) | Error::UnknownOption(_) => StatusCode::BAD_REQUEST,
        Error::SyncDisabled => StatusCode::CONFLICT,
        Error::TabGone(_) => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(serde_json::json!({ "error": e.to_string() })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relay::RelayHost;
    use axum::body::Body;
    use axum::http::{Method, Request};
    use serde_json::{json, Value};
    use std::time::Duration;
    use tabwarden_core::ServiceConfig;
    use tabwarden_store::{MemoryRemote, MemoryStore, RemoteStore, StorageBridge};
    use tower::ServiceExt;

    struct Harness {
        router: Router,
        state: Arc<AppState>,
        remote: Arc<MemoryRemote>,
        _dir: tempfile::TempDir,
    }

    async fn harness() -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let config = ServiceConfig::from_env(dir.path()).unwrap();
        let remote = Arc::new(MemoryRemote::new());
        let bridge = Arc::new(StorageBridge::new(
            Arc::new(MemoryStore::new()),
            Some(remote.clone() as Arc<dyn RemoteStore>),
            config.remote_key(),
        ));
        let state = Arc::new(AppState::new(bridge, Arc::new(RelayHost::new())));
        state.engine.load().await.unwrap();
        state.engine.watch_restores();
        Harness {
            router: build_router(state.clone()),
            state,
            remote,
            _dir: dir,
        }
    }

    async fn call(router: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let request = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => request
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => request.body(Body::empty()).unwrap(),
        };
        let response = router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    fn snapshot_body() -> Value {
        json!({
            "focusedWindowId": 1,
            "tabs": [
                {"id": 1, "url": "https://news.example/", "windowId": 1, "active": true},
                {"id": 2, "url": "https://news.example/", "windowId": 1},
                {"id": 3, "url": "https://other.example/", "windowId": 1},
            ]
        })
    }

    #[tokio::test]
    async fn test_message_roundtrip() {
        let h = harness().await;

        let (status, configs) = call(&h.router, Method::POST, "/api/message", Some(json!({"configs": true}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(configs["windows"], json!(true));

        let (_, ack) = call(
            &h.router,
            Method::POST,
            "/api/message",
            Some(json!({"setup": "query", "enable": false})),
        )
        .await;
        assert_eq!(ack, json!(true));
        assert!(!h.state.engine.options().query);

        let (_, none) = call(&h.router, Method::POST, "/api/message", Some(json!({"setup": "nope"}))).await;
        assert_eq!(none, Value::Null);
    }

    #[tokio::test]
    async fn test_event_closes_duplicates_via_commands() {
        let h = harness().await;
        let (status, _) = call(&h.router, Method::POST, "/api/tabs/snapshot", Some(snapshot_body())).await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = call(
            &h.router,
            Method::POST,
            "/api/tabs/event",
            Some(json!({
                "event": "update",
                "tab": {"id": 2, "url": "https://news.example/", "windowId": 1}
            })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        tokio::time::sleep(Duration::from_millis(200)).await;
        let (_, commands) = call(&h.router, Method::GET, "/api/tabs/commands", None).await;
        let commands = commands.as_array().unwrap();
        assert!(commands.contains(&json!({"type": "remove", "tabId": 2})));
        assert_eq!(h.state.relay.tab_count(), 2);

        let (_, drained) = call(&h.router, Method::GET, "/api/tabs/commands", None).await;
        assert_eq!(drained, json!([]));
    }

    #[tokio::test]
    async fn test_activation_sets_icon() {
        let h = harness().await;
        call(&h.router, Method::POST, "/api/tabs/snapshot", Some(snapshot_body())).await;
        h.state
            .engine
            .toggle_ignore(tabwarden_engine::IgnoreKind::Host, true, "other.example")
            .await;

        call(&h.router, Method::POST, "/api/tabs/activated", Some(json!({"tabId": 3}))).await;
        tokio::time::sleep(Duration::from_millis(50)).await;

        let (_, commands) = call(&h.router, Method::GET, "/api/tabs/commands", None).await;
        assert!(commands
            .as_array()
            .unwrap()
            .contains(&json!({"type": "setIcon", "tabId": 3, "state": "disabled"})));
    }

    #[tokio::test]
    async fn test_export_import() {
        let h = harness().await;
        let (status, exported) = call(&h.router, Method::GET, "/api/storage/export", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(exported["old"], json!(true));

        let (status, body) = call(
            &h.router,
            Method::POST,
            "/api/storage/import",
            Some(json!({"old": false, "hosts": ["a.example"]})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["imported"], json!(2));
        assert_eq!(h.state.bridge.get("old").await.unwrap(), Some(json!(false)));

        let (status, _) = call(&h.router, Method::POST, "/api/storage/import", Some(json!([1, 2]))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        // Store untouched by the rejected import
        assert_eq!(h.state.bridge.get("hosts").await.unwrap(), Some(json!(["a.example"])));
    }

    #[tokio::test]
    async fn test_sync_endpoints() {
        let h = harness().await;

        let (status, pushed) = call(&h.router, Method::POST, "/api/sync/push", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(pushed["synced"], json!(true));
        assert_eq!(pushed["version"], json!(1));
        assert!(h.remote.get(h.state.bridge.remote_key()).await.unwrap().is_some());

        let (_, pulled) = call(&h.router, Method::POST, "/api/sync/pull", Some(json!({}))).await;
        assert_eq!(pulled["outcome"], json!("alreadyCurrent"));

        let (_, enabled) = call(&h.router, Method::GET, "/api/sync/enabled", None).await;
        assert_eq!(enabled["enabled"], json!(true));

        call(&h.router, Method::PUT, "/api/sync/enabled", Some(json!({"enabled": false}))).await;
        let (status, _) = call(&h.router, Method::POST, "/api/sync/now", None).await;
        assert_eq!(status, StatusCode::CONFLICT);
    }

    #[test]
    fn test_error_status_mapping() {
        assert_eq!(error_response(Error::SyncDisabled).0, StatusCode::CONFLICT);
        assert_eq!(error_response(Error::MalformedImport("x".into())).0, StatusCode::BAD_REQUEST);
        assert_eq!(
            error_response(Error::Storage("disk".into())).0,
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
