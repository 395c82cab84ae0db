//! Inbound message protocol from the settings and popup pages.
//!
//! One request shape per field present, checked in order: `ignore`,
//! `setup`, `data`, `extra`, `configs`, `ignored`.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error};

use tabwarden_core::{keys, Error, Options, Result, TabId};

use crate::engine::Engine;
use crate::ignore::{IgnoreKind, IgnoreLists};
use crate::scheduler::Trigger;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MessageRequest {
    /// Add (truthy) or remove (falsy) `value` from the `{type}s` list.
    #[serde(default)]
    pub ignore: Option<Value>,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub value: Option<Value>,
    /// Option name to set to `enable`.
    #[serde(default)]
    pub setup: Option<String>,
    #[serde(default)]
    pub enable: Option<Value>,
    /// Auxiliary entry id, stored under `data:{id}`.
    #[serde(default)]
    pub data: Option<Value>,
    #[serde(default)]
    pub extra: Option<Value>,
    #[serde(default)]
    pub configs: Option<Value>,
    #[serde(default)]
    pub ignored: Option<Value>,
    #[serde(default, rename = "tabId")]
    pub tab_id: Option<TabId>,
    #[serde(default)]
    pub url: Option<String>,
}

/// One auxiliary `data:*` entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExtraEntry {
    pub id: String,
    pub value: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum MessageResponse {
    Ack(bool),
    Extra(Vec<ExtraEntry>),
    Configs(Options),
    Ignored(IgnoreLists),
    /// No field matched, or handling failed.
    NoReply,
}

/// JavaScript-style truthiness of an optional JSON value.
fn truthy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().map_or(false, |f| f != 0.0 && !f.is_nan()),
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Array(_)) | Some(Value::Object(_)) => true,
    }
}

fn data_id(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Handle one message. Internal errors are logged and answered with
/// [`MessageResponse::NoReply`].
pub async fn handle_message(engine: &Arc<Engine>, request: MessageRequest) -> MessageResponse {
    let mutates = request.ignore.is_some() || request.setup.is_some();

    let response = match dispatch(engine, &request).await {
        Ok(response) => response,
        Err(e) => {
            error!("Message handling failed: {}", e);
            return MessageResponse::NoReply;
        }
    };

    if mutates && engine.options().datachange {
        engine.schedule_scan(Trigger::Datachange);
    }
    response
}

async fn dispatch(engine: &Arc<Engine>, request: &MessageRequest) -> Result<MessageResponse> {
    if let Some(ignore) = &request.ignore {
        let kind_name = request.kind.as_deref().unwrap_or_default();
        let kind = IgnoreKind::from_name(kind_name)
            .ok_or_else(|| Error::Internal(format!("unknown ignore type '{}'", kind_name)))?;

        match request.value.as_ref().and_then(Value::as_str) {
            Some(value) => {
                engine.toggle_ignore(kind, truthy(Some(ignore)), value).await;
            }
            None => debug!("Ignore toggle without a string value, nothing to do"),
        }

        if let Some(tab_id) = request.tab_id {
            let engine = Arc::clone(engine);
            let url = request.url.clone();
            tokio::spawn(async move { engine.refresh_icon(tab_id, url).await });
        }
        return Ok(MessageResponse::Ack(true));
    }

    if let Some(setup) = &request.setup {
        engine.set_option(setup, truthy(request.enable.as_ref())).await?;
        engine.update_current_icon().await;
        return Ok(MessageResponse::Ack(true));
    }

    if let Some(data) = request.data.as_ref().filter(|d| truthy(Some(*d))) {
        let key = format!("{}{}", keys::DATA_PREFIX, data_id(data));
        let value = request.value.clone().unwrap_or(Value::Null);
        engine.bridge().set(&key, value).await?;
        return Ok(MessageResponse::Ack(true));
    }

    if truthy(request.extra.as_ref()) {
        let entries = engine
            .bridge()
            .snapshot()
            .await?
            .into_iter()
            .filter_map(|(key, value)| {
                key.strip_prefix(keys::DATA_PREFIX).map(|id| ExtraEntry {
                    id: id.to_string(),
                    value,
                })
            })
            .collect();
        return Ok(MessageResponse::Extra(entries));
    }

    if truthy(request.configs.as_ref()) {
        return Ok(MessageResponse::Configs(engine.options()));
    }

    if truthy(request.ignored.as_ref()) {
        return Ok(MessageResponse::Ignored(engine.ignored()));
    }

    Ok(MessageResponse::NoReply)
}
