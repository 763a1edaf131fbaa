//! HTTP handlers for the presentation bridge
//!
//! Action routes always answer 200 with an `ApiResponseEnvelope`; failures
//! travel inside the envelope, never as HTTP errors.

use axum::{extract::State, response::Json};
use serde::Serialize;
use serde_json::{json, Value};
use shared::{process_debug, ApiResponseEnvelope, BackendProcessHandle, ProcessId, PromptAction, UpdateSession};

use super::BridgeState;
use crate::core::ShellEvent;
use crate::error::ShellResult;

fn envelope<T: Serialize>(result: ShellResult<T>) -> Json<ApiResponseEnvelope> {
    let envelope = match result.and_then(|value| Ok(serde_json::to_value(value)?)) {
        Ok(value) => ApiResponseEnvelope::ok(value),
        Err(e) => ApiResponseEnvelope::err(e.to_string()),
    };
    Json(envelope)
}

fn string_field<'a>(body: &'a Value, field: &str) -> Option<&'a str> {
    body.get(field).and_then(Value::as_str)
}

pub async fn health(State(state): State<BridgeState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "uptimeSeconds": (chrono::Utc::now() - state.started_at).num_seconds(),
    }))
}

pub async fn ping() -> Json<Value> {
    Json(json!({
        "message": "pong",
        "greeting": "Hello from the desktop shell!",
    }))
}

pub async fn versions(State(state): State<BridgeState>) -> Json<Value> {
    Json(json!({
        "shell": env!("CARGO_PKG_VERSION"),
        "platform": std::env::consts::OS,
        "arch": std::env::consts::ARCH,
        "devMode": state.context.config().dev_mode,
        "startedAt": state.started_at.to_rfc3339(),
    }))
}

/// `callBackend(method, endpoint, data?)`
pub async fn call_backend(State(state): State<BridgeState>, Json(body): Json<Value>) -> Json<ApiResponseEnvelope> {
    let (Some(method), Some(endpoint)) = (string_field(&body, "method"), string_field(&body, "endpoint")) else {
        return Json(ApiResponseEnvelope::err("request needs string 'method' and 'endpoint' fields"));
    };
    let data = body.get("data").filter(|data| !data.is_null()).cloned();

    process_debug!(ProcessId::current(), "📨 callBackend {} {}", method, endpoint);
    Json(state.gateway.call_raw(method, endpoint, data).await)
}

pub async fn backend_port(State(state): State<BridgeState>) -> Json<Value> {
    Json(json!({ "port": state.gateway.backend_port() }))
}

pub async fn backend_status(State(state): State<BridgeState>) -> Json<BackendProcessHandle> {
    Json(state.context.backend())
}

pub async fn update_status(State(state): State<BridgeState>) -> Json<UpdateSession> {
    Json(state.updater.snapshot().await)
}

pub async fn update_check(State(state): State<BridgeState>) -> Json<ApiResponseEnvelope> {
    envelope(Ok(state.updater.check_for_update().await))
}

pub async fn update_respond(State(state): State<BridgeState>, Json(body): Json<Value>) -> Json<ApiResponseEnvelope> {
    let action = match string_field(&body, "action").unwrap_or_default().parse::<PromptAction>() {
        Ok(action) => action,
        Err(e) => return Json(ApiResponseEnvelope::err(e.to_string())),
    };
    envelope(state.updater.respond_to_prompt(action).await)
}

pub async fn update_install(State(state): State<BridgeState>) -> Json<ApiResponseEnvelope> {
    envelope(state.updater.install_now().await)
}

pub async fn window_activate(State(state): State<BridgeState>) -> Json<ApiResponseEnvelope> {
    state.context.emit(ShellEvent::ActivateRequested);
    envelope(Ok(json!({ "activated": true })))
}
