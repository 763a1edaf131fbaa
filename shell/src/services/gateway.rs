//! API gateway between the presentation layer and the backend
//!
//! Every call turns into exactly one HTTP round-trip to the supervised
//! backend. Whatever happens on the way, the caller gets an
//! `ApiResponseEnvelope`; failures never escape as errors or panics.

use reqwest::Method;
use serde_json::Value;
use shared::{
    process_debug, ApiRequestEnvelope, ApiResponseEnvelope, BackendProcessHandle, HttpMethod, ProcessId,
};
use std::time::Duration;
use tokio::sync::watch;

use crate::core::ShellContext;
use crate::error::{ShellError, ShellResult};

pub struct ApiGateway {
    client: reqwest::Client,
    backend: watch::Receiver<BackendProcessHandle>,
}

impl ApiGateway {
    pub fn new(backend: watch::Receiver<BackendProcessHandle>, timeout: Duration) -> ShellResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .no_proxy()
            .build()
            .map_err(|e| ShellError::transport(format!("failed to build gateway client: {e}")))?;
        Ok(Self { client, backend })
    }

    pub fn from_context(context: &ShellContext) -> ShellResult<Self> {
        Self::new(context.backend_watch(), context.config().request_timeout)
    }

    /// Port the backend was launched on, if any
    pub fn backend_port(&self) -> Option<u16> {
        self.backend.borrow().port
    }

    /// Forward a call whose method is still an unparsed string
    pub async fn call_raw(&self, method: &str, endpoint: &str, data: Option<Value>) -> ApiResponseEnvelope {
        match method.parse::<HttpMethod>() {
            Ok(method) => self.call(ApiRequestEnvelope::new(method, endpoint, data)).await,
            Err(e) => ApiResponseEnvelope::err(e.to_string()),
        }
    }

    pub async fn call(&self, request: ApiRequestEnvelope) -> ApiResponseEnvelope {
        match self.round_trip(&request).await {
            Ok(envelope) => envelope,
            Err(e) => {
                process_debug!(
                    ProcessId::current(),
                    "{} {} failed: {}",
                    request.method,
                    request.endpoint,
                    e
                );
                ApiResponseEnvelope::err(e.to_string())
            }
        }
    }

    async fn round_trip(&self, request: &ApiRequestEnvelope) -> ShellResult<ApiResponseEnvelope> {
        let base = self
            .backend
            .borrow()
            .base_url()
            .ok_or_else(|| ShellError::transport("backend port not assigned"))?;

        if request.data.is_some() && !request.method.allows_body() {
            return Err(ShellError::transport(format!(
                "{} requests cannot carry a JSON body",
                request.method
            )));
        }

        let url = format!("{base}{}", shared::normalize_endpoint(&request.endpoint));
        let mut builder = self.client.request(to_reqwest(request.method), &url);
        if let Some(data) = &request.data {
            builder = builder.json(data);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| ShellError::transport(describe(&e)))?;
        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| ShellError::transport(format!("failed to read response: {e}")))?;

        let value = if body.iter().all(u8::is_ascii_whitespace) {
            Value::Null
        } else {
            match serde_json::from_slice::<Value>(&body) {
                Ok(value) => value,
                Err(e) if status.is_success() => {
                    return Err(ShellError::transport(format!("malformed JSON from backend: {e}")));
                }
                Err(_) => Value::Null,
            }
        };

        process_debug!(ProcessId::current(), "{} {} -> {}", request.method, url, status);

        if status.is_success() {
            Ok(ApiResponseEnvelope::ok(value))
        } else {
            let message = error_detail(&value).unwrap_or_else(|| format!("backend returned HTTP {status}"));
            Ok(ApiResponseEnvelope::err(message))
        }
    }
}

fn to_reqwest(method: HttpMethod) -> Method {
    match method {
        HttpMethod::Get => Method::GET,
        HttpMethod::Post => Method::POST,
        HttpMethod::Put => Method::PUT,
        HttpMethod::Patch => Method::PATCH,
        HttpMethod::Delete => Method::DELETE,
        HttpMethod::Head => Method::HEAD,
        HttpMethod::Options => Method::OPTIONS,
    }
}

/// Human-readable cause of a failed round-trip
fn describe(error: &reqwest::Error) -> String {
    if error.is_timeout() {
        format!("backend request timed out: {error}")
    } else if error.is_connect() {
        format!("backend unreachable: {error}")
    } else {
        format!("backend request failed: {error}")
    }
}

/// `error` or `detail` field of an error body (FastAPI uses `detail`)
fn error_detail(body: &Value) -> Option<String> {
    ["error", "detail"].iter().find_map(|key| match body.get(*key)? {
        Value::Null => None,
        Value::String(text) if text.is_empty() => None,
        Value::String(text) => Some(text.clone()),
        other => Some(other.to_string()),
    })
}
