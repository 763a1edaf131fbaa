//! Gateway envelopes
//!
//! The presentation layer asks for backend calls with an `ApiRequestEnvelope`
//! and always receives an `ApiResponseEnvelope`, whether the backend answered
//! or not.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

use crate::errors::SharedError;

/// Fallback text when a failure carries no usable message
const UNKNOWN_BACKEND_ERROR: &str = "Unknown backend error";

/// HTTP verbs the gateway forwards
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
    Head,
    Options,
}

impl HttpMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Head => "HEAD",
            HttpMethod::Options => "OPTIONS",
        }
    }

    /// GET and HEAD requests cannot carry a JSON body
    pub fn allows_body(self) -> bool {
        !matches!(self, HttpMethod::Get | HttpMethod::Head)
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HttpMethod {
    type Err = SharedError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "GET" => Ok(HttpMethod::Get),
            "POST" => Ok(HttpMethod::Post),
            "PUT" => Ok(HttpMethod::Put),
            "PATCH" => Ok(HttpMethod::Patch),
            "DELETE" => Ok(HttpMethod::Delete),
            "HEAD" => Ok(HttpMethod::Head),
            "OPTIONS" => Ok(HttpMethod::Options),
            _ => Err(SharedError::UnsupportedMethod {
                method: s.to_string(),
            }),
        }
    }
}

/// Prefix an endpoint with `/` unless it already has one. Rooted paths come
/// back unchanged, so applying it twice changes nothing.
pub fn normalize_endpoint(endpoint: &str) -> String {
    if endpoint.starts_with('/') {
        endpoint.to_string()
    } else {
        format!("/{endpoint}")
    }
}

/// A forwarded call from the presentation layer
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ApiRequestEnvelope {
    pub method: HttpMethod,
    pub endpoint: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl ApiRequestEnvelope {
    pub fn new(method: HttpMethod, endpoint: &str, data: Option<Value>) -> Self {
        Self {
            method,
            endpoint: normalize_endpoint(endpoint),
            data,
        }
    }
}

/// Normalized result of a gateway call: exactly one of data/error is present
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(try_from = "WireEnvelope")]
pub struct ApiResponseEnvelope {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl ApiResponseEnvelope {
    pub fn ok(data: Value) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn err(message: impl Into<String>) -> Self {
        let message = message.into();
        let message = if message.trim().is_empty() {
            UNKNOWN_BACKEND_ERROR.to_string()
        } else {
            message
        };
        Self {
            success: false,
            data: None,
            error: Some(message),
        }
    }

    pub fn is_success(&self) -> bool {
        self.success
    }

    pub fn data(&self) -> Option<&Value> {
        self.data.as_ref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn into_result(self) -> Result<Value, String> {
        match (self.data, self.error) {
            (Some(data), None) => Ok(data),
            (_, Some(error)) => Err(error),
            (None, None) => Err(UNKNOWN_BACKEND_ERROR.to_string()),
        }
    }
}

/// Unvalidated wire form used when reading envelopes back
#[derive(Deserialize)]
struct WireEnvelope {
    success: bool,
    #[serde(default)]
    data: Option<Value>,
    #[serde(default)]
    error: Option<String>,
}

impl TryFrom<WireEnvelope> for ApiResponseEnvelope {
    type Error = SharedError;

    fn try_from(wire: WireEnvelope) -> Result<Self, Self::Error> {
        match (wire.success, wire.data, wire.error) {
            // a successful `null` body deserializes as a missing field
            (true, data, None) => Ok(Self::ok(data.unwrap_or(Value::Null))),
            (false, None, Some(error)) => Ok(Self::err(error)),
            _ => Err(SharedError::SerializationError {
                message: "envelope must carry exactly one of data or error".to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_normalize_endpoint_is_idempotent() {
        let paths = ["", "/", "calculate", "/calculate", "//double", "api/health?x=1", " spaced"];
        for path in paths {
            let once = normalize_endpoint(path);
            assert!(once.starts_with('/'), "{path:?} -> {once:?}");
            assert_eq!(normalize_endpoint(&once), once, "not idempotent for {path:?}");
        }
        assert_eq!(normalize_endpoint("calculate"), normalize_endpoint("/calculate"));
    }

    #[test]
    fn test_method_parsing_is_case_insensitive() {
        assert_eq!("post".parse::<HttpMethod>().unwrap(), HttpMethod::Post);
        assert_eq!(" Delete ".parse::<HttpMethod>().unwrap(), HttpMethod::Delete);
        assert!(matches!(
            "TRACE".parse::<HttpMethod>(),
            Err(SharedError::UnsupportedMethod { .. })
        ));
    }

    #[test]
    fn test_envelope_populates_exactly_one_side() {
        let ok = ApiResponseEnvelope::ok(json!({"result": 15}));
        assert!(ok.is_success());
        assert!(ok.data().is_some() && ok.error().is_none());

        let err = ApiResponseEnvelope::err("connection refused");
        assert!(!err.is_success());
        assert!(err.data().is_none());
        assert_eq!(err.error(), Some("connection refused"));
    }

    #[test]
    fn test_empty_error_message_gets_fallback() {
        let err = ApiResponseEnvelope::err("   ");
        assert_eq!(err.error(), Some(UNKNOWN_BACKEND_ERROR));
    }

    #[test]
    fn test_envelope_wire_shape() {
        let ok = serde_json::to_value(ApiResponseEnvelope::ok(json!({"result": 15}))).unwrap();
        assert_eq!(ok, json!({"success": true, "data": {"result": 15}}));

        let err = serde_json::to_value(ApiResponseEnvelope::err("boom")).unwrap();
        assert_eq!(err, json!({"success": false, "error": "boom"}));
    }

    #[test]
    fn test_inconsistent_envelope_is_rejected() {
        let bad = json!({"success": false, "data": 1, "error": "x"});
        assert!(serde_json::from_value::<ApiResponseEnvelope>(bad).is_err());

        let null_ok: ApiResponseEnvelope =
            serde_json::from_value(json!({"success": true, "data": null})).unwrap();
        assert_eq!(null_ok.data(), Some(&Value::Null));
    }

    #[test]
    fn test_request_envelope_normalizes_endpoint() {
        let request = ApiRequestEnvelope::new(HttpMethod::Get, "api/health", None);
        assert_eq!(request.endpoint, "/api/health");

        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json, json!({"method": "GET", "endpoint": "/api/health"}));
    }
}
