use crate::project::AppliedPreset;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Logged bodies are cut at this size.
pub const MAX_LOGGED_BODY: usize = 64 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LogType {
    Mock,
    Proxy,
    Error,
    NotFound,
}

impl LogType {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogType::Mock => "mock",
            LogType::Proxy => "proxy",
            LogType::Error => "error",
            LogType::NotFound => "notFound",
        }
    }
}

/// Which configuration entry served the request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchedRoute {
    pub parent_id: String,
    pub route_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operation_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoggedRequest {
    pub method: String,
    pub path: String,
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub query: String,
    pub headers: Vec<(String, String)>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(default)]
    pub body_truncated: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoggedResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(default)]
    pub body_truncated: bool,
}

/// Upstream leg of a proxied request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProxyRoundTrip {
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub duration_ms: u64,
}

/// Immutable record of one served request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerLog {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub project: String,
    pub server: String,
    #[serde(rename = "type")]
    pub log_type: LogType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matched: Option<MatchedRoute>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub preset: Option<AppliedPreset>,
    pub request: LoggedRequest,
    pub response: LoggedResponse,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proxy: Option<ProxyRoundTrip>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub duration_ms: u64,
}

/// Render a body for the log, capped at [`MAX_LOGGED_BODY`] bytes.
pub fn capture_body(bytes: &[u8]) -> (Option<String>, bool) {
    if bytes.is_empty() {
        return (None, false);
    }
    let truncated = bytes.len() > MAX_LOGGED_BODY;
    let slice = if truncated {
        &bytes[..MAX_LOGGED_BODY]
    } else {
        bytes
    };
    (Some(String::from_utf8_lossy(slice).into_owned()), truncated)
}
