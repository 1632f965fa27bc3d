//! Response execution.
//!
//! Turns a [`Resolution`] into a concrete HTTP response: a static object, the
//! result of a function response, or an upstream round trip. Failures never
//! escape; they become synthesized `500`/`502` responses with an error
//! description for the log.

pub mod cookies;
mod proxy;
mod script;

pub use proxy::{build_client, forward, upstream_url, UpstreamResponse};
pub use script::{run_function, ScriptResponse};

use crate::logs::{LogType, ProxyRoundTrip};
use crate::matcher::InboundRequest;
use crate::project::{MockResponse, ServerSettings};
use crate::selector::{MockBody, Resolution};
use bytes::Bytes;
use indexmap::IndexMap;
use serde_json::{json, Map, Value};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum ExecError {
    #[error("Function response failed: {0}")]
    Script(String),
    #[error("Upstream request to {url} failed: {reason}")]
    Upstream { url: String, reason: String },
    #[error("{0}")]
    Misconfigured(String),
}

/// The materialized response plus what the log needs to know about it.
#[derive(Debug, Clone)]
pub struct ExecOutcome {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
    pub log_type: LogType,
    pub response_id: Option<String>,
    pub proxy: Option<ProxyRoundTrip>,
    pub error: Option<ExecErrorInfo>,
}

/// Error kind and message carried into the log and the error header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecErrorInfo {
    pub kind: &'static str,
    pub message: String,
}

impl From<&ExecError> for ExecErrorInfo {
    fn from(err: &ExecError) -> Self {
        let kind = match err {
            ExecError::Script(_) => "function",
            ExecError::Upstream { .. } => "proxy",
            ExecError::Misconfigured(_) => "config",
        };
        Self {
            kind,
            message: err.to_string(),
        }
    }
}

impl ExecOutcome {
    fn error(status: u16, err: ExecError, response_id: Option<String>) -> Self {
        let info = ExecErrorInfo::from(&err);
        let body = json!({ "error": info.message }).to_string();
        Self {
            status,
            headers: vec![("content-type".to_string(), "application/json".to_string())],
            body: Bytes::from(body),
            log_type: LogType::Error,
            response_id,
            proxy: None,
            error: Some(info),
        }
    }

    fn not_found(req: &InboundRequest) -> Self {
        let body = json!({
            "error": format!("No route matches {} {}", req.method, req.path)
        })
        .to_string();
        Self {
            status: 404,
            headers: vec![("content-type".to_string(), "application/json".to_string())],
            body: Bytes::from(body),
            log_type: LogType::NotFound,
            response_id: None,
            proxy: None,
            error: None,
        }
    }
}

/// Executes resolutions for one server's pipeline. Cheap to clone.
#[derive(Clone)]
pub struct ResponseExecutor {
    client: reqwest::Client,
    proxy_timeout: Duration,
}

impl ResponseExecutor {
    pub fn new(client: reqwest::Client, proxy_timeout: Duration) -> Self {
        Self {
            client,
            proxy_timeout,
        }
    }

    /// Execute `resolution` for `req`. `host` is the hostname the client used
    /// to reach the mock server, for cookie domain rewriting.
    pub async fn execute(
        &self,
        resolution: Resolution<'_>,
        settings: &ServerSettings,
        req: &InboundRequest,
        host: Option<&str>,
    ) -> ExecOutcome {
        let delay = Duration::from_millis(settings.delay);
        match resolution {
            Resolution::NotFound => ExecOutcome::not_found(req),
            Resolution::Misconfigured {
                response_id,
                reason,
            } => {
                sleep(delay).await;
                ExecOutcome::error(500, ExecError::Misconfigured(reason), response_id)
            }
            Resolution::Mock { response, body, .. } => {
                let response_id = Some(response.id.clone());
                let outcome = match body {
                    MockBody::Static(res) => static_outcome(res, response_id),
                    MockBody::Script(exec) => {
                        self.run_script(exec.to_string(), req, response_id).await
                    }
                };
                sleep(delay).await;
                outcome
            }
            Resolution::Proxy {
                base_url,
                response_id,
                ..
            } => {
                let outcome = self
                    .proxy(&base_url, req, settings, host, response_id.map(str::to_string))
                    .await;
                sleep(delay).await;
                outcome
            }
        }
    }

    async fn run_script(
        &self,
        exec: String,
        req: &InboundRequest,
        response_id: Option<String>,
    ) -> ExecOutcome {
        let request = script_request(req);
        let result = tokio::task::spawn_blocking(move || run_function(&exec, &request)).await;

        let err = match result {
            Ok(Ok(out)) => {
                let (headers, body) = render_body(&out.data, &out.headers);
                return ExecOutcome {
                    status: out.code,
                    headers,
                    body,
                    log_type: LogType::Mock,
                    response_id,
                    proxy: None,
                    error: None,
                };
            }
            Ok(Err(e)) => ExecError::Script(format!("{e:#}")),
            Err(join) => ExecError::Script(format!("function task failed: {join}")),
        };
        warn!("{}", err);
        ExecOutcome::error(500, err, response_id)
    }

    async fn proxy(
        &self,
        base_url: &str,
        req: &InboundRequest,
        settings: &ServerSettings,
        host: Option<&str>,
        response_id: Option<String>,
    ) -> ExecOutcome {
        let url = upstream_url(base_url, req);
        let started = Instant::now();
        let result = forward(&self.client, &url, req, self.proxy_timeout).await;
        let duration_ms = started.elapsed().as_millis() as u64;

        match result {
            Ok(upstream) => {
                debug!("Upstream {} answered {}", url, upstream.status);
                let headers = cookies::transform(upstream.headers, settings, host);
                ExecOutcome {
                    status: upstream.status,
                    headers,
                    body: upstream.body,
                    log_type: LogType::Proxy,
                    response_id,
                    proxy: Some(ProxyRoundTrip {
                        url,
                        status: Some(upstream.status),
                        error: None,
                        duration_ms,
                    }),
                    error: None,
                }
            }
            Err(e) => {
                let err = ExecError::Upstream {
                    url: url.clone(),
                    reason: format!("{e:#}"),
                };
                warn!("{}", err);
                let mut outcome = ExecOutcome::error(502, err, response_id);
                outcome.proxy = Some(ProxyRoundTrip {
                    url,
                    status: None,
                    error: outcome.error.as_ref().map(|e| e.message.clone()),
                    duration_ms,
                });
                outcome
            }
        }
    }
}

async fn sleep(delay: Duration) {
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
}

fn static_outcome(res: &MockResponse, response_id: Option<String>) -> ExecOutcome {
    let (headers, body) = render_body(&res.data, &res.headers);
    ExecOutcome {
        status: res.code,
        headers,
        body,
        log_type: LogType::Mock,
        response_id,
        proxy: None,
        error: None,
    }
}

/// String data goes out verbatim; anything else is JSON with a default
/// `content-type`.
pub fn render_body(data: &Value, headers: &IndexMap<String, String>) -> (Vec<(String, String)>, Bytes) {
    let mut out: Vec<(String, String)> = headers
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    let has_content_type = out
        .iter()
        .any(|(k, _)| k.eq_ignore_ascii_case("content-type"));

    let body = match data {
        Value::Null => Bytes::new(),
        Value::String(s) => Bytes::from(s.clone()),
        other => {
            if !has_content_type {
                out.push(("content-type".to_string(), "application/json".to_string()));
            }
            Bytes::from(other.to_string())
        }
    };
    (out, body)
}

/// The `req` object handed to function responses.
fn script_request(req: &InboundRequest) -> Value {
    let pairs = |items: &[(String, String)]| -> Map<String, Value> {
        items
            .iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect()
    };

    let query = pairs(&req.query);
    let mut params = query.clone();
    params.extend(pairs(&req.form_fields()));

    let body = if req.body.is_empty() {
        Value::Null
    } else {
        req.json_body()
            .unwrap_or_else(|| Value::String(req.body_text().into_owned()))
    };

    json!({
        "method": req.method,
        "path": req.path,
        "params": params,
        "query": query,
        "body": body,
        "headers": pairs(&req.headers),
    })
}
