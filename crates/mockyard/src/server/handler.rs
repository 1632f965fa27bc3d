//! Request pipeline of a mock server.
//!
//! match -> select -> execute -> log, against one snapshot of the project.

use super::headers::{
    MockyardHeadersExt, VALUE_TRUE, X_MOCKYARD_ERROR, X_MOCKYARD_PRESET, X_MOCKYARD_PROXIED,
    X_MOCKYARD_RESPONSE_ID, X_MOCKYARD_ROUTE_ID, X_MOCKYARD_SERVER,
};
use super::instance::ServerInstance;
use crate::executor::{cookies::host_without_port, ExecErrorInfo, ExecOutcome};
use crate::logs::{capture_body, LogType, LoggedRequest, LoggedResponse, MatchedRoute, ServerLog};
use crate::matcher::{match_request, InboundRequest};
use crate::metrics;
use crate::project::AppliedPreset;
use crate::selector::{select, Resolution};
use bytes::Bytes;
use chrono::Utc;
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::Incoming;
use hyper::header::{HeaderName, HeaderValue};
use hyper::{Request, Response, StatusCode};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

/// Handle one request to a mock server.
pub async fn handle_request(
    req: Request<Incoming>,
    instance: Arc<ServerInstance>,
    client_addr: SocketAddr,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let started = Instant::now();
    instance.count_request();

    let (parts, body) = req.into_parts();
    let mut inbound = InboundRequest::new(
        parts.method.as_str(),
        parts.uri.path(),
        parts.uri.query().unwrap_or_default(),
    );
    for (name, value) in &parts.headers {
        inbound.headers.push((
            name.as_str().to_string(),
            String::from_utf8_lossy(value.as_bytes()).into_owned(),
        ));
    }
    let host = inbound
        .header("host")
        .map(|h| host_without_port(h).to_string())
        .or_else(|| parts.uri.host().map(str::to_string));

    let limit = instance.ctx.max_body_bytes;
    match Limited::new(body, limit).collect().await {
        Ok(collected) => inbound = inbound.with_body(collected.to_bytes()),
        Err(e) if e.downcast_ref::<LengthLimitError>().is_some() => {
            warn!(
                "Request {} {} from {} to server '{}' exceeds {} bytes",
                inbound.method,
                inbound.path,
                client_addr,
                instance.name(),
                limit
            );
            return Ok(reject_oversized(&instance, &inbound, started, limit));
        }
        Err(e) => debug!("Failed to read request body from {}: {}", client_addr, e),
    }

    Ok(serve(&instance, &inbound, host.as_deref(), started).await)
}

/// Answer a request whose body is over the limit. Nothing is matched; the
/// entry is logged without a body.
fn reject_oversized(
    instance: &ServerInstance,
    inbound: &InboundRequest,
    started: Instant,
    limit: usize,
) -> Response<Full<Bytes>> {
    let outcome = ExecOutcome {
        status: StatusCode::PAYLOAD_TOO_LARGE.as_u16(),
        headers: Vec::new(),
        body: Bytes::from_static(b"request body too large"),
        log_type: LogType::Error,
        response_id: None,
        proxy: None,
        error: Some(ExecErrorInfo {
            kind: "request",
            message: format!("request body exceeds {limit} bytes"),
        }),
    };
    finish(instance, inbound, outcome, None, None, started)
}

/// Run the pipeline for an already-collected request. Always yields a
/// response and exactly one log entry.
pub(crate) async fn serve(
    instance: &ServerInstance,
    inbound: &InboundRequest,
    host: Option<&str>,
    started: Instant,
) -> Response<Full<Bytes>> {
    let snapshot = instance.ctx.store.snapshot();

    let mut matched_log = None;
    let mut applied_preset = None;
    let outcome = match snapshot.server(instance.name()) {
        Some(server) => {
            let matched = match_request(server, inbound);
            let resolution = select(server, &snapshot.overrides, matched.as_ref());
            let from_preset = matches!(
                resolution,
                Resolution::Mock {
                    from_preset: true,
                    ..
                } | Resolution::Proxy {
                    from_preset: true,
                    ..
                }
            );
            if from_preset {
                applied_preset = snapshot.overrides.applied.clone();
            }

            let outcome = instance
                .ctx
                .executor
                .execute(resolution, &server.settings, inbound, host)
                .await;

            matched_log = matched.map(|m| MatchedRoute {
                parent_id: m.parent_id,
                route_id: m.route_id,
                response_id: outcome.response_id.clone(),
                operation_name: m.operation.and_then(|op| op.operation_name),
            });
            outcome
        }
        None => {
            warn!(
                "Server '{}' no longer exists in project '{}'",
                instance.name(),
                instance.project()
            );
            ExecOutcome {
                status: 503,
                headers: Vec::new(),
                body: Bytes::from_static(b"server removed"),
                log_type: LogType::Error,
                response_id: None,
                proxy: None,
                error: None,
            }
        }
    };

    finish(instance, inbound, outcome, matched_log, applied_preset, started)
}

/// Record metrics and the log entry for `outcome`, then build the response.
fn finish(
    instance: &ServerInstance,
    inbound: &InboundRequest,
    outcome: ExecOutcome,
    matched_log: Option<MatchedRoute>,
    applied_preset: Option<AppliedPreset>,
    started: Instant,
) -> Response<Full<Bytes>> {
    let duration_ms = started.elapsed().as_millis() as u64;
    metrics::record_request(
        instance.project(),
        instance.name(),
        outcome.log_type.as_str(),
        duration_ms as f64,
    );
    if let Some(proxy) = &outcome.proxy {
        metrics::record_upstream(
            instance.project(),
            instance.name(),
            proxy.status.is_some(),
            proxy.duration_ms as f64,
        );
    }

    let response = build_http_response(
        instance.name(),
        &outcome,
        matched_log.as_ref(),
        applied_preset.as_ref().map(|p| p.preset_name.as_str()),
    );

    let (req_body, req_truncated) = capture_body(&inbound.body);
    let (res_body, res_truncated) = capture_body(&outcome.body);
    instance.ctx.logs.append(ServerLog {
        id: uuid::Uuid::new_v4().to_string(),
        timestamp: Utc::now(),
        project: instance.project().to_string(),
        server: instance.name().to_string(),
        log_type: outcome.log_type,
        matched: matched_log,
        preset: applied_preset,
        request: LoggedRequest {
            method: inbound.method.clone(),
            path: inbound.path.clone(),
            query: inbound.raw_query.clone(),
            headers: inbound.headers.clone(),
            body: req_body,
            body_truncated: req_truncated,
        },
        response: LoggedResponse {
            status: outcome.status,
            headers: outcome.headers,
            body: res_body,
            body_truncated: res_truncated,
        },
        proxy: outcome.proxy,
        error: outcome.error.map(|e| e.message),
        duration_ms,
    });

    response
}

fn build_http_response(
    server: &str,
    outcome: &ExecOutcome,
    matched: Option<&MatchedRoute>,
    preset: Option<&str>,
) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(outcome.body.clone()));
    *response.status_mut() =
        StatusCode::from_u16(outcome.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

    for (name, value) in &outcome.headers {
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => {
                response.headers_mut().append(name, value);
            }
            _ => debug!("Dropping invalid response header '{}'", name),
        }
    }

    response.set_header_value(&X_MOCKYARD_SERVER, server);
    if let Some(matched) = matched {
        response.set_header_value(&X_MOCKYARD_ROUTE_ID, &matched.route_id);
        if let Some(response_id) = &matched.response_id {
            response.set_header_value(&X_MOCKYARD_RESPONSE_ID, response_id);
        }
    }
    if let Some(preset) = preset {
        response.set_header_value(&X_MOCKYARD_PRESET, preset);
    }
    if outcome.log_type == LogType::Proxy || outcome.proxy.is_some() {
        response.set_header(&X_MOCKYARD_PROXIED, &VALUE_TRUE);
    }
    if let Some(error) = &outcome.error {
        response.set_header_value(&X_MOCKYARD_ERROR, error.kind);
    }
    response
}
