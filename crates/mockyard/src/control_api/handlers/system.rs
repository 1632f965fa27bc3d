//! System handlers: root, health, metrics, init snapshot.

use crate::control_api::types::*;
use crate::fleet::FleetManager;
use crate::metrics;
use bytes::Bytes;
use http_body_util::Full;
use hyper::{Response, StatusCode};

/// GET / - Root endpoint
pub fn handle_root(base_url: &str) -> Response<Full<Bytes>> {
    let body = serde_json::json!({
        "version": env!("CARGO_PKG_VERSION"),
        "_links": {
            "commands": {"href": format!("{}/commands", base_url)},
            "init": {"href": format!("{}/init", base_url)},
            "servers": {"href": format!("{}/servers", base_url)}
        }
    });
    json_response(StatusCode::OK, &body)
}

/// GET /health - Health check
pub fn handle_health() -> Response<Full<Bytes>> {
    json_response(StatusCode::OK, &serde_json::json!({"status": "ok"}))
}

/// GET /metrics - Prometheus metrics
pub fn handle_metrics() -> Response<Full<Bytes>> {
    build_response_with_headers(
        StatusCode::OK,
        [("Content-Type", "text/plain; version=0.0.4")],
        metrics::collect_metrics(),
    )
}

/// GET /init - State snapshot for a newly attached client
pub fn handle_init(fleet: &FleetManager) -> Response<Full<Bytes>> {
    json_response(StatusCode::OK, &fleet.init_snapshot())
}
