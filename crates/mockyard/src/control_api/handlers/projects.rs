//! Project-scoped read handlers: server states and logs.

use crate::control_api::types::*;
use crate::error::EngineError;
use crate::fleet::FleetManager;
use bytes::Bytes;
use http_body_util::Full;
use hyper::{Response, StatusCode};
use serde_json::json;
use tracing::info;

/// GET /servers - Server states of the active project
pub fn handle_list_servers(fleet: &FleetManager) -> Response<Full<Bytes>> {
    match fleet.active_project() {
        Some(project) => json_response(
            StatusCode::OK,
            &json!({"project": project, "servers": fleet.server_statuses()}),
        ),
        None => engine_error(&EngineError::NoActiveProject),
    }
}

/// GET /projects/:name/logs
pub fn handle_get_logs(project: &str, fleet: &FleetManager) -> Response<Full<Bytes>> {
    match fleet.get_logs(Some(project)) {
        Ok(logs) => json_response(StatusCode::OK, &json!({"project": project, "logs": logs})),
        Err(e) => engine_error(&e),
    }
}

/// DELETE /projects/:name/logs
pub fn handle_clear_logs(project: &str, fleet: &FleetManager) -> Response<Full<Bytes>> {
    match fleet.clear_logs(Some(project)) {
        Ok(()) => {
            info!("Logs of '{}' cleared", project);
            json_response(StatusCode::OK, &json!({"project": project, "logs": []}))
        }
        Err(e) => engine_error(&e),
    }
}
