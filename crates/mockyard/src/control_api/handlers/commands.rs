//! Command endpoint.

use crate::commands::{dispatch, EngineCommand};
use crate::control_api::types::*;
use crate::fleet::FleetManager;
use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::{Request, Response, StatusCode};

/// POST /commands - Execute one engine command.
///
/// A well-formed command always gets a 200 with `{success, ...}`; only
/// malformed JSON is rejected at the HTTP level.
pub async fn handle_command(req: Request<Incoming>, fleet: &FleetManager) -> Response<Full<Bytes>> {
    let body = match collect_body(req).await {
        Ok(b) => b,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, "BAD_REQUEST", &e),
    };

    let cmd: EngineCommand = match serde_json::from_slice(&body) {
        Ok(c) => c,
        Err(e) => {
            return error_response(
                StatusCode::BAD_REQUEST,
                "INVALID_COMMAND",
                &format!("Invalid command JSON: {e}"),
            )
        }
    };

    let reply = dispatch(fleet, cmd).await;
    json_response(StatusCode::OK, &reply)
}
