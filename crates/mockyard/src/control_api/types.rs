//! Response helpers for the control API.

use crate::error::EngineError;
use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::{Request, Response, StatusCode};
use serde::Serialize;

/// Error detail in API responses
#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
}

/// Error response wrapper
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub errors: Vec<ErrorDetail>,
}

/// Create a JSON response
pub fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response<Full<Bytes>> {
    let json = serde_json::to_string(body).unwrap_or_else(|_| "{}".to_string());
    build_response_with_headers(status, [("Content-Type", "application/json")], json)
}

/// Build an HTTP response with headers. Falls back to a bare 500 if the
/// builder rejects the parts.
pub fn build_response_with_headers(
    status: StatusCode,
    headers: impl IntoIterator<Item = (impl AsRef<str>, impl AsRef<str>)>,
    body: impl Into<Bytes>,
) -> Response<Full<Bytes>> {
    let mut builder = Response::builder().status(status);
    for (key, value) in headers {
        builder = builder.header(key.as_ref(), value.as_ref());
    }
    builder.body(Full::new(body.into())).unwrap_or_else(|_| {
        let mut response = Response::new(Full::new(Bytes::from("Internal Server Error")));
        *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
        response
    })
}

/// Create an error response
pub fn error_response(status: StatusCode, code: &str, message: &str) -> Response<Full<Bytes>> {
    let error = ErrorResponse {
        errors: vec![ErrorDetail {
            code: code.to_string(),
            message: message.to_string(),
        }],
    };
    json_response(status, &error)
}

pub fn engine_error(err: &EngineError) -> Response<Full<Bytes>> {
    let status = match err {
        EngineError::ProjectNotLoaded(_)
        | EngineError::ServerNotFound(_)
        | EngineError::ParentNotFound(_)
        | EngineError::RouteNotFound(_)
        | EngineError::ResponseNotFound(_)
        | EngineError::FolderNotFound(_)
        | EngineError::PresetNotFound { .. } => StatusCode::NOT_FOUND,
        EngineError::NoActiveProject
        | EngineError::ServerExists(_)
        | EngineError::PortConflict { .. }
        | EngineError::AlreadyRunning(_)
        | EngineError::StartCancelled(_) => StatusCode::CONFLICT,
        EngineError::InvalidConfig(_)
        | EngineError::ParentTypeMismatch { .. }
        | EngineError::ProxyMisconfigured { .. } => StatusCode::BAD_REQUEST,
        EngineError::Bind { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    };
    error_response(status, err.code(), &err.to_string())
}

/// Create a not found response
pub fn not_found() -> Response<Full<Bytes>> {
    error_response(StatusCode::NOT_FOUND, "NOT_FOUND", "Not Found")
}

/// Collect request body into bytes
pub async fn collect_body(req: Request<Incoming>) -> Result<Bytes, String> {
    use http_body_util::BodyExt;
    req.collect()
        .await
        .map(|c| c.to_bytes())
        .map_err(|e| format!("Failed to read request body: {e}"))
}
