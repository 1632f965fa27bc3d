//! Route dispatch for the control API.

use crate::control_api::handlers::{commands, projects, system};
use crate::control_api::types::not_found;
use crate::fleet::FleetManager;
use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::{Method, Request, Response};
use std::sync::Arc;
use tracing::debug;

/// Parsed route for project-scoped endpoints
#[derive(Debug, PartialEq)]
enum ProjectRoute {
    /// GET/DELETE /projects/:name/logs
    Logs(String),
}

impl ProjectRoute {
    /// Parse route from the path after `/projects/`
    fn parse(path: &str) -> Option<Self> {
        let segments: Vec<&str> = path.split('/').collect();
        match segments.as_slice() {
            [name, "logs"] if !name.is_empty() => {
                let name = urlencoding::decode(name).ok()?.into_owned();
                Some(ProjectRoute::Logs(name))
            }
            _ => None,
        }
    }
}

fn base_url(req: &Request<Incoming>) -> String {
    let host = req
        .headers()
        .get(hyper::header::HOST)
        .and_then(|h| h.to_str().ok())
        .unwrap_or("localhost");
    format!("http://{host}")
}

/// Main request router
pub async fn route_request(
    req: Request<Incoming>,
    fleet: Arc<FleetManager>,
) -> Result<Response<Full<Bytes>>, hyper::Error> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    debug!("Control API: {} {}", method, path);

    let response = match (&method, path.as_str()) {
        (&Method::GET, "/") => system::handle_root(&base_url(&req)),
        (&Method::GET, "/health") => system::handle_health(),
        (&Method::GET, "/metrics") => system::handle_metrics(),
        (&Method::GET, "/init") => system::handle_init(&fleet),
        (&Method::POST, "/commands") => commands::handle_command(req, &fleet).await,
        (&Method::GET, "/servers") => projects::handle_list_servers(&fleet),
        _ => match path.strip_prefix("/projects/").and_then(ProjectRoute::parse) {
            Some(ProjectRoute::Logs(project)) => match method {
                Method::GET => projects::handle_get_logs(&project, &fleet),
                Method::DELETE => projects::handle_clear_logs(&project, &fleet),
                _ => not_found(),
            },
            None => not_found(),
        },
    };
    Ok(response)
}
