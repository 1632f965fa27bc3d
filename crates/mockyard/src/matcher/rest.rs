use super::{InboundRequest, RouteMatch};
use super::params;
use crate::project::{ProjectServer, RouteParent};

/// Collapse repeated slashes, force a leading slash and drop the trailing one.
pub fn normalize_path(path: &str) -> String {
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    format!("/{}", segments.join("/"))
}

/// Full path of a route under its parent's prefix.
pub fn join_paths(prefix: &str, route_path: &str) -> String {
    normalize_path(&format!("{prefix}/{route_path}"))
}

/// First route (in configuration order) whose method, path and predicate
/// match. Routes without a predicate are only used when no predicated route
/// with the same key is satisfied.
pub(super) fn match_rest(
    server: &ProjectServer,
    req: &InboundRequest,
    path: &str,
) -> Option<RouteMatch> {
    let mut fallback = None;

    for parent in server.parent_routes_hash.values() {
        let RouteParent::Rest(parent) = parent else {
            continue;
        };
        for route in parent.routes_hash.values() {
            if !route.method.trim().eq_ignore_ascii_case(&req.method) {
                continue;
            }
            if join_paths(&parent.path, &route.route_path) != path {
                continue;
            }
            let found = RouteMatch::rest(&parent.id, &route.id);
            if route.with_params {
                if params::satisfied(req, route.param_type, &route.param_key, &route.param_value)
                {
                    return Some(found);
                }
            } else if fallback.is_none() {
                fallback = Some(found);
            }
        }
    }

    fallback
}
