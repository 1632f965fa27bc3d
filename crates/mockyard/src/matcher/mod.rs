//! Route matching.
//!
//! [`match_request`] maps an inbound request to a configured route. GraphQL
//! parents whose endpoint equals the request path get the first look; REST
//! routes are then scanned in configuration order.

mod graphql;
mod params;
mod rest;

pub use graphql::{
    extract_request, parse_operation, GraphQlOperation, GraphQlParseError, GraphQlRequest,
};
pub use params::{lookup_json, value_text};
pub use rest::{join_paths, normalize_path};

use crate::project::{GraphQlParent, ProjectServer, RouteParent};
use bytes::Bytes;
use serde_json::Value;
use std::borrow::Cow;
use tracing::debug;

/// The parts of an HTTP request the engine looks at.
#[derive(Debug, Clone, Default)]
pub struct InboundRequest {
    pub method: String,
    pub path: String,
    pub raw_query: String,
    /// Decoded query pairs, in order.
    pub query: Vec<(String, String)>,
    /// Header names are lowercase.
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

impl InboundRequest {
    pub fn new(method: &str, path: &str, raw_query: &str) -> Self {
        Self {
            method: method.to_ascii_uppercase(),
            path: path.to_string(),
            raw_query: raw_query.to_string(),
            query: parse_urlencoded(raw_query),
            headers: Vec::new(),
            body: Bytes::new(),
        }
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers
            .push((name.to_ascii_lowercase(), value.to_string()));
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// First value of a header, by case-insensitive name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn query_param(&self, key: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn body_text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }

    /// Body parsed as JSON, if it is JSON.
    pub fn json_body(&self) -> Option<Value> {
        if self.body.is_empty() {
            return None;
        }
        serde_json::from_slice(&self.body).ok()
    }

    /// Body parsed as `application/x-www-form-urlencoded`.
    pub fn form_fields(&self) -> Vec<(String, String)> {
        let content_type = self.header("content-type").unwrap_or_default();
        if !content_type.starts_with("application/x-www-form-urlencoded") {
            return Vec::new();
        }
        parse_urlencoded(&self.body_text())
    }

    /// Request path with percent-escapes decoded.
    pub fn decoded_path(&self) -> String {
        urlencoding::decode(&self.path)
            .map(Cow::into_owned)
            .unwrap_or_else(|_| self.path.clone())
    }
}

/// Split `a=1&b=x+y` into decoded pairs.
pub fn parse_urlencoded(input: &str) -> Vec<(String, String)> {
    input
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (k, v) = pair.split_once('=').unwrap_or((pair, ""));
            (decode_component(k), decode_component(v))
        })
        .collect()
}

fn decode_component(s: &str) -> String {
    let plus_decoded = s.replace('+', " ");
    urlencoding::decode(&plus_decoded)
        .map(Cow::into_owned)
        .unwrap_or(plus_decoded)
}

/// A matched route, identified by parent and route id.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteMatch {
    pub parent_id: String,
    pub route_id: String,
    /// Present when the route was matched as a GraphQL operation.
    pub operation: Option<GraphQlOperation>,
}

impl RouteMatch {
    fn rest(parent_id: &str, route_id: &str) -> Self {
        Self {
            parent_id: parent_id.to_string(),
            route_id: route_id.to_string(),
            operation: None,
        }
    }
}

/// Map `req` to a route of `server`, or `None` when nothing matches.
pub fn match_request(server: &ProjectServer, req: &InboundRequest) -> Option<RouteMatch> {
    let path = normalize_path(&req.decoded_path());

    let mut operation: Option<Option<GraphQlOperation>> = None;
    for parent in server.parent_routes_hash.values() {
        let RouteParent::GraphQl(parent) = parent else {
            continue;
        };
        if normalize_path(&parent.path) != path {
            continue;
        }
        let op = operation.get_or_insert_with(|| parse_graphql(req));
        if let Some(op) = op {
            if let Some(found) = match_graphql(parent, op) {
                return Some(found);
            }
        }
    }

    rest::match_rest(server, req, &path)
}

fn parse_graphql(req: &InboundRequest) -> Option<GraphQlOperation> {
    let request = extract_request(req)?;
    match request.operation() {
        Ok(op) => Some(op),
        Err(e) => {
            debug!("Ignoring unparseable GraphQL document: {}", e);
            None
        }
    }
}

/// Routes are looked up by root field name; the operation name is tried when
/// no root field has a route.
fn match_graphql(parent: &GraphQlParent, op: &GraphQlOperation) -> Option<RouteMatch> {
    let candidates = op.root_fields.iter().chain(op.operation_name.iter());

    for field in candidates {
        let mut fallback = None;
        for route in parent.graph_ql_route_hash.values() {
            if route.operation != op.kind || &route.name != field {
                continue;
            }
            let found = RouteMatch {
                parent_id: parent.id.clone(),
                route_id: route.id.clone(),
                operation: Some(op.clone()),
            };
            if route.with_params {
                let actual = lookup_json(&op.variables, &route.param_key).map(value_text);
                if actual.as_deref() == Some(route.param_value.as_str()) {
                    return Some(found);
                }
            } else if fallback.is_none() {
                fallback = Some(found);
            }
        }
        if fallback.is_some() {
            return fallback;
        }
    }

    None
}
