//! Parameter predicates: `paramType`/`paramKey`/`paramValue`.

use super::InboundRequest;
use crate::project::ParamType;
use serde_json::Value;

/// True when the request carries `key == expected` at `param_type`.
pub fn satisfied(req: &InboundRequest, param_type: ParamType, key: &str, expected: &str) -> bool {
    match param_type {
        ParamType::Query => query_matches(req, key, expected),
        ParamType::Body => body_value(req, key).as_deref() == Some(expected),
        ParamType::Params => match form_value(req, key) {
            Some(v) => v == expected,
            None => query_matches(req, key, expected),
        },
    }
}

fn form_value(req: &InboundRequest, key: &str) -> Option<String> {
    req.form_fields()
        .into_iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v)
}

fn query_matches(req: &InboundRequest, key: &str, expected: &str) -> bool {
    req.query.iter().any(|(k, v)| k == key && v == expected)
}

/// Value of `key` in the body: a dotted path into a JSON body, or a field of
/// a form-encoded body.
fn body_value(req: &InboundRequest, key: &str) -> Option<String> {
    if req.body.is_empty() {
        return None;
    }
    if let Some(json) = req.json_body() {
        return lookup_json(&json, key).map(value_text);
    }
    form_value(req, key)
}

/// Resolve `key` against a JSON value. A literal key wins over a dotted path.
pub fn lookup_json<'a>(value: &'a Value, key: &str) -> Option<&'a Value> {
    if let Some(found) = value.get(key) {
        return Some(found);
    }
    key.split('.').try_fold(value, |current, segment| match current {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

/// Strings compare by content, everything else by its JSON text.
pub fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
