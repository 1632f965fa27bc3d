//! `func` responses: user function bodies run on the boa JavaScript engine.
//!
//! The body is called as `function (req, request) { ... }` and must return an
//! object shaped like `{ code, data, headers }`. A full function expression
//! (`function (req) { ... }`) is accepted as well.

use anyhow::{anyhow, Result};
use boa_engine::{
    js_string, object::builtins::JsArray, property::PropertyKey, Context, JsNativeError, JsObject,
    JsResult, JsValue, Source,
};
use indexmap::IndexMap;
use serde_json::{Map, Value};

const LOOP_ITERATION_LIMIT: u64 = 1_000_000;
const RECURSION_LIMIT: usize = 512;
/// Nesting allowed in a function's result.
const MAX_RESULT_DEPTH: usize = 64;
/// Values (scalars included) allowed in a function's result.
const MAX_RESULT_VALUES: usize = 100_000;

/// What a function response produced.
#[derive(Debug, Clone, PartialEq)]
pub struct ScriptResponse {
    pub code: u16,
    pub data: Value,
    pub headers: IndexMap<String, String>,
}

/// Run `exec` against the request object `req` (already shaped as JSON).
///
/// Blocking; call it from `spawn_blocking`.
pub fn run_function(exec: &str, req: &Value) -> Result<ScriptResponse> {
    let mut context = Context::default();
    context
        .runtime_limits_mut()
        .set_loop_iteration_limit(LOOP_ITERATION_LIMIT);
    context.runtime_limits_mut().set_recursion_limit(RECURSION_LIMIT);

    let request_obj = json_to_js(&mut context, req)
        .map_err(|e| anyhow!("Failed to build request object: {e}"))?;
    context
        .global_object()
        .set(js_string!("__req"), request_obj, false, &mut context)
        .map_err(|e| anyhow!("Failed to set request: {e}"))?;

    let result = context
        .eval(Source::from_bytes(wrap(exec).as_bytes()))
        .map_err(|e| anyhow!("Function threw: {e}"))?;

    let value = ResultReader::default()
        .read(&mut context, &result)
        .map_err(|e| anyhow!("Failed to read function result: {e}"))?;
    parse_result(value)
}

fn wrap(exec: &str) -> String {
    let trimmed = exec.trim();
    let call = if trimmed.starts_with("function") || trimmed.starts_with("async function") {
        format!("({trimmed})(__req, __req)")
    } else {
        format!("(function (req, request) {{\n{exec}\n}})(__req, __req)")
    };
    format!(
        r#"
        var __result = {call};
        if (__result && typeof __result.then === 'function') {{
            throw new Error('asynchronous function responses are not supported');
        }}
        __result;
        "#
    )
}

fn parse_result(value: Value) -> Result<ScriptResponse> {
    let Value::Object(mut map) = value else {
        return Err(anyhow!(
            "Function must return an object with code, data and headers"
        ));
    };

    let code = match map.remove("code") {
        None | Some(Value::Null) => 200,
        Some(Value::Number(n)) => n
            .as_f64()
            .filter(|f| f.fract() == 0.0 && (100.0..=999.0).contains(f))
            .map(|f| f as u16)
            .ok_or_else(|| anyhow!("Invalid status code {n}"))?,
        Some(Value::String(s)) => s
            .trim()
            .parse::<u16>()
            .map_err(|_| anyhow!("Invalid status code '{s}'"))?,
        Some(other) => return Err(anyhow!("Invalid status code {other}")),
    };

    let headers = match map.remove("headers") {
        Some(Value::Object(h)) => h
            .into_iter()
            .map(|(k, v)| {
                let v = match v {
                    Value::String(s) => s,
                    other => other.to_string(),
                };
                (k, v)
            })
            .collect(),
        _ => IndexMap::new(),
    };

    Ok(ScriptResponse {
        code,
        data: map.remove("data").unwrap_or(Value::Null),
        headers,
    })
}

fn create_js_object(context: &Context) -> JsObject {
    JsObject::with_object_proto(context.intrinsics())
}

fn json_to_js(context: &mut Context, value: &Value) -> JsResult<JsValue> {
    match value {
        Value::Null => Ok(JsValue::null()),
        Value::Bool(b) => Ok(JsValue::from(*b)),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(JsValue::from(i))
            } else if let Some(f) = n.as_f64() {
                Ok(JsValue::from(f))
            } else {
                Ok(JsValue::null())
            }
        }
        Value::String(s) => Ok(JsValue::from(js_string!(s.clone()))),
        Value::Array(arr) => {
            let js_arr = JsArray::new(context);
            for (i, v) in arr.iter().enumerate() {
                let js_val = json_to_js(context, v)?;
                js_arr.set(i as u32, js_val, false, context)?;
            }
            Ok(js_arr.into())
        }
        Value::Object(obj) => {
            let js_obj = create_js_object(context);
            for (k, v) in obj {
                let js_val = json_to_js(context, v)?;
                js_obj.set(js_string!(k.clone()), js_val, false, context)?;
            }
            Ok(js_obj.into())
        }
    }
}

/// Converts a function's result back to JSON, refusing cycles and results too
/// deep or too large to be a response body.
#[derive(Default)]
struct ResultReader {
    ancestors: Vec<JsObject>,
    values: usize,
}

impl ResultReader {
    fn read(&mut self, context: &mut Context, value: &JsValue) -> JsResult<Value> {
        self.values += 1;
        if self.values > MAX_RESULT_VALUES {
            return Err(JsNativeError::range()
                .with_message("result has too many values")
                .into());
        }

        if value.is_null() || value.is_undefined() {
            return Ok(Value::Null);
        }

        if let Some(b) = value.as_boolean() {
            return Ok(Value::Bool(b));
        }

        if let Some(n) = value.as_number() {
            // Integral numbers stay integers in JSON.
            if n.fract() == 0.0 && n.abs() < 9_007_199_254_740_992.0 {
                return Ok(Value::from(n as i64));
            }
            return Ok(serde_json::Number::from_f64(n)
                .map(Value::Number)
                .unwrap_or(Value::Null));
        }

        if let Some(s) = value.as_string() {
            return Ok(Value::String(s.to_std_string_escaped()));
        }

        let Some(obj) = value.as_object() else {
            return Ok(Value::Null);
        };
        if obj.is_callable() {
            return Ok(Value::Null);
        }
        if self.ancestors.iter().any(|a| JsObject::equals(a, obj)) {
            return Err(JsNativeError::typ()
                .with_message("result contains a circular reference")
                .into());
        }
        if self.ancestors.len() >= MAX_RESULT_DEPTH {
            return Err(JsNativeError::range()
                .with_message("result is nested too deeply")
                .into());
        }

        self.ancestors.push(obj.clone());
        let converted = self.read_object(context, obj);
        self.ancestors.pop();
        converted
    }

    fn read_object(&mut self, context: &mut Context, obj: &JsObject) -> JsResult<Value> {
        if obj.is_array() {
            let len = obj
                .get(js_string!("length"), context)?
                .as_number()
                .unwrap_or(0.0);
            if len > (MAX_RESULT_VALUES - self.values) as f64 {
                return Err(JsNativeError::range()
                    .with_message("result array is too large")
                    .into());
            }
            let len = len.max(0.0) as u32;
            let mut arr = Vec::with_capacity(len as usize);
            for i in 0..len {
                let item = obj.get(i, context)?;
                arr.push(self.read(context, &item)?);
            }
            return Ok(Value::Array(arr));
        }

        let mut map = Map::new();
        for key in obj.own_property_keys(context)? {
            let key_str = match &key {
                PropertyKey::String(s) => s.to_std_string_escaped(),
                PropertyKey::Index(i) => i.get().to_string(),
                PropertyKey::Symbol(_) => continue,
            };
            let val = obj.get(key.clone(), context)?;
            map.insert(key_str, self.read(context, &val)?);
        }
        Ok(Value::Object(map))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request() -> Value {
        json!({
            "method": "POST",
            "path": "/api/users",
            "params": {"id": "7"},
            "query": {"page": "2"},
            "body": {"name": "ada", "age": 36},
            "headers": {"x-trace": "abc"}
        })
    }

    #[test]
    fn test_function_body_sees_request() {
        let out = run_function(
            "return { code: 201, data: { hello: req.body.name, page: req.query.page }, \
             headers: { 'x-trace': request.headers['x-trace'] } };",
            &request(),
        )
        .unwrap();
        assert_eq!(out.code, 201);
        assert_eq!(out.data, json!({"hello": "ada", "page": "2"}));
        assert_eq!(out.headers["x-trace"], "abc");
    }

    #[test]
    fn test_function_expression_is_accepted() {
        let out = run_function("function (req) { return { data: req.body.age + 1 }; }", &request())
            .unwrap();
        assert_eq!(out.code, 200);
        assert_eq!(out.data, json!(37));
    }

    #[test]
    fn test_throw_is_an_error() {
        let err = run_function("throw new Error('boom');", &request()).unwrap_err();
        assert!(err.to_string().starts_with("Function threw"));
    }

    #[test]
    fn test_non_object_result_is_an_error() {
        assert!(run_function("return 5;", &request()).is_err());
    }

    #[test]
    fn test_promise_is_rejected() {
        let result = run_function("return Promise.resolve({ code: 200 });", &request());
        assert!(result.is_err());
    }

    #[test]
    fn test_string_code_and_header_coercion() {
        let out = run_function(
            "return { code: '404', data: 'missing', headers: { 'x-n': 3 } };",
            &request(),
        )
        .unwrap();
        assert_eq!(out.code, 404);
        assert_eq!(out.data, json!("missing"));
        assert_eq!(out.headers["x-n"], "3");
    }

    #[test]
    fn test_cyclic_result_is_an_error() {
        let err = run_function(
            "var a = {}; a.self = a; return { code: 200, data: a };",
            &request(),
        )
        .unwrap_err();
        assert!(err.to_string().contains("circular"));
    }

    #[test]
    fn test_deep_result_is_an_error() {
        let result = run_function(
            "var d = {}; var top = d; for (var i = 0; i < 200; i++) { d.next = {}; d = d.next; } \
             return { data: top };",
            &request(),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_shared_subtrees_are_bounded() {
        let result = run_function(
            "var n = [1]; for (var i = 0; i < 40; i++) { n = [n, n]; } return { data: n };",
            &request(),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_huge_array_length_is_an_error() {
        let result = run_function("var a = []; a.length = 4294967295; return { data: a };", &request());
        assert!(result.is_err());
    }

    #[test]
    fn test_shared_object_is_not_a_cycle() {
        let out = run_function(
            "var s = { v: 1 }; return { data: { a: s, b: s } };",
            &request(),
        )
        .unwrap();
        assert_eq!(out.data, json!({"a": {"v": 1}, "b": {"v": 1}}));
    }

    #[test]
    fn test_runaway_loop_is_stopped() {
        assert!(run_function("while (true) {}", &request()).is_err());
    }
}
