//! Structural checks over a project tree held as a `serde_json::Value`.
//!
//! Codes are stable: `E0xx` for problems the engine rejects or fails on at
//! request time, `W0xx` for suspicious but loadable configuration.

use crate::types::{LintIssue, LintOptions, LintResult};
use regex::Regex;
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::OnceLock;

/// Syntax check for function responses using boa_engine.
#[cfg(feature = "javascript")]
mod js_validator {
    use boa_engine::{Context, Source};

    /// Parses `exec` inside a function expression without calling it.
    pub fn validate_javascript(exec: &str) -> Result<(), String> {
        let mut context = Context::default();
        let trimmed = exec.trim();
        let wrapped = if trimmed.starts_with("function") || trimmed.starts_with("async function")
        {
            format!("var __fn = ({trimmed});")
        } else {
            format!("var __fn = function (req, request) {{\n{exec}\n}};")
        };

        match context.eval(Source::from_bytes(wrapped.as_bytes())) {
            Ok(_) => Ok(()),
            Err(e) => Err(e.to_string()),
        }
    }
}

const HTTP_METHODS: [&str; 9] = [
    "GET", "POST", "PUT", "PATCH", "DELETE", "HEAD", "OPTIONS", "TRACE", "CONNECT",
];

fn header_name_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[!#$%&'*+\-.^_`|~0-9A-Za-z]+$").expect("header name pattern is valid")
    })
}

fn path_param_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r":([A-Za-z_][A-Za-z0-9_]*)").expect("path param pattern is valid"))
}

/// Ids reachable from preset bindings: server key -> parent id -> route id -> response ids.
#[derive(Debug, Default)]
pub struct TreeIndex {
    servers: HashMap<String, HashMap<String, HashMap<String, HashSet<String>>>>,
}

impl TreeIndex {
    fn resolve(&self, server: &str, parent: &str, route: &str, response: &str) -> Option<String> {
        let Some(parents) = self.servers.get(server) else {
            return Some(format!("server '{server}' does not exist"));
        };
        let Some(routes) = parents.get(parent) else {
            return Some(format!("parent '{parent}' does not exist on server '{server}'"));
        };
        let Some(responses) = routes.get(route) else {
            return Some(format!("route '{route}' does not exist in parent '{parent}'"));
        };
        if !responses.contains(response) {
            return Some(format!("response '{response}' does not exist on route '{route}'"));
        }
        None
    }
}

/// Server-level settings that change what responses need.
#[derive(Debug, Clone, Copy, Default)]
pub struct ServerContext {
    pub has_base_url: bool,
    pub force_proxy: bool,
}

fn str_field<'a>(value: &'a Value, key: &str) -> Option<&'a str> {
    value.get(key).and_then(Value::as_str)
}

fn bool_field(value: &Value, key: &str) -> bool {
    value.get(key).and_then(Value::as_bool).unwrap_or(false)
}

/// The id an entity is addressed by: its `id`, falling back to its map key.
fn effective_id<'a>(value: &'a Value, key: &'a str) -> &'a str {
    match str_field(value, "id") {
        Some(id) if !id.trim().is_empty() => id,
        _ => key,
    }
}

fn is_http_url(url: &str) -> bool {
    let url = url.trim();
    (url.starts_with("http://") && url.len() > "http://".len())
        || (url.starts_with("https://") && url.len() > "https://".len())
}

/// Validate a whole project tree.
pub fn validate_project(file: &Path, project: &Value, result: &mut LintResult, options: &LintOptions) {
    let Some(root) = project.as_object() else {
        result.add_issue(
            LintIssue::error("E003", "Project must be a JSON object", file.to_path_buf())
                .with_suggestion("Wrap the project in { \"name\": ..., \"servers\": {...} }"),
        );
        return;
    };

    if root
        .get("name")
        .and_then(Value::as_str)
        .map(|n| n.trim().is_empty())
        .unwrap_or(true)
    {
        result.add_issue(
            LintIssue::error("E003", "Project is missing a 'name'", file.to_path_buf())
                .with_location("name"),
        );
    }

    let mut index = TreeIndex::default();
    match root.get("servers") {
        None | Some(Value::Null) => {}
        Some(Value::Object(servers)) => {
            let mut ports: HashMap<u16, Vec<&str>> = HashMap::new();
            for (key, server) in servers {
                let location = format!("servers.{key}");
                if let Some(port) =
                    validate_server(file, key, server, &location, &mut index, result, options)
                {
                    ports.entry(port).or_default().push(key);
                }
            }
            check_port_conflicts(file, &ports, result);
        }
        Some(_) => {
            result.add_issue(
                LintIssue::error("E004", "'servers' must be an object", file.to_path_buf())
                    .with_location("servers"),
            );
        }
    }

    if !options.skip_presets {
        if let Some(presets) = root.get("presets") {
            validate_presets(file, presets, &index, result);
        }
    }
}

/// Two servers of one project may not share a fixed port. Port 0 is exempt.
pub fn check_port_conflicts(file: &Path, ports: &HashMap<u16, Vec<&str>>, result: &mut LintResult) {
    let mut conflicts: Vec<_> = ports
        .iter()
        .filter(|(port, servers)| **port != 0 && servers.len() > 1)
        .collect();
    conflicts.sort_by_key(|(port, _)| **port);

    for (port, servers) in conflicts {
        result.add_issue(
            LintIssue::error(
                "E006",
                format!("Port {port} is used by servers: {}", servers.join(", ")),
                file.to_path_buf(),
            )
            .with_location("servers")
            .with_suggestion("Only one of these servers can run at a time; give each its own port"),
        );
    }
}

/// Validate one server. Returns its port when valid.
pub fn validate_server(
    file: &Path,
    key: &str,
    server: &Value,
    location: &str,
    index: &mut TreeIndex,
    result: &mut LintResult,
    options: &LintOptions,
) -> Option<u16> {
    if !server.is_object() {
        result.add_issue(
            LintIssue::error("E004", "Server must be an object", file.to_path_buf())
                .with_location(location),
        );
        return None;
    }

    if let Some(name) = str_field(server, "name") {
        if !name.trim().is_empty() && name.trim() != key {
            result.add_issue(
                LintIssue::warning(
                    "W008",
                    format!("Server name '{name}' differs from its key '{key}'"),
                    file.to_path_buf(),
                )
                .with_location(format!("{location}.name"))
                .with_suggestion("Servers are addressed by key; keep the name and key equal"),
            );
        }
    }

    let (port, ctx) = match server.get("settings") {
        None => (Some(0), ServerContext::default()),
        Some(settings) => validate_settings(file, settings, &format!("{location}.settings"), result),
    };

    let parents_entry = index.servers.entry(key.to_string()).or_default();
    match server.get("parentRoutesHash") {
        None | Some(Value::Null) => {
            result.add_issue(
                LintIssue::warning("W001", "Server has no route parents", file.to_path_buf())
                    .with_location(location),
            );
        }
        Some(Value::Object(parents)) => {
            if parents.is_empty() {
                result.add_issue(
                    LintIssue::warning("W001", "Server has no route parents", file.to_path_buf())
                        .with_location(location),
                );
            }
            for (parent_key, parent) in parents {
                let parent_location = format!("{location}.parentRoutesHash.{parent_key}");
                let routes = validate_parent(
                    file,
                    parent_key,
                    parent,
                    &parent_location,
                    ctx,
                    result,
                    options,
                );
                parents_entry.insert(effective_id(parent, parent_key).to_string(), routes);
            }
        }
        Some(_) => {
            result.add_issue(
                LintIssue::error(
                    "E004",
                    "'parentRoutesHash' must be an object",
                    file.to_path_buf(),
                )
                .with_location(format!("{location}.parentRoutesHash")),
            );
        }
    }

    port
}

fn validate_settings(
    file: &Path,
    settings: &Value,
    location: &str,
    result: &mut LintResult,
) -> (Option<u16>, ServerContext) {
    let port = match settings.get("port") {
        None => {
            result.add_issue(
                LintIssue::error("E005", "Server settings are missing 'port'", file.to_path_buf())
                    .with_location(location)
                    .with_suggestion("Use 0 to let the OS pick a free port"),
            );
            None
        }
        Some(value) => match value.as_u64().and_then(|p| u16::try_from(p).ok()) {
            Some(port) => Some(port),
            None => {
                result.add_issue(
                    LintIssue::error(
                        "E005",
                        format!("Invalid port: {value}"),
                        file.to_path_buf(),
                    )
                    .with_location(format!("{location}.port"))
                    .with_suggestion("Ports are integers between 0 and 65535"),
                );
                None
            }
        },
    };

    let base_url = str_field(settings, "proxyBaseUrl").filter(|u| !u.trim().is_empty());
    if let Some(url) = base_url {
        if !is_http_url(url) {
            result.add_issue(
                LintIssue::error(
                    "E025",
                    format!("proxyBaseUrl must start with http:// or https://: {url}"),
                    file.to_path_buf(),
                )
                .with_location(format!("{location}.proxyBaseUrl")),
            );
        }
    }

    let force_proxy = bool_field(settings, "forceProxy");
    if force_proxy && base_url.is_none() {
        result.add_issue(
            LintIssue::error(
                "E024",
                "forceProxy is enabled but no proxyBaseUrl is set",
                file.to_path_buf(),
            )
            .with_location(format!("{location}.forceProxy"))
            .with_suggestion("Set proxyBaseUrl or disable forceProxy; the server will not start"),
        );
    }

    if let Some(delay) = settings.get("delay") {
        if delay.as_u64().is_none() {
            result.add_issue(
                LintIssue::error(
                    "E026",
                    format!("delay must be a non-negative integer (milliseconds): {delay}"),
                    file.to_path_buf(),
                )
                .with_location(format!("{location}.delay")),
            );
        }
    }

    (
        port,
        ServerContext {
            has_base_url: base_url.is_some(),
            force_proxy,
        },
    )
}

/// Validate a route parent. Returns route id -> response ids.
pub fn validate_parent(
    file: &Path,
    key: &str,
    parent: &Value,
    location: &str,
    ctx: ServerContext,
    result: &mut LintResult,
    options: &LintOptions,
) -> HashMap<String, HashSet<String>> {
    let mut routes = HashMap::new();

    let id = effective_id(parent, key);
    if id != key {
        result.add_issue(
            LintIssue::warning(
                "W008",
                format!("Parent id '{id}' differs from its key '{key}'"),
                file.to_path_buf(),
            )
            .with_location(format!("{location}.id")),
        );
    }

    if let Some(path) = str_field(parent, "path") {
        if !path.is_empty() && !path.starts_with('/') {
            result.add_issue(
                LintIssue::warning(
                    "W006",
                    format!("Parent path '{path}' does not start with '/'"),
                    file.to_path_buf(),
                )
                .with_location(format!("{location}.path")),
            );
        }
    }

    let (hash_key, graphql) = match str_field(parent, "type") {
        Some("Rest") => ("routesHash", false),
        Some("GraphQl") => ("graphQlRouteHash", true),
        other => {
            result.add_issue(
                LintIssue::error(
                    "E007",
                    format!(
                        "Unknown parent type: {}",
                        other.map(|t| format!("'{t}'")).unwrap_or_else(|| "missing".to_string())
                    ),
                    file.to_path_buf(),
                )
                .with_location(format!("{location}.type"))
                .with_suggestion("Use \"Rest\" or \"GraphQl\""),
            );
            return routes;
        }
    };

    let Some(hash) = parent.get(hash_key) else {
        return routes;
    };
    let Some(hash) = hash.as_object() else {
        result.add_issue(
            LintIssue::error(
                "E004",
                format!("'{hash_key}' must be an object"),
                file.to_path_buf(),
            )
            .with_location(format!("{location}.{hash_key}")),
        );
        return routes;
    };

    for (route_key, route) in hash {
        let route_location = format!("{location}.{hash_key}.{route_key}");
        if !route.is_object() {
            result.add_issue(
                LintIssue::error("E004", "Route must be an object", file.to_path_buf())
                    .with_location(route_location),
            );
            continue;
        }
        if graphql {
            validate_graphql_route(file, route, &route_location, result);
        } else {
            validate_rest_route(file, route, &route_location, result);
        }
        let responses = validate_responses(file, route, &route_location, ctx, result, options);
        routes.insert(effective_id(route, route_key).to_string(), responses);
    }

    routes
}

/// Validate the REST-specific fields of a route.
pub fn validate_rest_route(file: &Path, route: &Value, location: &str, result: &mut LintResult) {
    match str_field(route, "routePath") {
        None => {
            result.add_issue(
                LintIssue::error("E008", "Route is missing 'routePath'", file.to_path_buf())
                    .with_location(location),
            );
        }
        Some(path) => {
            if path.chars().any(char::is_whitespace) {
                result.add_issue(
                    LintIssue::error(
                        "E008",
                        format!("routePath contains whitespace: '{path}'"),
                        file.to_path_buf(),
                    )
                    .with_location(format!("{location}.routePath")),
                );
            }

            let mut seen = HashSet::new();
            for capture in path_param_re().captures_iter(path) {
                let name = &capture[1];
                if !seen.insert(name.to_string()) {
                    result.add_issue(
                        LintIssue::warning(
                            "W010",
                            format!("Path parameter ':{name}' appears more than once"),
                            file.to_path_buf(),
                        )
                        .with_location(format!("{location}.routePath"))
                        .with_suggestion("Only the last value is visible to matchers and functions"),
                    );
                }
            }
        }
    }

    match str_field(route, "method") {
        None => {
            result.add_issue(
                LintIssue::error("E009", "Route is missing 'method'", file.to_path_buf())
                    .with_location(location),
            );
        }
        Some(method) if !HTTP_METHODS.contains(&method.trim().to_ascii_uppercase().as_str()) => {
            result.add_issue(
                LintIssue::error(
                    "E009",
                    format!("Unknown HTTP method: '{method}'"),
                    file.to_path_buf(),
                )
                .with_location(format!("{location}.method"))
                .with_suggestion(format!("Use one of: {}", HTTP_METHODS.join(", "))),
            );
        }
        Some(_) => {}
    }

    if let Some(param_type) = str_field(route, "paramType") {
        if !["body", "query", "params"].contains(&param_type) {
            result.add_issue(
                LintIssue::error(
                    "E028",
                    format!("Unknown paramType: '{param_type}'"),
                    file.to_path_buf(),
                )
                .with_location(format!("{location}.paramType"))
                .with_suggestion("Use \"body\", \"query\" or \"params\""),
            );
        }
    }

    check_param_key(file, route, location, result);
}

/// Validate the GraphQL-specific fields of a route.
pub fn validate_graphql_route(file: &Path, route: &Value, location: &str, result: &mut LintResult) {
    if str_field(route, "name")
        .map(|n| n.trim().is_empty())
        .unwrap_or(true)
    {
        result.add_issue(
            LintIssue::error("E023", "GraphQL route is missing 'name'", file.to_path_buf())
                .with_location(location)
                .with_suggestion("Set 'name' to the operation's root field or operation name"),
        );
    }

    match str_field(route, "type") {
        Some("Query") | Some("Mutation") => {}
        other => {
            result.add_issue(
                LintIssue::error(
                    "E022",
                    format!(
                        "GraphQL route type must be Query or Mutation, got {}",
                        other.map(|t| format!("'{t}'")).unwrap_or_else(|| "nothing".to_string())
                    ),
                    file.to_path_buf(),
                )
                .with_location(format!("{location}.type")),
            );
        }
    }

    check_param_key(file, route, location, result);
}

fn check_param_key(file: &Path, route: &Value, location: &str, result: &mut LintResult) {
    if !bool_field(route, "withParams") {
        return;
    }
    if str_field(route, "paramKey")
        .map(|k| k.trim().is_empty())
        .unwrap_or(true)
    {
        result.add_issue(
            LintIssue::warning(
                "W003",
                "withParams is set but 'paramKey' is empty",
                file.to_path_buf(),
            )
            .with_location(format!("{location}.paramKey"))
            .with_suggestion("Without a key the predicate never matches"),
        );
    }
}

/// Validate a route's responses and its active response. Returns response ids.
pub fn validate_responses(
    file: &Path,
    route: &Value,
    location: &str,
    ctx: ServerContext,
    result: &mut LintResult,
    options: &LintOptions,
) -> HashSet<String> {
    let mut ids = HashSet::new();

    match route.get("responsesHash") {
        Some(Value::Object(responses)) if !responses.is_empty() => {
            for (key, response) in responses {
                let response_location = format!("{location}.responsesHash.{key}");
                validate_response(file, response, &response_location, ctx, result, options);
                ids.insert(effective_id(response, key).to_string());
            }
        }
        Some(Value::Object(_)) | None | Some(Value::Null) => {
            result.add_issue(
                LintIssue::warning("W002", "Route has no responses", file.to_path_buf())
                    .with_location(location)
                    .with_suggestion("Add at least one response"),
            );
        }
        Some(_) => {
            result.add_issue(
                LintIssue::error("E004", "'responsesHash' must be an object", file.to_path_buf())
                    .with_location(format!("{location}.responsesHash")),
            );
        }
    }

    let active = str_field(route, "activeResponseId").unwrap_or("");
    if active.is_empty() {
        if !ids.is_empty() && !ctx.force_proxy {
            result.add_issue(
                LintIssue::error("E010", "Route has no activeResponseId", file.to_path_buf())
                    .with_location(format!("{location}.activeResponseId"))
                    .with_suggestion("Requests to this route will fail with a 500"),
            );
        }
    } else if !ids.contains(active) {
        result.add_issue(
            LintIssue::error(
                "E010",
                format!("activeResponseId '{active}' does not match any response"),
                file.to_path_buf(),
            )
            .with_location(format!("{location}.activeResponseId")),
        );
    }

    ids
}

fn validate_response(
    file: &Path,
    response: &Value,
    location: &str,
    ctx: ServerContext,
    result: &mut LintResult,
    options: &LintOptions,
) {
    if !response.is_object() {
        result.add_issue(
            LintIssue::error("E004", "Response must be an object", file.to_path_buf())
                .with_location(location),
        );
        return;
    }

    let block_proxy = bool_field(response, "blockProxy");
    match str_field(response, "type") {
        Some("obj") => match response.get("res") {
            Some(res) if res.is_object() => {
                validate_mock_response(file, res, &format!("{location}.res"), result)
            }
            _ => {
                result.add_issue(
                    LintIssue::error("E012", "obj response is missing 'res'", file.to_path_buf())
                        .with_location(location),
                );
            }
        },
        Some("func") => match str_field(response, "exec") {
            Some(exec) if !exec.trim().is_empty() => {
                validate_function(file, exec, &format!("{location}.exec"), result, options)
            }
            _ => {
                result.add_issue(
                    LintIssue::error(
                        "E013",
                        "func response is missing 'exec'",
                        file.to_path_buf(),
                    )
                    .with_location(location),
                );
            }
        },
        Some("proxy") => {
            match str_field(response, "url").filter(|u| !u.trim().is_empty()) {
                Some(url) if !is_http_url(url) => {
                    result.add_issue(
                        LintIssue::error(
                            "E015",
                            format!("Proxy url must start with http:// or https://: {url}"),
                            file.to_path_buf(),
                        )
                        .with_location(format!("{location}.url")),
                    );
                }
                Some(_) => {}
                None if !ctx.has_base_url && !block_proxy => {
                    result.add_issue(
                        LintIssue::error(
                            "E027",
                            "Proxy response has no 'url' and the server has no proxyBaseUrl",
                            file.to_path_buf(),
                        )
                        .with_location(location),
                    );
                }
                None => {}
            }

            match response.get("res") {
                Some(res) if res.is_object() => {
                    validate_mock_response(file, res, &format!("{location}.res"), result)
                }
                _ if block_proxy => {
                    result.add_issue(
                        LintIssue::warning(
                            "W007",
                            "blockProxy is set on a proxy response without a fallback 'res'",
                            file.to_path_buf(),
                        )
                        .with_location(location)
                        .with_suggestion("Add 'res' so a blocked proxy still has something to serve"),
                    );
                }
                _ => {}
            }
        }
        other => {
            result.add_issue(
                LintIssue::error(
                    "E011",
                    format!(
                        "Unknown response type: {}",
                        other.map(|t| format!("'{t}'")).unwrap_or_else(|| "missing".to_string())
                    ),
                    file.to_path_buf(),
                )
                .with_location(format!("{location}.type"))
                .with_suggestion("Use \"obj\", \"func\" or \"proxy\""),
            );
        }
    }
}

fn validate_function(
    file: &Path,
    exec: &str,
    location: &str,
    result: &mut LintResult,
    options: &LintOptions,
) {
    #[cfg(feature = "javascript")]
    {
        if let Err(e) = js_validator::validate_javascript(exec) {
            result.add_issue(
                LintIssue::error(
                    "E014",
                    format!("Function does not parse: {e}"),
                    file.to_path_buf(),
                )
                .with_location(location),
            );
        }
    }

    if options.verbose && exec.contains("await ") {
        result.add_issue(
            LintIssue::info(
                "I001",
                "Function uses 'await'; asynchronous results are rejected at request time",
                file.to_path_buf(),
            )
            .with_location(location),
        );
    }
}

/// Validate a static mock payload (`res`).
pub fn validate_mock_response(file: &Path, res: &Value, location: &str, result: &mut LintResult) {
    if let Some(code) = res.get("code") {
        let parsed = code
            .as_u64()
            .or_else(|| code.as_str().and_then(|s| s.trim().parse().ok()));
        match parsed {
            Some(code) if !(100..=599).contains(&code) => {
                result.add_issue(
                    LintIssue::error(
                        "E016",
                        format!("Invalid HTTP status code: {code}"),
                        file.to_path_buf(),
                    )
                    .with_location(format!("{location}.code"))
                    .with_suggestion("Use a valid HTTP status code (100-599)"),
                );
            }
            None => {
                result.add_issue(
                    LintIssue::error(
                        "E016",
                        "code must be a number or numeric string",
                        file.to_path_buf(),
                    )
                    .with_location(format!("{location}.code")),
                );
            }
            Some(_) => {}
        }
    }

    if let Some(headers) = res.get("headers") {
        validate_headers(file, headers, &format!("{location}.headers"), result);
    }
}

/// Header names must be HTTP tokens and values must be strings.
pub fn validate_headers(file: &Path, headers: &Value, location: &str, result: &mut LintResult) {
    let Some(headers) = headers.as_object() else {
        result.add_issue(
            LintIssue::error("E021", "Headers must be an object", file.to_path_buf())
                .with_location(location),
        );
        return;
    };

    for (name, value) in headers {
        if !header_name_re().is_match(name) {
            result.add_issue(
                LintIssue::error(
                    "E017",
                    format!("Invalid header name: '{name}'"),
                    file.to_path_buf(),
                )
                .with_location(location),
            );
        }

        let kind = match value {
            Value::String(_) => continue,
            Value::Null => {
                result.add_issue(
                    LintIssue::warning(
                        "W005",
                        format!("Header '{name}' value is null"),
                        file.to_path_buf(),
                    )
                    .with_location(format!("{location}.{name}"))
                    .with_suggestion("Remove the header or set a string value"),
                );
                continue;
            }
            Value::Array(_) => ("E018", "an array"),
            Value::Number(_) => ("E019", "a number"),
            Value::Bool(_) => ("E020", "a boolean"),
            Value::Object(_) => ("E018", "an object"),
        };
        result.add_issue(
            LintIssue::error(
                kind.0,
                format!("Header '{name}' value is {}, must be a string", kind.1),
                file.to_path_buf(),
            )
            .with_location(format!("{location}.{name}"))
            .with_suggestion(format!("Change to: \"{name}\": \"{}\"", display_plain(value))),
        );
    }
}

fn display_plain(value: &Value) -> String {
    match value {
        Value::Array(items) => items
            .iter()
            .map(display_plain)
            .collect::<Vec<_>>()
            .join(", "),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Cross-check preset bindings against the routes found in the tree.
pub fn validate_presets(file: &Path, presets: &Value, index: &TreeIndex, result: &mut LintResult) {
    let Some(folders) = presets.as_object() else {
        result.add_issue(
            LintIssue::error("E004", "'presets' must be an object", file.to_path_buf())
                .with_location("presets"),
        );
        return;
    };

    for (folder_key, folder) in folders {
        let folder_location = format!("presets.{folder_key}");
        let Some(hash) = folder.get("presetsHash").and_then(Value::as_object) else {
            continue;
        };
        for (preset_key, preset) in hash {
            let location = format!("{folder_location}.presetsHash.{preset_key}");
            validate_preset(file, preset, &location, index, result);
        }
    }
}

fn validate_preset(
    file: &Path,
    preset: &Value,
    location: &str,
    index: &TreeIndex,
    result: &mut LintResult,
) {
    let bindings = match preset.get("routes") {
        None | Some(Value::Null) => return,
        Some(Value::Array(bindings)) => bindings,
        Some(_) => {
            result.add_issue(
                LintIssue::error("E004", "Preset 'routes' must be an array", file.to_path_buf())
                    .with_location(format!("{location}.routes")),
            );
            return;
        }
    };

    let mut bound: HashSet<(&str, &str, &str)> = HashSet::new();
    for (idx, binding) in bindings.iter().enumerate() {
        let binding_location = format!("{location}.routes[{idx}]");
        let Some(fields) = binding_fields(binding) else {
            result.add_issue(
                LintIssue::error(
                    "E029",
                    "Preset binding needs serverId, parentId, routeId and responseId",
                    file.to_path_buf(),
                )
                .with_location(binding_location),
            );
            continue;
        };
        let [server, parent, route, response] = fields;

        if let Some(reason) = index.resolve(server, parent, route, response) {
            result.add_issue(
                LintIssue::warning(
                    "W004",
                    format!("Preset binding is skipped when applied: {reason}"),
                    file.to_path_buf(),
                )
                .with_location(binding_location.clone()),
            );
        }

        if !bound.insert((server, parent, route)) {
            result.add_issue(
                LintIssue::warning(
                    "W009",
                    format!("Route '{route}' is bound more than once; the last binding wins"),
                    file.to_path_buf(),
                )
                .with_location(binding_location),
            );
        }
    }
}

fn binding_fields(binding: &Value) -> Option<[&str; 4]> {
    let obj: &Map<String, Value> = binding.as_object()?;
    let field = |key: &str| obj.get(key).and_then(Value::as_str);
    Some([
        field("serverId")?,
        field("parentId")?,
        field("routeId")?,
        field("responseId")?,
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn lint(project: Value) -> LintResult {
        let mut result = LintResult::new();
        validate_project(Path::new("p.json"), &project, &mut result, &LintOptions::default());
        result
    }

    fn server(routes: Value) -> Value {
        json!({
            "name": "api",
            "settings": { "port": 3000 },
            "parentRoutesHash": {
                "users": { "type": "Rest", "id": "users", "path": "/", "routesHash": routes }
            }
        })
    }

    #[test]
    fn test_header_value_kinds() {
        let mut result = LintResult::new();
        validate_headers(
            Path::new("p.json"),
            &json!({"X-A": ["a", "b"], "X-B": 1, "X-C": true, "X-D": null, "bad name": "x"}),
            "res.headers",
            &mut result,
        );
        let mut codes = result.codes();
        codes.sort();
        assert_eq!(codes, vec!["E017", "E018", "E019", "E020", "W005"]);
        assert_eq!(
            result.issues[0].suggestion.as_deref(),
            Some("Change to: \"X-A\": \"a, b\"")
        );
    }

    #[test]
    fn test_status_code_accepts_numeric_strings() {
        let mut result = LintResult::new();
        let file = Path::new("p.json");
        validate_mock_response(file, &json!({"code": "201"}), "res", &mut result);
        assert!(result.issues.is_empty());

        validate_mock_response(file, &json!({"code": 700}), "res", &mut result);
        validate_mock_response(file, &json!({"code": "abc"}), "res", &mut result);
        assert_eq!(result.codes(), vec!["E016", "E016"]);
    }

    #[test]
    fn test_duplicate_path_params() {
        let result = lint(json!({
            "name": "p",
            "servers": { "api": server(json!({
                "r": { "routePath": "/a/:id/b/:id", "method": "get",
                       "activeResponseId": "x",
                       "responsesHash": { "x": { "type": "obj", "res": {} } } }
            })) }
        }));
        assert_eq!(result.codes(), vec!["W010"]);
    }

    #[test]
    fn test_force_proxy_tolerates_missing_active_response() {
        let result = lint(json!({
            "name": "p",
            "servers": { "api": {
                "settings": { "port": 0, "forceProxy": true, "proxyBaseUrl": "http://up" },
                "parentRoutesHash": { "users": { "type": "Rest", "routesHash": {
                    "r": { "routePath": "/a", "method": "GET",
                           "responsesHash": { "x": { "type": "proxy" } } }
                } } }
            } }
        }));
        assert!(result.issues.is_empty(), "{:?}", result.issues);
    }

    #[test]
    fn test_tree_index_reasons() {
        let mut index = TreeIndex::default();
        index
            .servers
            .entry("api".into())
            .or_default()
            .entry("users".into())
            .or_default()
            .entry("list".into())
            .or_default()
            .insert("ok".into());

        assert!(index.resolve("api", "users", "list", "ok").is_none());
        assert!(index
            .resolve("web", "users", "list", "ok")
            .unwrap()
            .contains("server 'web'"));
        assert!(index
            .resolve("api", "users", "list", "gone")
            .unwrap()
            .contains("response 'gone'"));
    }

    #[cfg(feature = "javascript")]
    #[test]
    fn test_function_syntax() {
        assert!(js_validator::validate_javascript("return { code: 200 };").is_ok());
        assert!(js_validator::validate_javascript("function (req) { return 1; }").is_ok());
        assert!(js_validator::validate_javascript("return {").is_err());
    }
}
