//! Project configuration tree.
//!
//! The tree is consumed fully formed: servers keyed by name, route parents and
//! routes keyed by id, presets grouped in folders. All hashes are `IndexMap`s,
//! so iteration follows configuration order, which the matcher relies on.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Servers of a project, keyed by server name.
pub type ServersHash = IndexMap<String, ProjectServer>;
/// Preset folders of a project, keyed by folder name.
pub type PresetsFolderHash = IndexMap<String, PresetsFolder>;

/// Generate an id for a newly created entity.
pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// The whole configuration of one project.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectTree {
    pub name: String,
    #[serde(default)]
    pub servers: ServersHash,
    #[serde(default)]
    pub presets: PresetsFolderHash,
}

impl ProjectTree {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Re-key every hash by the id (or name) its entry carries, filling missing
    /// ids from the key they were stored under.
    pub fn normalize(&mut self) {
        let servers = std::mem::take(&mut self.servers);
        for (key, mut server) in servers {
            if server.name.is_empty() {
                server.name = key;
            }
            server.normalize();
            self.servers.insert(server.name.clone(), server);
        }

        let folders = std::mem::take(&mut self.presets);
        for (key, mut folder) in folders {
            if folder.name.is_empty() {
                folder.name = key;
            }
            let presets = std::mem::take(&mut folder.presets_hash);
            for (preset_key, mut preset) in presets {
                if preset.name.is_empty() {
                    preset.name = preset_key;
                }
                folder.presets_hash.insert(preset.name.clone(), preset);
            }
            self.presets.insert(folder.name.clone(), folder);
        }
    }
}

/// One mock server of a project.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectServer {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub settings: ServerSettings,
    #[serde(default)]
    pub parent_routes_hash: IndexMap<String, RouteParent>,
}

impl ProjectServer {
    pub fn new(name: impl Into<String>, settings: ServerSettings) -> Self {
        Self {
            name: name.into(),
            settings,
            parent_routes_hash: IndexMap::new(),
        }
    }

    pub fn parent(&self, parent_id: &str) -> Option<&RouteParent> {
        self.parent_routes_hash.get(parent_id)
    }

    /// Look up a REST route or GraphQL route under the given parent.
    pub fn route(&self, parent_id: &str, route_id: &str) -> Option<RouteRef<'_>> {
        match self.parent(parent_id)? {
            RouteParent::Rest(p) => p.routes_hash.get(route_id).map(RouteRef::Rest),
            RouteParent::GraphQl(p) => p.graph_ql_route_hash.get(route_id).map(RouteRef::GraphQl),
        }
    }

    pub(crate) fn normalize(&mut self) {
        let parents = std::mem::take(&mut self.parent_routes_hash);
        for (key, mut parent) in parents {
            parent.normalize(&key);
            self.parent_routes_hash.insert(parent.id().to_string(), parent);
        }
    }
}

fn fill_id(id: &mut String, key: &str) {
    if id.is_empty() {
        *id = if key.is_empty() { new_id() } else { key.to_string() };
    }
}

fn rekey<R>(
    routes: &mut IndexMap<String, R>,
    route_id: impl Fn(&mut R) -> &mut String,
    responses: impl Fn(&mut R) -> &mut IndexMap<String, RouteResponse>,
) {
    let taken = std::mem::take(routes);
    for (key, mut route) in taken {
        fill_id(route_id(&mut route), &key);
        rekey_responses(responses(&mut route));
        let id = route_id(&mut route).clone();
        routes.insert(id, route);
    }
}

/// Re-key a responses hash by response id. Entries without an id take
/// their key, or a fresh id when the key is empty too.
pub(crate) fn rekey_responses(hash: &mut IndexMap<String, RouteResponse>) {
    let taken = std::mem::take(hash);
    for (key, mut response) in taken {
        fill_id(&mut response.id, &key);
        hash.insert(response.id.clone(), response);
    }
}

/// Per-server settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerSettings {
    pub port: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy_base_url: Option<String>,
    #[serde(default)]
    pub force_proxy: bool,
    /// Delay applied to every response, in milliseconds.
    #[serde(default)]
    pub delay: u64,
    #[serde(default, rename = "reWriteCookieDomain")]
    pub rewrite_cookie_domain: bool,
    #[serde(default)]
    pub simplify_cookies: bool,
    #[serde(default)]
    pub duplicate_cookies: DuplicateCookies,
}

impl ServerSettings {
    pub fn with_port(port: u16) -> Self {
        Self {
            port,
            ..Default::default()
        }
    }

    /// The configured upstream base URL, ignoring blank values.
    pub fn proxy_base(&self) -> Option<&str> {
        self.proxy_base_url
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

/// Cookie duplication rule.
///
/// `true` duplicates every cookie as `<name>-mock`; a list of `{from, to}`
/// pairs duplicates only the named cookies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DuplicateCookies {
    Flag(bool),
    Rules(Vec<CookieRename>),
}

impl Default for DuplicateCookies {
    fn default() -> Self {
        DuplicateCookies::Flag(false)
    }
}

impl DuplicateCookies {
    pub fn is_enabled(&self) -> bool {
        match self {
            DuplicateCookies::Flag(on) => *on,
            DuplicateCookies::Rules(rules) => !rules.is_empty(),
        }
    }

    /// Alternate names a cookie called `name` should be duplicated under.
    pub fn alternate_names(&self, name: &str) -> Vec<String> {
        match self {
            DuplicateCookies::Flag(true) => vec![format!("{name}-mock")],
            DuplicateCookies::Flag(false) => Vec::new(),
            DuplicateCookies::Rules(rules) => rules
                .iter()
                .filter(|r| r.from == name && r.to != name)
                .map(|r| r.to.clone())
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CookieRename {
    pub from: String,
    pub to: String,
}

/// A group of routes sharing a path prefix (REST) or an endpoint (GraphQL).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum RouteParent {
    Rest(RestParent),
    GraphQl(GraphQlParent),
}

impl RouteParent {
    /// Fill a missing id from `key` and re-key the child hashes.
    pub(crate) fn normalize(&mut self, key: &str) {
        match self {
            RouteParent::Rest(p) => {
                fill_id(&mut p.id, key);
                rekey(&mut p.routes_hash, |r| &mut r.id, |r| &mut r.responses_hash);
            }
            RouteParent::GraphQl(p) => {
                fill_id(&mut p.id, key);
                rekey(
                    &mut p.graph_ql_route_hash,
                    |r| &mut r.id,
                    |r| &mut r.responses_hash,
                );
            }
        }
    }

    pub fn id(&self) -> &str {
        match self {
            RouteParent::Rest(p) => &p.id,
            RouteParent::GraphQl(p) => &p.id,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            RouteParent::Rest(p) => &p.name,
            RouteParent::GraphQl(p) => &p.name,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            RouteParent::Rest(_) => "Rest",
            RouteParent::GraphQl(_) => "GraphQl",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RestParent {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    /// Prefix joined with every child route's path.
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub routes_hash: IndexMap<String, Route>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphQlParent {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default = "default_graphql_path")]
    pub path: String,
    #[serde(default)]
    pub graph_ql_route_hash: IndexMap<String, GraphQlRoute>,
}

fn default_graphql_path() -> String {
    "/graphql".to_string()
}

impl Default for GraphQlParent {
    fn default() -> Self {
        Self {
            id: String::new(),
            name: String::new(),
            path: default_graphql_path(),
            graph_ql_route_hash: IndexMap::new(),
        }
    }
}

/// Where a route's parameter predicate looks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    Body,
    #[default]
    Query,
    Params,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Route {
    #[serde(default)]
    pub id: String,
    pub route_path: String,
    pub method: String,
    #[serde(default)]
    pub with_params: bool,
    #[serde(default)]
    pub param_type: ParamType,
    #[serde(default)]
    pub param_key: String,
    #[serde(default)]
    pub param_value: String,
    #[serde(default)]
    pub active_response_id: String,
    #[serde(default)]
    pub responses_hash: IndexMap<String, RouteResponse>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GraphQlOperationType {
    Query,
    Mutation,
}

impl std::fmt::Display for GraphQlOperationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GraphQlOperationType::Query => write!(f, "Query"),
            GraphQlOperationType::Mutation => write!(f, "Mutation"),
        }
    }
}

/// A GraphQL operation handler, keyed by root field name and operation type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphQlRoute {
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub operation: GraphQlOperationType,
    #[serde(default)]
    pub with_params: bool,
    #[serde(default)]
    pub param_key: String,
    #[serde(default)]
    pub param_value: String,
    #[serde(default)]
    pub active_response_id: String,
    #[serde(default)]
    pub responses_hash: IndexMap<String, GraphQlRouteResponse>,
}

pub type GraphQlRouteResponse = RouteResponse;

/// A route of either kind, as submitted for upsert. REST routes carry
/// `routePath` and `method`; GraphQL routes carry `name` and `type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RouteEntity {
    Rest(Route),
    GraphQl(GraphQlRoute),
}

impl RouteEntity {
    pub fn kind_name(&self) -> &'static str {
        match self {
            RouteEntity::Rest(_) => "Rest",
            RouteEntity::GraphQl(_) => "GraphQl",
        }
    }
}

/// Borrowed view over either kind of route.
#[derive(Debug, Clone, Copy)]
pub enum RouteRef<'a> {
    Rest(&'a Route),
    GraphQl(&'a GraphQlRoute),
}

impl<'a> RouteRef<'a> {
    pub fn id(&self) -> &'a str {
        match self {
            RouteRef::Rest(r) => &r.id,
            RouteRef::GraphQl(r) => &r.id,
        }
    }

    pub fn active_response_id(&self) -> &'a str {
        match self {
            RouteRef::Rest(r) => &r.active_response_id,
            RouteRef::GraphQl(r) => &r.active_response_id,
        }
    }

    pub fn responses(&self) -> &'a IndexMap<String, RouteResponse> {
        match self {
            RouteRef::Rest(r) => &r.responses_hash,
            RouteRef::GraphQl(r) => &r.responses_hash,
        }
    }

    pub fn response(&self, response_id: &str) -> Option<&'a RouteResponse> {
        self.responses().get(response_id)
    }
}

/// One candidate response of a route.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteResponse {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(flatten)]
    pub kind: ResponseKind,
    #[serde(default)]
    pub block_proxy: bool,
}

impl RouteResponse {
    pub fn obj(id: impl Into<String>, res: MockResponse) -> Self {
        Self {
            id: id.into(),
            name: String::new(),
            kind: ResponseKind::Obj { res },
            block_proxy: false,
        }
    }

    pub fn func(id: impl Into<String>, exec: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: String::new(),
            kind: ResponseKind::Func { exec: exec.into() },
            block_proxy: false,
        }
    }

    pub fn proxy(id: impl Into<String>, url: Option<String>) -> Self {
        Self {
            id: id.into(),
            name: String::new(),
            kind: ResponseKind::Proxy { url, res: None },
            block_proxy: false,
        }
    }

    pub fn blocking_proxy(mut self) -> Self {
        self.block_proxy = true;
        self
    }
}

/// Response payload, tagged by `type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ResponseKind {
    Obj {
        res: MockResponse,
    },
    Func {
        exec: String,
    },
    Proxy {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        url: Option<String>,
        /// Fallback body served when proxying is blocked.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        res: Option<MockResponse>,
    },
}

/// Static mock payload: status code, body and headers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MockResponse {
    #[serde(default = "default_code", deserialize_with = "deserialize_status_code")]
    pub code: u16,
    #[serde(default)]
    pub data: Value,
    #[serde(default)]
    pub headers: IndexMap<String, String>,
}

impl MockResponse {
    pub fn new(code: u16, data: Value) -> Self {
        Self {
            code,
            data,
            headers: IndexMap::new(),
        }
    }
}

fn default_code() -> u16 {
    200
}

/// Accept `200` as well as `"200"`.
pub(crate) fn deserialize_status_code<'de, D>(deserializer: D) -> Result<u16, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de::Error;
    let value = Value::deserialize(deserializer)?;
    match value {
        Value::Number(n) => n
            .as_u64()
            .and_then(|n| u16::try_from(n).ok())
            .ok_or_else(|| D::Error::custom("invalid status code number")),
        Value::String(s) => s
            .trim()
            .parse::<u16>()
            .map_err(|_| D::Error::custom(format!("invalid status code string: {s}"))),
        _ => Err(D::Error::custom("code must be a number or string")),
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresetsFolder {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub presets_hash: IndexMap<String, Preset>,
}

/// A named set of route-to-response bindings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Preset {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub routes: Vec<PresetRoute>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresetRoute {
    pub server_id: String,
    pub parent_id: String,
    pub route_id: String,
    pub response_id: String,
}
