use super::*;
use crate::test_support::demo_tree;
use serde_json::json;

#[test]
fn test_demo_tree_preserves_configuration_order() {
    let tree = demo_tree();
    let server = &tree.servers["api"];
    let parents: Vec<&str> = server.parent_routes_hash.keys().map(String::as_str).collect();
    assert_eq!(parents, vec!["users", "gql"]);

    let RouteParent::Rest(users) = &server.parent_routes_hash["users"] else {
        panic!("expected a REST parent");
    };
    let routes: Vec<&str> = users.routes_hash.keys().map(String::as_str).collect();
    assert_eq!(routes, vec!["list", "admin", "plain"]);
}

#[test]
fn test_status_code_accepts_string() {
    let tree = demo_tree();
    let route = tree.servers["api"].route("users", "list").unwrap();
    match &route.response("empty").unwrap().kind {
        ResponseKind::Obj { res } => assert_eq!(res.code, 200),
        other => panic!("unexpected kind {other:?}"),
    }
}

#[test]
fn test_graphql_parent_defaults_path() {
    let tree = demo_tree();
    let RouteParent::GraphQl(gql) = &tree.servers["api"].parent_routes_hash["gql"] else {
        panic!("expected a GraphQL parent");
    };
    assert_eq!(gql.path, "/graphql");
    assert_eq!(gql.graph_ql_route_hash["get-user"].operation, GraphQlOperationType::Query);
}

#[test]
fn test_response_kind_serializes_with_type_tag() {
    let response = RouteResponse::proxy("p", Some("http://upstream".to_string())).blocking_proxy();
    let value = serde_json::to_value(&response).unwrap();
    assert_eq!(
        value,
        json!({"id": "p", "name": "", "type": "proxy", "url": "http://upstream", "blockProxy": true})
    );

    let back: RouteResponse = serde_json::from_value(value).unwrap();
    assert_eq!(back, response);
}

#[test]
fn test_duplicate_cookies_accepts_flag_and_rules() {
    let flag: ServerSettings =
        serde_json::from_value(json!({"port": 1, "duplicateCookies": true})).unwrap();
    assert_eq!(flag.duplicate_cookies.alternate_names("sid"), vec!["sid-mock"]);

    let rules: ServerSettings = serde_json::from_value(json!({
        "port": 1,
        "duplicateCookies": [{"from": "sid", "to": "session"}]
    }))
    .unwrap();
    assert_eq!(rules.duplicate_cookies.alternate_names("sid"), vec!["session"]);
    assert!(rules.duplicate_cookies.alternate_names("other").is_empty());

    let off = ServerSettings::default();
    assert!(!off.duplicate_cookies.is_enabled());
}

#[test]
fn test_settings_field_names() {
    let settings: ServerSettings = serde_json::from_value(json!({
        "port": 4000,
        "proxyBaseUrl": "  ",
        "reWriteCookieDomain": true,
        "simplifyCookies": true,
        "delay": 25
    }))
    .unwrap();
    assert!(settings.rewrite_cookie_domain);
    assert!(settings.simplify_cookies);
    assert_eq!(settings.delay, 25);
    assert_eq!(settings.proxy_base(), None);
}

#[test]
fn test_normalize_fills_ids_from_keys() {
    let mut tree: ProjectTree = serde_json::from_value(json!({
        "name": "p",
        "servers": {
            "s": {
                "settings": {"port": 1},
                "parentRoutesHash": {
                    "p1": {
                        "type": "Rest",
                        "routesHash": {
                            "r1": {
                                "routePath": "/x",
                                "method": "GET",
                                "responsesHash": {
                                    "a": {"type": "obj", "res": {"code": 204}}
                                }
                            }
                        }
                    }
                }
            }
        }
    }))
    .unwrap();
    tree.normalize();

    let server = &tree.servers["s"];
    assert_eq!(server.name, "s");
    let route = server.route("p1", "r1").unwrap();
    assert_eq!(route.id(), "r1");
    assert_eq!(route.response("a").unwrap().id, "a");
}
