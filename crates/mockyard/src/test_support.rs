//! Shared fixtures for unit tests.

use crate::project::ProjectTree;

/// A small project exercising REST, GraphQL, parameter routes and presets.
pub(crate) const DEMO_PROJECT: &str = r#"{
  "name": "demo",
  "servers": {
    "api": {
      "name": "api",
      "settings": { "port": 0 },
      "parentRoutesHash": {
        "users": {
          "type": "Rest",
          "id": "users",
          "name": "Users",
          "path": "/api",
          "routesHash": {
            "list": {
              "id": "list",
              "routePath": "/users",
              "method": "GET",
              "activeResponseId": "ok",
              "responsesHash": {
                "ok": { "id": "ok", "name": "OK", "type": "obj",
                        "res": { "code": 200, "data": [{"id": 1}], "headers": {} } },
                "empty": { "id": "empty", "name": "Empty", "type": "obj",
                           "res": { "code": "200", "data": [] } },
                "fn": { "id": "fn", "name": "Func", "type": "func",
                        "exec": "return { code: 201, data: { path: req.path } };" },
                "px": { "id": "px", "name": "Upstream", "type": "proxy" }
              }
            },
            "admin": {
              "id": "admin",
              "routePath": "/user",
              "method": "get",
              "withParams": true,
              "paramType": "query",
              "paramKey": "role",
              "paramValue": "admin",
              "activeResponseId": "admin-res",
              "responsesHash": {
                "admin-res": { "id": "admin-res", "type": "obj",
                               "res": { "code": 200, "data": "admin" } }
              }
            },
            "plain": {
              "id": "plain",
              "routePath": "/user/",
              "method": "GET",
              "activeResponseId": "plain-res",
              "responsesHash": {
                "plain-res": { "id": "plain-res", "type": "obj",
                               "res": { "code": 200, "data": "plain" } }
              }
            }
          }
        },
        "gql": {
          "type": "GraphQl",
          "id": "gql",
          "name": "Graph",
          "graphQlRouteHash": {
            "get-user": {
              "id": "get-user",
              "name": "user",
              "type": "Query",
              "activeResponseId": "u1",
              "responsesHash": {
                "u1": { "id": "u1", "type": "obj",
                        "res": { "code": 200, "data": { "data": { "user": { "id": "1" } } } } }
              }
            },
            "create-user": {
              "id": "create-user",
              "name": "createUser",
              "type": "Mutation",
              "activeResponseId": "c1",
              "responsesHash": {
                "c1": { "id": "c1", "type": "obj",
                        "res": { "code": 200, "data": { "data": { "createUser": true } } } }
              }
            }
          }
        }
      }
    }
  },
  "presets": {
    "qa": {
      "name": "qa",
      "presetsHash": {
        "empty-list": {
          "name": "empty-list",
          "routes": [
            { "serverId": "api", "parentId": "users", "routeId": "list", "responseId": "empty" },
            { "serverId": "api", "parentId": "users", "routeId": "list", "responseId": "missing" },
            { "serverId": "ghost", "parentId": "users", "routeId": "list", "responseId": "ok" }
          ]
        }
      }
    }
  }
}"#;

pub(crate) fn demo_tree() -> ProjectTree {
    let mut tree: ProjectTree = serde_json::from_str(DEMO_PROJECT).expect("demo project parses");
    tree.normalize();
    tree
}
