#![allow(dead_code)]

use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response};
use hyper_util::rt::TokioIo;
use mockyard::config::AppSettings;
use mockyard::project::ProjectTree;
use mockyard::FleetManager;
use std::convert::Infallible;
use std::net::SocketAddr;
use tokio::net::TcpListener;

/// A shop project: REST routes with a parameter route, a GraphQL parent,
/// a proxied route and one preset.
pub const SHOP_PROJECT: &str = r#"{
  "name": "shop",
  "servers": {
    "api": {
      "name": "api",
      "settings": { "port": 0 },
      "parentRoutesHash": {
        "catalog": {
          "type": "Rest",
          "id": "catalog",
          "name": "Catalog",
          "path": "/",
          "routesHash": {
            "items": {
              "id": "items",
              "routePath": "/items",
              "method": "GET",
              "activeResponseId": "list",
              "responsesHash": {
                "list": { "id": "list", "type": "obj",
                          "res": { "code": 200, "data": [{"sku": "a"}] } },
                "empty": { "id": "empty", "type": "obj",
                           "res": { "code": 200, "data": [] } },
                "script": { "id": "script", "type": "func",
                            "exec": "return { code: 202, headers: { 'x-script': 'yes' }, data: { method: req.method, q: req.query.q } };" }
              }
            },
            "vip-item": {
              "id": "vip-item",
              "routePath": "/item",
              "method": "POST",
              "withParams": true,
              "paramType": "body",
              "paramKey": "customer.tier",
              "paramValue": "gold",
              "activeResponseId": "vip",
              "responsesHash": {
                "vip": { "id": "vip", "type": "obj", "res": { "code": 200, "data": "vip" } }
              }
            },
            "item": {
              "id": "item",
              "routePath": "/item",
              "method": "POST",
              "activeResponseId": "regular",
              "responsesHash": {
                "regular": { "id": "regular", "type": "obj", "res": { "code": 201, "data": "regular" } }
              }
            },
            "upstream": {
              "id": "upstream",
              "routePath": "/live",
              "method": "GET",
              "activeResponseId": "fwd",
              "responsesHash": {
                "fwd": { "id": "fwd", "type": "proxy" }
              }
            }
          }
        },
        "gql": {
          "type": "GraphQl",
          "id": "gql",
          "name": "GraphQL",
          "path": "/graphql",
          "graphQlRouteHash": {
            "cart": {
              "id": "cart",
              "name": "cart",
              "type": "Query",
              "activeResponseId": "cart-ok",
              "responsesHash": {
                "cart-ok": { "id": "cart-ok", "type": "obj",
                             "res": { "code": 200, "data": { "data": { "cart": { "total": 3 } } } } }
              }
            }
          }
        }
      }
    }
  },
  "presets": {
    "demo": {
      "name": "demo",
      "presetsHash": {
        "no-items": {
          "name": "no-items",
          "routes": [
            { "serverId": "api", "parentId": "catalog", "routeId": "items", "responseId": "empty" }
          ]
        }
      }
    }
  }
}"#;

pub fn shop_tree() -> ProjectTree {
    serde_json::from_str(SHOP_PROJECT).unwrap()
}

pub fn settings() -> AppSettings {
    AppSettings {
        host_ip_poll_secs: 0,
        proxy_timeout_secs: 2,
        bind_host: "127.0.0.1".to_string(),
        ..AppSettings::default()
    }
}

pub async fn shop_fleet() -> FleetManager {
    let fleet = FleetManager::new(settings()).unwrap();
    fleet.load_tree(shop_tree()).await.unwrap();
    fleet
}

pub fn free_port() -> u16 {
    std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

/// An upstream that echoes the request target and sets two `session`
/// cookies plus one `theme` cookie.
pub async fn spawn_upstream() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            tokio::spawn(async move {
                let service = service_fn(|req: Request<Incoming>| async move {
                    let target = match req.uri().query() {
                        Some(q) => format!("{}?{}", req.uri().path(), q),
                        None => req.uri().path().to_string(),
                    };
                    let response = Response::builder()
                        .status(200)
                        .header("set-cookie", "session=abc; Path=/; Domain=upstream.example")
                        .header("set-cookie", "theme=dark")
                        .header("set-cookie", "session=def; Path=/")
                        .body(Full::new(Bytes::from(format!("upstream {target}"))))
                        .unwrap();
                    Ok::<_, Infallible>(response)
                });
                let _ = http1::Builder::new()
                    .serve_connection(TokioIo::new(stream), service)
                    .await;
            });
        }
    });
    addr
}
