use super::*;
use crate::commands::{dispatch, EngineCommand};
use crate::config::AppSettings;
use crate::error::EngineError;
use crate::events::EngineEvent;
use crate::presets::{AppliedPresetEffect, PresetFileAction};
use crate::project::{
    GraphQlOperationType, GraphQlRoute, Preset, PresetRoute, ProjectServer, Route, RouteEntity,
    RouteKey, ServerSettings,
};
use crate::server::ServerState;
use crate::test_support::demo_tree;
use serde_json::json;
use serial_test::serial;
use std::sync::Arc;
use std::time::Duration;

fn settings() -> AppSettings {
    AppSettings {
        host_ip_poll_secs: 0,
        proxy_timeout_secs: 2,
        bind_host: "127.0.0.1".to_string(),
        ..AppSettings::default()
    }
}

async fn fleet() -> FleetManager {
    let fleet = FleetManager::new(settings()).unwrap();
    fleet.load_tree(demo_tree()).await.unwrap();
    fleet
}

fn free_port() -> u16 {
    std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

#[tokio::test]
async fn test_load_project_publishes_init() {
    let fleet = FleetManager::new(settings()).unwrap();
    let mut events = fleet.subscribe();
    assert_eq!(
        fleet.load_project("demo").await.unwrap_err(),
        EngineError::ProjectNotLoaded("demo".to_string())
    );

    fleet.load_tree(demo_tree()).await.unwrap();
    assert_eq!(fleet.active_project().as_deref(), Some("demo"));
    match events.recv().await.unwrap() {
        EngineEvent::Init(init) => {
            assert_eq!(init.projects_name_list, vec!["demo".to_string()]);
            assert_eq!(init.is_server_up.get("api"), Some(&false));
            assert!(!init.has_diffs);
        }
        other => panic!("unexpected event {}", other.kind()),
    }
}

#[tokio::test]
async fn test_switching_projects_keeps_edits_and_stops_servers() {
    let fleet = fleet().await;
    fleet.start_server("api").await.unwrap();
    fleet
        .create_server(ProjectServer::new("extra", ServerSettings::with_port(0)))
        .await
        .unwrap();
    let api = fleet.instance("api").unwrap();

    let mut other = crate::project::ProjectTree::new("other");
    other.servers.insert(
        "web".to_string(),
        ProjectServer::new("web", ServerSettings::with_port(0)),
    );
    fleet.load_tree(other).await.unwrap();
    assert_eq!(api.state(), ServerState::Stopped);
    assert_eq!(fleet.project_names(), vec!["demo", "other"]);

    fleet.load_project("demo").await.unwrap();
    assert!(fleet.snapshot().unwrap().tree.servers.contains_key("extra"));
}

#[tokio::test]
async fn test_create_and_delete_server() {
    let fleet = fleet().await;
    let err = fleet
        .create_server(ProjectServer::new("api", ServerSettings::with_port(0)))
        .await
        .unwrap_err();
    assert_eq!(err, EngineError::ServerExists("api".to_string()));

    fleet
        .create_server(ProjectServer::new("web", ServerSettings::with_port(0)))
        .await
        .unwrap();
    assert!(fleet.has_diffs());
    let port = fleet.start_server("web").await.unwrap();
    assert_ne!(port, 0);

    fleet.delete_server("web").await.unwrap();
    assert!(fleet.instance("web").is_err());
    assert!(reqwest::get(format!("http://127.0.0.1:{port}/"))
        .await
        .is_err());
}

#[tokio::test]
#[serial]
async fn test_port_conflict_leaves_first_server_running() {
    let fleet = fleet().await;
    let port = free_port();
    fleet
        .update_server_settings("api", ServerSettings::with_port(port))
        .await
        .unwrap();
    fleet
        .create_server(ProjectServer::new("twin", ServerSettings::with_port(port)))
        .await
        .unwrap();

    assert_eq!(fleet.start_server("api").await.unwrap(), port);
    let err = fleet.start_server("twin").await.unwrap_err();
    assert_eq!(
        err,
        EngineError::PortConflict {
            port,
            owner: "api".to_string()
        }
    );
    assert_eq!(fleet.instance("api").unwrap().state(), ServerState::Running);
    assert_eq!(fleet.instance("twin").unwrap().state(), ServerState::Stopped);

    let response = reqwest::get(format!("http://127.0.0.1:{port}/api/users"))
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    fleet.close_all().await.unwrap();
}

#[tokio::test]
async fn test_force_proxy_without_base_url_fails_start() {
    let fleet = fleet().await;
    let settings = ServerSettings {
        force_proxy: true,
        ..ServerSettings::with_port(0)
    };
    fleet.update_server_settings("api", settings).await.unwrap();

    let err = fleet.start_server("api").await.unwrap_err();
    assert_eq!(err.code(), "PROXY_MISCONFIGURED");
    let instance = fleet.instance("api").unwrap();
    assert_eq!(instance.state(), ServerState::Error);
    assert!(instance.last_error().is_some());
}

#[tokio::test]
async fn test_settings_change_restarts_running_server() {
    let fleet = fleet().await;
    let first = fleet.start_server("api").await.unwrap();
    let target = free_port();

    let restarted = fleet
        .update_server_settings("api", ServerSettings::with_port(target))
        .await
        .unwrap();
    assert_eq!(restarted, Some(target));
    assert_ne!(first, target);
    assert_eq!(fleet.instance("api").unwrap().bound_port(), Some(target));
    fleet.close_server("api").await.unwrap();
}

#[tokio::test]
async fn test_apply_and_clear_preset() {
    let fleet = fleet().await;
    let mut events = fleet.subscribe();

    let result = fleet.apply_preset("qa", "empty-list").await.unwrap();
    assert_eq!(result.applied_count, 1);
    assert_eq!(result.skipped.len(), 2);
    let snapshot = fleet.snapshot().unwrap();
    assert_eq!(
        snapshot.overrides.response_for("api", "users", "list"),
        Some("empty")
    );
    // The tree itself is untouched.
    assert!(!fleet.has_diffs());
    assert_eq!(
        snapshot.server("api").unwrap().route("users", "list").unwrap().active_response_id(),
        "ok"
    );
    assert!(matches!(
        events.recv().await.unwrap(),
        EngineEvent::PresetApplied { .. }
    ));

    let again = fleet.apply_preset("qa", "empty-list").await.unwrap();
    assert_eq!(again.applied_count, result.applied_count);
    assert_eq!(again.skipped, result.skipped);
    assert!(again.changes.is_empty());

    let changes = fleet.clear_preset().await.unwrap();
    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0].to_response_id.as_deref(), Some("ok"));
    assert!(fleet.snapshot().unwrap().overrides.is_empty());
}

#[tokio::test]
async fn test_apply_unknown_preset() {
    let fleet = fleet().await;
    assert_eq!(
        fleet.apply_preset("nope", "x").await.unwrap_err(),
        EngineError::FolderNotFound("nope".to_string())
    );
    assert!(matches!(
        fleet.apply_preset("qa", "x").await.unwrap_err(),
        EngineError::PresetNotFound { .. }
    ));
}

#[tokio::test]
async fn test_deleting_applied_preset_clears_overrides() {
    let fleet = fleet().await;
    fleet.apply_preset("qa", "empty-list").await.unwrap();

    let effect = fleet
        .update_preset_file(PresetFileAction::DeletePreset {
            folder_name: "qa".to_string(),
            preset_name: "empty-list".to_string(),
        })
        .await
        .unwrap();
    assert_eq!(effect, AppliedPresetEffect::Removed);
    let snapshot = fleet.snapshot().unwrap();
    assert!(snapshot.overrides.is_empty());
    assert!(snapshot.overrides.applied.is_none());
    assert!(fleet.has_diffs());
}

#[tokio::test]
async fn test_route_crud() {
    let fleet = fleet().await;

    let route = Route {
        route_path: "/health".to_string(),
        method: "GET".to_string(),
        ..Route::default()
    };
    let id = fleet
        .upsert_route("api", "users", RouteEntity::Rest(route))
        .await
        .unwrap();
    assert!(!id.is_empty());
    assert!(fleet.snapshot().unwrap().server("api").unwrap().route("users", &id).is_some());

    let gql = GraphQlRoute {
        id: String::new(),
        name: "health".to_string(),
        operation: GraphQlOperationType::Query,
        with_params: false,
        param_key: String::new(),
        param_value: String::new(),
        active_response_id: String::new(),
        responses_hash: Default::default(),
    };
    let err = fleet
        .upsert_route("api", "users", RouteEntity::GraphQl(gql))
        .await
        .unwrap_err();
    assert_eq!(
        err,
        EngineError::ParentTypeMismatch {
            parent: "users".to_string(),
            actual: "Rest".to_string()
        }
    );

    fleet.delete_route("api", "users", &id).await.unwrap();
    assert_eq!(
        fleet.delete_route("api", "users", &id).await.unwrap_err(),
        EngineError::RouteNotFound(id)
    );
}

#[tokio::test]
async fn test_deleting_route_prunes_its_override() {
    let fleet = fleet().await;
    fleet.apply_preset("qa", "empty-list").await.unwrap();
    fleet.delete_route("api", "users", "list").await.unwrap();

    let snapshot = fleet.snapshot().unwrap();
    assert!(!snapshot
        .overrides
        .bindings
        .contains_key(&RouteKey::new("api", "users", "list")));
    // The preset stays applied for its remaining bindings.
    assert!(snapshot.overrides.applied.is_some());
}

#[tokio::test]
async fn test_active_response_and_mark_saved() {
    let fleet = fleet().await;
    assert_eq!(
        fleet
            .set_active_response("api", "users", "list", "missing")
            .await
            .unwrap_err(),
        EngineError::ResponseNotFound("missing".to_string())
    );
    assert!(!fleet.has_diffs());

    fleet
        .set_active_response("api", "users", "list", "empty")
        .await
        .unwrap();
    assert!(fleet.has_diffs());
    fleet.mark_saved().await.unwrap();
    assert!(!fleet.has_diffs());
}

#[tokio::test]
async fn test_host_ip_change_is_published_once() {
    let fleet = fleet().await;
    let mut events = fleet.subscribe();

    assert!(fleet.observe_host_ip("10.0.0.1").is_none());
    assert!(fleet.observe_host_ip("10.0.0.1").is_none());
    let change = fleet.observe_host_ip("10.0.0.2").unwrap();
    assert_eq!(change.previous.as_deref(), Some("10.0.0.1"));
    assert_eq!(fleet.host_ip().as_deref(), Some("10.0.0.2"));

    match events.recv().await.unwrap() {
        EngineEvent::HostIpChanged { previous, current } => {
            assert_eq!(previous.as_deref(), Some("10.0.0.1"));
            assert_eq!(current, "10.0.0.2");
        }
        other => panic!("unexpected event {}", other.kind()),
    }
}

#[tokio::test]
async fn test_restart_after_host_ip_change() {
    let fleet = fleet().await;
    fleet.start_server("api").await.unwrap();
    let results = fleet
        .resolve_host_ip_change(HostIpAction::Restart)
        .await
        .unwrap();
    assert_eq!(results.len(), 1);
    assert!(results[0].1.is_ok());
    assert_eq!(fleet.instance("api").unwrap().state(), ServerState::Running);

    fleet
        .resolve_host_ip_change(HostIpAction::Close)
        .await
        .unwrap();
    assert_eq!(fleet.instance("api").unwrap().state(), ServerState::Stopped);
}

#[tokio::test]
async fn test_dispatch_replies() {
    let fleet = fleet().await;

    let cmd: EngineCommand =
        serde_json::from_value(json!({"type": "START_SERVER", "serverName": "ghost"})).unwrap();
    let reply = dispatch(&fleet, cmd).await;
    assert!(!reply.success);
    assert_eq!(reply.code.as_deref(), Some("SERVER_NOT_FOUND"));

    let cmd: EngineCommand = serde_json::from_value(json!({
        "type": "APPLY_PRESET",
        "folderName": "qa",
        "presetName": "empty-list"
    }))
    .unwrap();
    let reply = dispatch(&fleet, cmd).await;
    assert!(reply.success);
    assert_eq!(reply.get("appliedCount"), Some(&json!(1)));
    assert_eq!(reply.get("skipped").and_then(|s| s.as_array()).map(Vec::len), Some(2));

    let cmd: EngineCommand =
        serde_json::from_value(json!({"type": "CHECK_ROUTE_PRESET_USAGE", "routeId": "list"}))
            .unwrap();
    let reply = dispatch(&fleet, cmd).await;
    assert_eq!(
        reply.get("usedInPresets"),
        Some(&json!([{"folderName": "qa", "presetName": "empty-list"}]))
    );

    let cmd: EngineCommand = serde_json::from_value(json!({
        "type": "SET_ACTIVE_RESPONSE",
        "serverName": "api",
        "parentId": "users",
        "routeId": "list",
        "responseId": "fn"
    }))
    .unwrap();
    let reply = dispatch(&fleet, cmd).await;
    assert!(reply.success);
    assert!(reply.has_diffs);
}

#[tokio::test]
async fn test_no_project_loaded() {
    let fleet = FleetManager::new(settings()).unwrap();
    assert_eq!(
        fleet.start_server("api").await.unwrap_err(),
        EngineError::NoActiveProject
    );
    assert!(fleet.server_statuses().is_empty());
    assert!(!fleet.has_diffs());
}

#[tokio::test]
async fn test_delayed_request_keeps_its_snapshot_across_preset_apply() {
    let fleet = fleet().await;
    let settings = ServerSettings {
        delay: 400,
        ..ServerSettings::with_port(0)
    };
    fleet.update_server_settings("api", settings).await.unwrap();
    let port = fleet.start_server("api").await.unwrap();

    let in_flight = tokio::spawn(reqwest::get(format!("http://127.0.0.1:{port}/api/users")));
    tokio::time::sleep(Duration::from_millis(150)).await;
    fleet.apply_preset("qa", "empty-list").await.unwrap();

    let response = in_flight.await.unwrap().unwrap();
    assert!(response.headers().get("x-mockyard-preset").is_none());
    assert_eq!(response.text().await.unwrap(), r#"[{"id":1}]"#);

    let response = reqwest::get(format!("http://127.0.0.1:{port}/api/users"))
        .await
        .unwrap();
    assert_eq!(
        response.headers()["x-mockyard-preset"].to_str().unwrap(),
        "empty-list"
    );
    assert_eq!(response.text().await.unwrap(), "[]");
    fleet.close_all().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_preset_applies_leave_one_complete_set() {
    let mut tree = demo_tree();
    let bind = |route_id: &str, response_id: &str| PresetRoute {
        server_id: "api".to_string(),
        parent_id: "users".to_string(),
        route_id: route_id.to_string(),
        response_id: response_id.to_string(),
    };
    tree.presets.get_mut("qa").unwrap().presets_hash.insert(
        "scripted".to_string(),
        Preset {
            name: "scripted".to_string(),
            routes: vec![bind("list", "fn"), bind("admin", "admin-res")],
        },
    );
    let fleet = Arc::new(FleetManager::new(settings()).unwrap());
    fleet.load_tree(tree).await.unwrap();

    let list = RouteKey::new("api", "users", "list");
    let admin = RouteKey::new("api", "users", "admin");
    for _ in 0..25 {
        let a = tokio::spawn({
            let fleet = Arc::clone(&fleet);
            async move { fleet.apply_preset("qa", "empty-list").await }
        });
        let b = tokio::spawn({
            let fleet = Arc::clone(&fleet);
            async move { fleet.apply_preset("qa", "scripted").await }
        });
        a.await.unwrap().unwrap();
        b.await.unwrap().unwrap();

        let overrides = fleet.snapshot().unwrap().overrides.clone();
        let applied = overrides.applied.clone().unwrap();
        match applied.preset_name.as_str() {
            "empty-list" => {
                assert_eq!(overrides.bindings.len(), 1);
                assert_eq!(overrides.bindings.get(&list).map(String::as_str), Some("empty"));
            }
            "scripted" => {
                assert_eq!(overrides.bindings.len(), 2);
                assert_eq!(overrides.bindings.get(&list).map(String::as_str), Some("fn"));
                assert_eq!(
                    overrides.bindings.get(&admin).map(String::as_str),
                    Some("admin-res")
                );
            }
            other => panic!("unexpected preset {other}"),
        }
    }
}
