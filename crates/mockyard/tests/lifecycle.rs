//! Server lifecycle and the control API.

mod common;

use common::{free_port, settings, shop_fleet, shop_tree};
use mockyard::control_api::ControlApiServer;
use mockyard::project::{ProjectServer, ServerSettings};
use mockyard::server::ServerState;
use mockyard::{EngineError, EngineEvent, FleetManager};
use serde_json::{json, Value};
use serial_test::serial;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[tokio::test]
#[serial]
async fn test_port_conflict_is_structured() {
    let fleet = shop_fleet().await;
    let port = free_port();
    fleet
        .update_server_settings("api", ServerSettings::with_port(port))
        .await
        .unwrap();
    fleet
        .create_server(ProjectServer::new("shadow", ServerSettings::with_port(port)))
        .await
        .unwrap();

    fleet.start_server("api").await.unwrap();
    let err = fleet.start_server("shadow").await.unwrap_err();
    assert_eq!(
        err,
        EngineError::PortConflict {
            port,
            owner: "api".to_string()
        }
    );
    assert_eq!(err.code(), "PORT_CONFLICT");
    assert_eq!(fleet.instance("api").unwrap().state(), ServerState::Running);

    // Once the owner stops, the port is free for the other server.
    fleet.close_server("api").await.unwrap();
    assert_eq!(fleet.start_server("shadow").await.unwrap(), port);
    fleet.close_all().await.unwrap();
}

#[tokio::test]
#[serial]
async fn test_port_taken_outside_the_project() {
    let fleet = shop_fleet().await;
    let blocker = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = blocker.local_addr().unwrap().port();
    fleet
        .update_server_settings("api", ServerSettings::with_port(port))
        .await
        .unwrap();

    let err = fleet.start_server("api").await.unwrap_err();
    assert_eq!(err.code(), "BIND_ERROR");
    let instance = fleet.instance("api").unwrap();
    assert_eq!(instance.state(), ServerState::Error);

    drop(blocker);
    assert_eq!(fleet.start_server("api").await.unwrap(), port);
    fleet.close_all().await.unwrap();
}

#[tokio::test]
async fn test_state_transitions_are_published() {
    let fleet = shop_fleet().await;
    let mut events = fleet.subscribe();

    fleet.start_server("api").await.unwrap();
    fleet.close_server("api").await.unwrap();

    let mut states = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let EngineEvent::ServerState { server, state, .. } = event {
            assert_eq!(server, "api");
            states.push(state);
        }
    }
    assert_eq!(
        states,
        vec![
            ServerState::Starting,
            ServerState::Running,
            ServerState::Stopping,
            ServerState::Stopped
        ]
    );
}

#[tokio::test]
async fn test_start_all_and_close_all() {
    let fleet = shop_fleet().await;
    fleet
        .create_server(ProjectServer::new("admin", ServerSettings::with_port(0)))
        .await
        .unwrap();

    let results = fleet.start_all().await.unwrap();
    assert_eq!(results.len(), 2);
    assert!(results.iter().all(|(_, r)| r.is_ok()));
    assert!(fleet.init_snapshot().is_server_up.values().all(|up| *up));

    fleet.close_all().await.unwrap();
    assert!(fleet
        .server_statuses()
        .iter()
        .all(|s| s.state == ServerState::Stopped));
}

async fn control_api() -> (Arc<FleetManager>, String, CancellationToken) {
    let fleet = Arc::new(FleetManager::new(settings()).unwrap());
    fleet.register_project(shop_tree()).unwrap();
    let api = ControlApiServer::bind("127.0.0.1:0".parse().unwrap(), Arc::clone(&fleet))
        .await
        .unwrap();
    let base = format!("http://{}", api.local_addr().unwrap());
    let shutdown = CancellationToken::new();
    tokio::spawn(api.run(shutdown.clone()));
    (fleet, base, shutdown)
}

async fn command(client: &reqwest::Client, base: &str, body: Value) -> Value {
    let response = client
        .post(format!("{base}/commands"))
        .json(&body)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    response.json().await.unwrap()
}

#[tokio::test]
async fn test_control_api_drives_the_engine() {
    let (fleet, base, shutdown) = control_api().await;
    let client = reqwest::Client::new();

    let init: Value = client
        .get(format!("{base}/init"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(init["projectsNameList"], json!(["shop"]));
    assert_eq!(init["activeProject"], Value::Null);

    let reply = command(&client, &base, json!({"type": "START_SERVER", "serverName": "api"})).await;
    assert_eq!(reply["success"], false);
    assert_eq!(reply["code"], "NO_ACTIVE_PROJECT");

    let reply = command(&client, &base, json!({"type": "LOAD_PROJECT", "name": "shop"})).await;
    assert_eq!(reply["success"], true);
    assert_eq!(reply["init"]["activeProject"], "shop");

    let reply = command(&client, &base, json!({"type": "START_SERVER", "serverName": "api"})).await;
    assert_eq!(reply["success"], true);
    let port = reply["port"].as_u64().unwrap();

    let mock = client
        .get(format!("http://127.0.0.1:{port}/items"))
        .send()
        .await
        .unwrap();
    assert_eq!(mock.status(), 200);

    let logs: Value = client
        .get(format!("{base}/projects/shop/logs"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(logs["logs"].as_array().unwrap().len(), 1);
    assert_eq!(logs["logs"][0]["type"], "mock");

    let servers: Value = client
        .get(format!("{base}/servers"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(servers["servers"][0]["state"], "running");

    let reply = command(
        &client,
        &base,
        json!({"type": "CHECK_SERVER_PRESET_USAGE", "serverId": "api"}),
    )
    .await;
    assert_eq!(
        reply["usedInPresets"],
        json!([{"folderName": "demo", "presetName": "no-items"}])
    );

    let reply = command(&client, &base, json!({"type": "CLOSE_ALL"})).await;
    assert_eq!(reply["success"], true);
    assert_eq!(fleet.instance("api").unwrap().state(), ServerState::Stopped);

    let cleared = client
        .delete(format!("{base}/projects/shop/logs"))
        .send()
        .await
        .unwrap();
    assert_eq!(cleared.status(), 200);
    assert!(fleet.get_logs(Some("shop")).unwrap().is_empty());

    shutdown.cancel();
}

#[tokio::test]
async fn test_control_api_rejects_malformed_commands() {
    let (_fleet, base, shutdown) = control_api().await;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("{base}/commands"))
        .body("{not json")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["errors"][0]["code"], "INVALID_COMMAND");

    let response = client.get(format!("{base}/nope")).send().await.unwrap();
    assert_eq!(response.status(), 404);

    let health: Value = client
        .get(format!("{base}/health"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["status"], "ok");

    shutdown.cancel();
}
